
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::TraceRecord;
use crate::utils::hostname;

/// Why a page was detached from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushReason {
  /// The page reached the configured page size
  Size,
  /// The flush interval elapsed with records pending
  Interval,
  /// Explicit `flush()` call
  Manual,
  /// Final flush while the listener was disposed
  Dispose,
  /// Synthetic page reporting an engine failure
  Diagnostic,
}

impl FlushReason {
  pub fn as_str(&self) -> &'static str {
    match self {
      FlushReason::Size => "size",
      FlushReason::Interval => "interval",
      FlushReason::Manual => "manual",
      FlushReason::Dispose => "dispose",
      FlushReason::Diagnostic => "diagnostic",
    }
  }
}

impl fmt::Display for FlushReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A bounded, ordered batch of records delivered to subscribers as one unit.
///
/// Besides the records, a page carries the context it was produced in:
/// listener name, host, process, creation time and why it was flushed.
/// Pages are handed out as `Arc<Page>` and never change after dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
  /// Name of the listener that produced the page
  pub listener: String,

  pub hostname: String,

  pub pid: u32,

  pub created_at: DateTime<Utc>,

  /// Position of this page among the pages swapped out of one listener.
  /// Diagnostic pages are not part of that sequence and carry `0`.
  pub sequence: u64,

  pub reason: FlushReason,

  /// Records in append order
  pub records: Vec<TraceRecord>,
}

impl Page {
  pub fn new(
    listener: impl Into<String>,
    sequence: u64,
    reason: FlushReason,
    records: Vec<TraceRecord>,
  ) -> Self {
    Self {
      listener: listener.into(),
      hostname: hostname().to_string(),
      pid: std::process::id(),
      created_at: Utc::now(),
      sequence,
      reason,
      records,
    }
  }

  /// One-record page reporting an internal failure of `listener`.
  pub fn diagnostic(listener: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(
      listener,
      0,
      FlushReason::Diagnostic,
      vec![TraceRecord::diagnostic(message)],
    )
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn is_diagnostic(&self) -> bool {
    self.reason == FlushReason::Diagnostic
  }

  pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> {
    self.records.iter()
  }

  /// Serializes the page to a JSON string.
  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

impl<'a> IntoIterator for &'a Page {
  type Item = &'a TraceRecord;
  type IntoIter = std::slice::Iter<'a, TraceRecord>;

  fn into_iter(self) -> Self::IntoIter {
    self.records.iter()
  }
}
