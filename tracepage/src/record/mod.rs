
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{self, Display, Write};

use crate::severity::Severity;
use crate::utils::current_thread_id_u32;

/// Placeholder text rendered for absent values.
pub const NULL_DATA: &str = "NULL_DATA";

/// Source name carried by records the engine emits about itself.
pub const DIAGNOSTIC_SOURCE: &str = "tracepage.listener";

/// Record id carried by diagnostic records.
pub const DIAGNOSTIC_ID: i32 = -1;

/// Rendered argument list. Most events carry a handful of arguments.
pub type Args = SmallVec<[String; 4]>;

/// A single recorded trace event.
///
/// Records are created by the listener on the producer thread and are never
/// modified afterwards. Arguments are rendered to text at capture time so a
/// record owns no references into the caller's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
  /// Capture time
  pub timestamp: DateTime<Utc>,

  /// Hashed id of the producing thread
  pub thread_id: u32,

  pub process_id: u32,

  /// Logical source of the event, usually a component or module name
  pub source: String,

  /// Point severity; never `Off` or `All`
  pub severity: Severity,

  pub id: i32,

  /// Message with `{N}` placeholders already substituted
  pub message: String,

  /// Rendered arguments, `None` if the caller passed no argument list
  pub args: Option<Args>,
}

impl TraceRecord {
  /// Captures a record on the current thread.
  ///
  /// `severity` is mapped to its point value, so a threshold such as
  /// `Severity::All` is stored as `Verbose`.
  pub fn new(
    source: impl Into<String>,
    severity: Severity,
    id: i32,
    message: impl Into<String>,
    args: Option<Args>,
  ) -> Self {
    Self {
      timestamp: Utc::now(),
      thread_id: current_thread_id_u32(),
      process_id: std::process::id(),
      source: source.into(),
      severity: severity.to_point(),
      id,
      message: message.into(),
      args,
    }
  }

  /// Builds a record from a message template and raw argument values.
  ///
  /// Placeholders in `template` are substituted with [`format_message`] and
  /// the rendered values are kept alongside.
  pub fn capture(
    source: &str,
    severity: Severity,
    id: i32,
    template: &str,
    args: Option<&[Option<&dyn Display>]>,
  ) -> Self {
    let rendered: Option<Args> =
      args.map(|values| values.iter().map(|v| format_scalar(*v)).collect());
    let message = match &rendered {
      Some(values) => format_message(template, values),
      None => template.to_string(),
    };
    Self::new(source, severity, id, message, rendered)
  }

  /// Engine self-report tagged `Error` with the diagnostic source and id.
  pub fn diagnostic(message: impl Into<String>) -> Self {
    Self::new(DIAGNOSTIC_SOURCE, Severity::Error, DIAGNOSTIC_ID, message, None)
  }

  pub fn is_diagnostic(&self) -> bool {
    self.id == DIAGNOSTIC_ID && self.source == DIAGNOSTIC_SOURCE
  }
}

impl Display for TraceRecord {
  /// `2024-01-01T00:00:00.000Z [Warning] source#12: message`
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} [{}] {}#{}: {}",
      self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
      self.severity,
      self.source,
      self.id,
      self.message
    )
  }
}

/// Renders a value, or [`NULL_DATA`] if it is absent.
pub fn format_scalar(value: Option<&dyn Display>) -> String {
  match value {
    Some(v) => v.to_string(),
    None => NULL_DATA.to_string(),
  }
}

/// Renders every element with [`format_scalar`] and joins them with `", "`.
/// An absent list renders as [`NULL_DATA`].
///
/// ```rust
/// use std::fmt::Display;
/// use tracepage::format_list;
///
/// let one = 1;
/// let values: [Option<&dyn Display>; 3] = [Some(&one), None, Some(&"a")];
/// assert_eq!(format_list(Some(&values[..])), "1, NULL_DATA, a");
/// assert_eq!(format_list(None), "NULL_DATA");
/// ```
pub fn format_list(values: Option<&[Option<&dyn Display>]>) -> String {
  let Some(values) = values else {
    return NULL_DATA.to_string();
  };

  let mut out = String::new();
  for (i, value) in values.iter().enumerate() {
    if i > 0 {
      out.push_str(", ");
    }
    out.push_str(&format_scalar(*value));
  }
  out
}

/// Substitutes `{N}` placeholders in `template` with `args[N]`.
///
/// `{{` and `}}` produce literal braces. Placeholders that are not a plain
/// index, or whose index is out of range, are copied through unchanged.
pub fn format_message(template: &str, args: &[String]) -> String {
  let mut out = String::with_capacity(template.len() + args.len() * 8);
  let mut rest = template;

  while let Some(pos) = rest.find(['{', '}']) {
    out.push_str(&rest[..pos]);
    let tail = &rest[pos..];

    if tail.starts_with("{{") || tail.starts_with("}}") {
      out.push_str(&tail[..1]);
      rest = &tail[2..];
      continue;
    }

    if tail.starts_with('{') {
      if let Some(end) = tail.find('}') {
        let inner = &tail[1..end];
        if let Some(value) = inner.parse::<usize>().ok().and_then(|i| args.get(i)) {
          out.push_str(value);
          rest = &tail[end + 1..];
          continue;
        }
      }
    }

    out.push_str(&tail[..1]);
    rest = &tail[1..];
  }

  out.push_str(rest);
  out
}

/// Renders `key=value` pairs the way the static hook stores `tracing` fields.
pub(crate) fn format_field(out: &mut String, key: &str, value: &dyn fmt::Debug) {
  let _ = write!(out, "{}={:?}", key, value);
}
