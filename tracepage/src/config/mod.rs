
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::severity::Severity;

/// Shortest accepted flush interval. Anything lower turns into a flush storm.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(50);
/// Longest accepted flush interval.
pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_PAGE_SIZE: usize = 10_000;
pub const DEFAULT_NAME: &str = "tracepage";

/// Whether the listener captures process-wide static `tracing` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaticHookMode {
  /// Install the listener as the process default `tracing` subscriber,
  /// replacing whatever default dispatcher was in place.
  #[default]
  AttachAndDetachDefault,
  /// Leave static `tracing` calls alone.
  Detached,
}

/// Unvalidated listener options.
///
/// Build them in code with the `with_*` setters or parse them from JSON,
/// then call [`TraceOptions::validate`] to obtain a [`TraceConfig`].
///
/// An unknown `min_severity` name in JSON is a [`ConfigError::Parse`]. The
/// `Verbose` fallback of [`Severity::point_from_name`] applies to event
/// severities only, never to the threshold.
///
/// ```rust
/// use tracepage::TraceOptions;
///
/// let config = TraceOptions::from_json(r#"{ "page_size": 64, "min_severity": "warn" }"#)
///   .unwrap()
///   .validate()
///   .unwrap();
/// assert_eq!(config.page_size(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
  pub name: String,
  pub static_hook_mode: StaticHookMode,
  #[serde(deserialize_with = "severity_by_name")]
  pub min_severity: Severity,
  /// Maximum time between two flushes. Whole milliseconds in JSON.
  #[serde(rename = "max_flush_interval_ms", with = "millis")]
  pub max_flush_interval: Duration,
  pub page_size: usize,
}

impl Default for TraceOptions {
  fn default() -> Self {
    Self {
      name: DEFAULT_NAME.to_string(),
      static_hook_mode: StaticHookMode::default(),
      min_severity: Severity::Information,
      max_flush_interval: DEFAULT_FLUSH_INTERVAL,
      page_size: DEFAULT_PAGE_SIZE,
    }
  }
}

impl TraceOptions {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_static_hook_mode(mut self, mode: StaticHookMode) -> Self {
    self.static_hook_mode = mode;
    self
  }

  pub fn with_min_severity(mut self, severity: Severity) -> Self {
    self.min_severity = severity;
    self
  }

  pub fn with_max_flush_interval(mut self, interval: Duration) -> Self {
    self.max_flush_interval = interval;
    self
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size;
    self
  }

  /// Checks the bounds and freezes the options.
  ///
  /// # Errors
  /// - [`ConfigError::InvalidPageSize`] when `page_size == 0`
  /// - [`ConfigError::FlushIntervalTooShort`] below [`MIN_FLUSH_INTERVAL`]
  /// - [`ConfigError::FlushIntervalTooLong`] above [`MAX_FLUSH_INTERVAL`]
  pub fn validate(self) -> Result<TraceConfig, ConfigError> {
    if self.page_size == 0 {
      return Err(ConfigError::InvalidPageSize(self.page_size));
    }

    let interval = self.max_flush_interval;
    if interval < MIN_FLUSH_INTERVAL {
      return Err(ConfigError::FlushIntervalTooShort {
        actual: interval,
        min: MIN_FLUSH_INTERVAL,
      });
    }
    if interval > MAX_FLUSH_INTERVAL {
      return Err(ConfigError::FlushIntervalTooLong {
        actual: interval,
        max: MAX_FLUSH_INTERVAL,
      });
    }

    Ok(TraceConfig {
      name: self.name,
      static_hook_mode: self.static_hook_mode,
      min_severity: self.min_severity,
      max_flush_interval: interval,
      page_size: self.page_size,
    })
  }
}

/// Validated, immutable listener configuration.
///
/// The only way to get one is [`TraceOptions::validate`], so every
/// `TraceConfig` in existence satisfies the page size and interval bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
  name: String,
  static_hook_mode: StaticHookMode,
  min_severity: Severity,
  max_flush_interval: Duration,
  page_size: usize,
}

impl TraceConfig {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    TraceOptions::from_json(json)?.validate()
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn static_hook_mode(&self) -> StaticHookMode {
    self.static_hook_mode
  }

  pub fn min_severity(&self) -> Severity {
    self.min_severity
  }

  pub fn max_flush_interval(&self) -> Duration {
    self.max_flush_interval
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }
}

impl Default for TraceConfig {
  fn default() -> Self {
    Self {
      name: DEFAULT_NAME.to_string(),
      static_hook_mode: StaticHookMode::default(),
      min_severity: Severity::Information,
      max_flush_interval: DEFAULT_FLUSH_INTERVAL,
      page_size: DEFAULT_PAGE_SIZE,
    }
  }
}

impl From<&TraceConfig> for TraceOptions {
  fn from(config: &TraceConfig) -> Self {
    Self {
      name: config.name.clone(),
      static_hook_mode: config.static_hook_mode,
      min_severity: config.min_severity,
      max_flush_interval: config.max_flush_interval,
      page_size: config.page_size,
    }
  }
}

fn severity_by_name<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
  D: Deserializer<'de>,
{
  let name = String::deserialize(deserializer)?;
  name.parse().map_err(serde::de::Error::custom)
}

mod millis {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(interval.as_millis().min(u64::MAX as u128) as u64)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
  }
}
