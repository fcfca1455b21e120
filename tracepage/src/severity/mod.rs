
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a trace event, ordered from most restrictive to least:
/// `Off < Critical < Error < Warning < Information < Verbose < All`.
///
/// The same enum serves two purposes:
/// - as a **threshold** (the configured minimum), where every variant is
///   meaningful, and
/// - as a **point** tag on a recorded event, where only
///   `Critical..=Verbose` ever appear. [`Severity::to_point`] maps the first
///   space into the second.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Severity {
  /// Nothing passes this threshold
  Off = 0,
  /// Unrecoverable failures
  Critical = 1,
  /// Recoverable failures
  Error = 2,
  /// Unexpected but handled conditions
  Warning = 3,
  /// Normal operational messages
  #[default]
  Information = 4,
  /// Diagnostic detail
  Verbose = 5,
  /// Everything passes this threshold
  All = 6,
}

impl Severity {
  /// Maps a threshold value to the point severity tagged on records.
  ///
  /// `Off` becomes `Critical`, `All` becomes `Verbose`, everything else is
  /// returned unchanged.
  #[inline]
  pub fn to_point(self) -> Severity {
    match self {
      Severity::Off => Severity::Critical,
      Severity::All => Severity::Verbose,
      other => other,
    }
  }

  /// Point severity for a raw numeric code. Unknown codes map to `Verbose`.
  pub fn point_from_code(code: i32) -> Severity {
    match code {
      0 => Severity::Off,
      1 => Severity::Critical,
      2 => Severity::Error,
      3 => Severity::Warning,
      4 => Severity::Information,
      5 => Severity::Verbose,
      6 => Severity::All,
      _ => Severity::Verbose,
    }
    .to_point()
  }

  /// Point severity for a textual name. Unknown names map to `Verbose`.
  pub fn point_from_name(name: &str) -> Severity {
    name
      .parse::<Severity>()
      .map(Severity::to_point)
      .unwrap_or(Severity::Verbose)
  }

  /// Returns `true` if an event tagged `event` passes this threshold.
  ///
  /// The event's point severity has to be at least as severe as the
  /// threshold. `Off` admits nothing and `All` admits everything.
  #[inline]
  pub fn admits(self, event: Severity) -> bool {
    match self {
      Severity::Off => false,
      threshold => event.to_point() <= threshold,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Off => "Off",
      Severity::Critical => "Critical",
      Severity::Error => "Error",
      Severity::Warning => "Warning",
      Severity::Information => "Information",
      Severity::Verbose => "Verbose",
      Severity::All => "All",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Returned by [`Severity::from_str`] for names outside the known set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSeverity(pub String);

impl fmt::Display for UnknownSeverity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unknown severity: {}", self.0)
  }
}

impl std::error::Error for UnknownSeverity {}

impl FromStr for Severity {
  type Err = UnknownSeverity;

  /// Case-insensitive. Accepts the common short forms as well.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "off" => Ok(Severity::Off),
      "critical" | "crit" | "fatal" => Ok(Severity::Critical),
      "error" | "err" => Ok(Severity::Error),
      "warning" | "warn" => Ok(Severity::Warning),
      "information" | "info" => Ok(Severity::Information),
      "verbose" | "debug" | "trace" => Ok(Severity::Verbose),
      "all" => Ok(Severity::All),
      _ => Err(UnknownSeverity(s.to_string())),
    }
  }
}

impl From<&tracing::Level> for Severity {
  fn from(level: &tracing::Level) -> Self {
    match *level {
      tracing::Level::ERROR => Severity::Error,
      tracing::Level::WARN => Severity::Warning,
      tracing::Level::INFO => Severity::Information,
      tracing::Level::DEBUG | tracing::Level::TRACE => Severity::Verbose,
    }
  }
}
