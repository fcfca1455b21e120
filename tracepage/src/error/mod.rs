
use std::time::Duration;
use thiserror::Error;

/// Error returned by a [`PageSubscriber`](crate::listener::PageSubscriber)
/// that could not handle a page.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Configuration rejected at construction time.
///
/// These are raised exactly once, when options are validated. A listener
/// never observes an invalid configuration at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// Page size must hold at least one record.
  #[error("page size must be greater than 0, got {0}")]
  InvalidPageSize(usize),

  /// Flush interval below the lower bound.
  #[error("max flush interval {actual:?} is shorter than the minimum of {min:?}")]
  FlushIntervalTooShort { actual: Duration, min: Duration },

  /// Flush interval above the upper bound.
  #[error("max flush interval {actual:?} is longer than the maximum of {max:?}")]
  FlushIntervalTooLong { actual: Duration, max: Duration },

  /// Options could not be parsed from JSON.
  #[error("invalid trace options: {0}")]
  Parse(#[from] serde_json::Error),
}

/// Errors surfaced by listener construction and the static hook.
#[derive(Debug, Error)]
pub enum TraceError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  /// The background flush thread could not be started.
  #[error("failed to spawn flush thread: {0}")]
  Spawn(#[from] std::io::Error),

  /// A process-wide `tracing` subscriber is already installed.
  #[error("static trace hook could not be installed: {0}")]
  HookInstall(String),
}
