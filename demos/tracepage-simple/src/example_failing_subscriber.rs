use std::time::Duration;

use tracepage::{Severity, StaticHookMode, TraceError, TraceListener, TraceOptions};

use crate::subscribers::ConsoleSubscriber;

/// A subscriber that always fails. The console subscriber still gets every
/// page, followed by a diagnostic page describing each failure.
pub fn example_failing_subscriber() -> Result<(), TraceError> {
  println!("\n=== Example: failing subscriber ===");

  let listener = TraceListener::from_options(
    TraceOptions::default()
      .with_name("fragile")
      .with_static_hook_mode(StaticHookMode::Detached)
      .with_page_size(2)
      .with_max_flush_interval(Duration::from_secs(1)),
  )?;

  listener.subscribe_fn(|_page| Err("upload endpoint unreachable".into()));
  listener.subscribe(ConsoleSubscriber::new());

  for i in 0..4 {
    listener.record_message("uploader", Severity::Error, i, "batch upload queued");
  }

  listener.dispose();
  Ok(())
}
