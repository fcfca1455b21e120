use std::time::Duration;
use tracing::{error, info, warn};

use tracepage::{Severity, TraceError, TraceListener, TraceOptions};

use crate::subscribers::ConsoleSubscriber;

pub fn example_simple() -> Result<(), TraceError> {
  println!("\n=== Example: static tracing hook ===");

  // Step 1: Validate options and start the listener. `init` also installs
  // it as the global tracing subscriber (the default hook mode).
  let config = TraceOptions::default()
    .with_name("quick-start")
    .with_min_severity(Severity::Information)
    .with_max_flush_interval(Duration::from_millis(200))
    .validate()?;
  let listener = TraceListener::init(config)?;

  // Step 2: Attach a sink for the pages
  listener.subscribe(ConsoleSubscriber::new());

  // Step 3: Use standard tracing macros
  info!("Application started successfully");
  warn!("This is a warning message");
  error!("This is an error message");

  let user_id = 42;
  let username = "alice";
  info!(user_id = user_id, username = username, "User logged in");

  // Step 4: Or record directly
  listener.record_message("quick-start", Severity::Information, 1, "direct record");

  // Step 5: Flush what is left and stop the flush thread
  listener.dispose();
  Ok(())
}
