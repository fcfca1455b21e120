use std::fmt::Display;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracepage::{Severity, StaticHookMode, TraceError, TraceListener, TraceOptions};

use crate::subscribers::JsonLinesSubscriber;

/// Several producer threads share one listener; pages are written as JSON
/// lines to stderr.
pub fn example_multithreaded_logging() -> Result<(), TraceError> {
  println!("\n=== Example: multi-threaded producers ===");

  let listener = Arc::new(TraceListener::from_options(
    TraceOptions::default()
      .with_name("workers")
      .with_static_hook_mode(StaticHookMode::Detached)
      .with_page_size(100)
      .with_max_flush_interval(Duration::from_millis(100)),
  )?);

  let pages = Arc::new(std::sync::atomic::AtomicUsize::new(0));
  let counter = Arc::clone(&pages);
  listener.subscribe_fn(move |_page| {
    counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(())
  });
  listener.subscribe(JsonLinesSubscriber::new(io::sink()));

  let handles: Vec<_> = (0..5)
    .map(|thread_id: i32| {
      let listener = Arc::clone(&listener);
      thread::spawn(move || {
        for i in 0..100 {
          let args: [Option<&dyn Display>; 2] = [Some(&thread_id), Some(&i)];
          listener.record(
            "worker",
            Severity::Information,
            thread_id * 1000 + i,
            "thread {0} processing item {1}",
            Some(&args[..]),
          );

          if i % 50 == 0 {
            listener.record_message("worker", Severity::Warning, i, "halfway point reached");
          }

          // Small delay to simulate work
          thread::sleep(Duration::from_millis(1));
        }
      })
    })
    .collect();

  // Wait for all threads to complete
  for handle in handles {
    let _ = handle.join();
  }

  listener.dispose();
  println!(
    "delivered {} pages",
    pages.load(std::sync::atomic::Ordering::Relaxed)
  );
  Ok(())
}
