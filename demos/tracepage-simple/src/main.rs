mod example_failing_subscriber;
mod example_multithreaded_logging;
mod example_simple;
mod subscribers;

use crate::{
  example_failing_subscriber::example_failing_subscriber,
  example_multithreaded_logging::example_multithreaded_logging, example_simple::example_simple,
};

fn main() {
  println!("tracepage examples");
  println!("==================");

  if let Err(e) = example_multithreaded_logging() {
    eprintln!("multithreaded example failed: {}", e);
  }
  if let Err(e) = example_failing_subscriber() {
    eprintln!("failing subscriber example failed: {}", e);
  }
  // Installs the global tracing subscriber, so it runs last.
  if let Err(e) = example_simple() {
    eprintln!("simple example failed: {}", e);
  }

  println!("\n=== All examples completed ===");
}
