use colored::Colorize;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracepage::{Page, PageSubscriber, Severity, SubscriberError};

/// Prints every record of a page on its own colored line.
pub struct ConsoleSubscriber {
  // Pre-allocate buffer to avoid allocations per page
  buffer: Mutex<String>,
}

impl ConsoleSubscriber {
  pub fn new() -> Self {
    Self {
      buffer: Mutex::new(String::with_capacity(4096)),
    }
  }
}

impl PageSubscriber for ConsoleSubscriber {
  fn on_page(&self, page: &Arc<Page>) -> Result<(), SubscriberError> {
    let mut buf = self.buffer.lock().map_err(|_| "console buffer poisoned")?;
    buf.clear();

    use std::fmt::Write as _;
    writeln!(
      buf,
      "{}",
      format!(
        "--- page #{} from {} ({}, {} records) ---",
        page.sequence,
        page.listener,
        page.reason,
        page.len()
      )
      .dimmed()
    )?;

    for record in page.iter() {
      let level = match record.severity {
        Severity::Critical => record.severity.as_str().red().bold(),
        Severity::Error => record.severity.as_str().red(),
        Severity::Warning => record.severity.as_str().yellow(),
        Severity::Information => record.severity.as_str().green(),
        _ => record.severity.as_str().normal(),
      };
      writeln!(
        buf,
        "{} [{}] {}#{}: {}",
        record.timestamp.format("%H:%M:%S%.3f"),
        level,
        record.source.cyan(),
        record.id,
        record.message
      )?;
    }

    // Single write call
    io::stdout().write_all(buf.as_bytes())?;
    Ok(())
  }

  fn on_shutdown(&self) {
    let _ = io::stdout().flush();
  }
}

/// Writes each page as one JSON line.
pub struct JsonLinesSubscriber<W: Write + Send + 'static> {
  out: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesSubscriber<W> {
  pub fn new(out: W) -> Self {
    Self {
      out: Mutex::new(out),
    }
  }
}

impl<W: Write + Send + 'static> PageSubscriber for JsonLinesSubscriber<W> {
  fn on_page(&self, page: &Arc<Page>) -> Result<(), SubscriberError> {
    let line = serde_json::to_string(page.as_ref())?;
    let mut out = self.out.lock().map_err(|_| "json writer poisoned")?;
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
  }

  fn on_shutdown(&self) {
    if let Ok(mut out) = self.out.lock() {
      let _ = out.flush();
    }
  }
}
