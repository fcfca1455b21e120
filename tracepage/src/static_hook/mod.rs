
use std::fmt;
use std::sync::Arc;

use tracing::{field::Field, Event as TracingEvent, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use crate::listener::Core;
use crate::record::{format_field, Args, TraceRecord};
use crate::severity::Severity;

/// Target of the engine's own diagnostics. Never captured.
const INTERNAL_TARGET: &str = "tracepage";

/// Record id used for events captured from `tracing`.
pub const STATIC_EVENT_ID: i32 = 0;

/// `tracing_subscriber` layer feeding `tracing` events into a listener.
///
/// The event target becomes the record source, the `message` field becomes
/// the message, and every other field is kept as a `key=value` argument.
#[derive(Clone)]
pub struct ListenerLayer {
  core: Arc<Core>,
}

impl ListenerLayer {
  pub(crate) fn new(core: Arc<Core>) -> Self {
    Self { core }
  }
}

impl fmt::Debug for ListenerLayer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ListenerLayer").finish_non_exhaustive()
  }
}

impl<S> Layer<S> for ListenerLayer
where
  S: Subscriber + for<'a> LookupSpan<'a>,
{
  fn on_event(&self, event: &TracingEvent<'_>, _ctx: Context<'_, S>) {
    let metadata = event.metadata();
    if is_internal(metadata.target()) {
      return;
    }

    let severity = Severity::from(metadata.level());
    if !self.core.admits(severity) {
      return;
    }

    let mut visitor = FieldVisitor::default();
    event.record(&mut visitor);

    let args = if visitor.fields.is_empty() {
      None
    } else {
      Some(visitor.fields)
    };
    self.core.push(TraceRecord::new(
      metadata.target(),
      severity,
      STATIC_EVENT_ID,
      visitor.message.unwrap_or_default(),
      args,
    ));
  }
}

fn is_internal(target: &str) -> bool {
  target == INTERNAL_TARGET
    || target
      .strip_prefix(INTERNAL_TARGET)
      .is_some_and(|rest| rest.starts_with("::"))
}

#[derive(Default)]
struct FieldVisitor {
  message: Option<String>,
  fields: Args,
}

impl tracing::field::Visit for FieldVisitor {
  fn record_str(&mut self, field: &Field, value: &str) {
    if field.name() == "message" {
      self.message = Some(value.to_string());
    } else {
      let mut out = String::new();
      format_field(&mut out, field.name(), &value);
      self.fields.push(out);
    }
  }

  fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
    if field.name() == "message" {
      self.message = Some(format!("{:?}", value));
    } else {
      let mut out = String::new();
      format_field(&mut out, field.name(), value);
      self.fields.push(out);
    }
  }
}
