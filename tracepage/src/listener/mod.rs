//! # Listener
//!
//! [`TraceListener`] is the public entry point. It owns one page buffer, one
//! flush thread and a set of subscribers:
//!
//! ```text
//! producer ─ record() ─▶ severity filter ─▶ PageBuffer ─┬─ page full ──────┐
//!                                                      └─ interval tick ──┤
//!                                                                         ▼
//!                                   subscribers ◀─ dispatch ◀─ flush queue
//! ```
//!
//! A subscriber that returns an error or panics never affects the producer
//! or the other subscribers. The failure is turned into a diagnostic page
//! which is delivered to every subscriber through the same channel as
//! ordinary pages.

mod __test__;

use std::fmt::{self, Display};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing_subscriber::layer::SubscriberExt;

use crate::buffer::{AppendOutcome, PageBuffer};
use crate::config::{StaticHookMode, TraceConfig, TraceOptions};
use crate::error::{SubscriberError, TraceError};
use crate::page::{FlushReason, Page};
use crate::record::{format_scalar, Args, TraceRecord};
use crate::scheduler::FlushScheduler;
use crate::severity::Severity;
use crate::static_hook::ListenerLayer;

/// Consumer of flushed pages.
///
/// Called on the listener's flush thread, one page at a time, in swap order.
/// A slow subscriber delays later pages but never blocks producers.
pub trait PageSubscriber: Send + Sync + 'static {
  /// Handle one page. Errors and panics are caught by the listener and
  /// reported as a diagnostic page.
  fn on_page(&self, page: &Arc<Page>) -> Result<(), SubscriberError>;

  /// Called once when the subscriber is registered.
  fn on_subscribe(&self) {}

  /// Called once on the flush thread after the final page was delivered.
  fn on_shutdown(&self) {}
}

/// Adapter that lets a closure act as a [`PageSubscriber`].
pub struct FnSubscriber<F>(F);

impl<F> PageSubscriber for FnSubscriber<F>
where
  F: Fn(&Arc<Page>) -> Result<(), SubscriberError> + Send + Sync + 'static,
{
  fn on_page(&self, page: &Arc<Page>) -> Result<(), SubscriberError> {
    (self.0)(page)
  }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl Display for SubscriptionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "subscriber-{}", self.0)
  }
}

#[derive(Clone)]
struct Subscription {
  id: SubscriptionId,
  subscriber: Arc<dyn PageSubscriber>,
}

impl Subscription {
  fn deliver(&self, page: &Arc<Page>) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(|| self.subscriber.on_page(page))) {
      Ok(Ok(())) => Ok(()),
      Ok(Err(err)) => Err(err.to_string()),
      Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
  if let Some(s) = payload.downcast_ref::<&str>() {
    *s
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.as_str()
  } else {
    "unknown panic payload"
  }
}

/// Subscriber registry. Dispatch iterates over a snapshot, so subscribers
/// may be added or removed while a page is being delivered.
struct Subscribers {
  listener: String,
  entries: RwLock<Vec<Subscription>>,
  next_id: AtomicU64,
}

impl Subscribers {
  fn new(listener: &str) -> Self {
    Self {
      listener: listener.to_string(),
      entries: RwLock::new(Vec::new()),
      next_id: AtomicU64::new(1),
    }
  }

  fn add(&self, subscriber: Arc<dyn PageSubscriber>) -> SubscriptionId {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    if panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_subscribe())).is_err() {
      tracing::warn!(listener = %self.listener, %id, "on_subscribe panicked");
    }

    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    entries.push(Subscription { id, subscriber });
    id
  }

  fn remove(&self, id: SubscriptionId) -> bool {
    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    let before = entries.len();
    entries.retain(|s| s.id != id);
    entries.len() != before
  }

  fn len(&self) -> usize {
    self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  fn snapshot(&self) -> Vec<Subscription> {
    self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  fn dispatch(&self, page: Page) {
    let page = Arc::new(page);
    let snapshot = self.snapshot();

    let mut failures = Vec::new();
    for subscription in &snapshot {
      if let Err(reason) = subscription.deliver(&page) {
        failures.push(format!(
          "{} failed on {} page #{}: {}",
          subscription.id, page.reason, page.sequence, reason
        ));
      }
    }

    // Diagnostic pages are best-effort; failing on one is only logged.
    if page.is_diagnostic() {
      for failure in failures {
        tracing::warn!(listener = %self.listener, "{}", failure);
      }
      return;
    }

    for failure in failures {
      tracing::warn!(listener = %self.listener, "{}", failure);
      let diagnostic = Arc::new(Page::diagnostic(self.listener.as_str(), failure));
      for subscription in &snapshot {
        if let Err(reason) = subscription.deliver(&diagnostic) {
          tracing::warn!(
            listener = %self.listener,
            id = %subscription.id,
            "diagnostic page not delivered: {}",
            reason
          );
        }
      }
    }
  }

  fn shutdown(&self) {
    for subscription in self.snapshot() {
      let subscriber = &subscription.subscriber;
      if panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_shutdown())).is_err() {
        tracing::warn!(listener = %self.listener, id = %subscription.id, "on_shutdown panicked");
      }
    }
  }
}

/// State shared by the facade, the flush thread and the static hook layer.
pub(crate) struct Core {
  config: TraceConfig,
  buffer: PageBuffer,
  subscribers: Subscribers,
  disposed: AtomicBool,
}

impl Core {
  #[inline]
  pub(crate) fn admits(&self, severity: Severity) -> bool {
    self.config.min_severity().admits(severity) && !self.disposed.load(Ordering::Acquire)
  }

  pub(crate) fn push(&self, record: TraceRecord) {
    if self.buffer.append(record) == AppendOutcome::Closed {
      tracing::trace!(listener = %self.config.name(), "record dropped, listener disposed");
    }
  }
}

/// In-process trace buffer with size- and time-triggered page flushes.
///
/// Dropping the listener disposes it.
pub struct TraceListener {
  core: Arc<Core>,
  scheduler: FlushScheduler,
  disposing: Mutex<()>,
}

impl TraceListener {
  /// Creates the listener and starts its flush thread.
  ///
  /// The static `tracing` hook is not installed; see
  /// [`init`](Self::init) or [`install_static_hook`](Self::install_static_hook).
  pub fn new(config: TraceConfig) -> Result<Self, TraceError> {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let interval = config.max_flush_interval();
    let thread_name = format!("{}-flush", config.name().replace('\0', ""));

    let core = Arc::new(Core {
      buffer: PageBuffer::new(config.name(), config.page_size(), sender.clone()),
      subscribers: Subscribers::new(config.name()),
      disposed: AtomicBool::new(false),
      config,
    });

    let tick_core = Arc::clone(&core);
    let dispatch_core = Arc::clone(&core);
    let finish_core = Arc::clone(&core);
    let scheduler = FlushScheduler::spawn(
      thread_name,
      sender,
      receiver,
      move || tick_core.buffer.flush_if_due(interval),
      move |page| dispatch_core.subscribers.dispatch(page),
      move || finish_core.subscribers.shutdown(),
    )?;

    tracing::debug!(
      listener = %core.config.name(),
      page_size = core.config.page_size(),
      interval_ms = interval.as_millis() as u64,
      "trace listener started"
    );

    Ok(Self {
      core,
      scheduler,
      disposing: Mutex::new(()),
    })
  }

  /// Validates `options` and creates the listener.
  pub fn from_options(options: TraceOptions) -> Result<Self, TraceError> {
    Self::new(options.validate()?)
  }

  /// Creates the listener and, depending on the configured
  /// [`StaticHookMode`], installs it as the process-wide `tracing`
  /// subscriber.
  ///
  /// # Errors
  /// Fails with [`TraceError::HookInstall`] if the mode asks for the hook and
  /// a global subscriber is already set.
  pub fn init(config: TraceConfig) -> Result<Self, TraceError> {
    let listener = Self::new(config)?;
    listener.install_static_hook()?;
    Ok(listener)
  }

  /// Installs a `tracing_subscriber::Registry` carrying this listener's
  /// layer as the global default subscriber.
  ///
  /// Returns `Ok(false)` when the mode is [`StaticHookMode::Detached`].
  pub fn install_static_hook(&self) -> Result<bool, TraceError> {
    match self.core.config.static_hook_mode() {
      StaticHookMode::Detached => Ok(false),
      StaticHookMode::AttachAndDetachDefault => {
        let subscriber = tracing_subscriber::registry().with(self.layer());
        tracing::subscriber::set_global_default(subscriber)
          .map_err(|e| TraceError::HookInstall(e.to_string()))?;
        Ok(true)
      },
    }
  }

  /// A `tracing_subscriber` layer that records `tracing` events into this
  /// listener. Compose it into your own subscriber stack if needed.
  pub fn layer(&self) -> ListenerLayer {
    ListenerLayer::new(Arc::clone(&self.core))
  }

  /// Records one event.
  ///
  /// `message` may contain `{N}` placeholders that are replaced by the
  /// rendered `args`. Events below the configured threshold are dropped
  /// without being formatted. Never fails and never panics on absent
  /// arguments; after [`dispose`](Self::dispose) this is a no-op.
  pub fn record(
    &self,
    source: &str,
    severity: Severity,
    id: i32,
    message: &str,
    args: Option<&[Option<&dyn Display>]>,
  ) {
    if !self.core.admits(severity) {
      return;
    }
    self
      .core
      .push(TraceRecord::capture(source, severity, id, message, args));
  }

  /// Records a plain message with no argument list.
  pub fn record_message(&self, source: &str, severity: Severity, id: i32, message: &str) {
    self.record(source, severity, id, message, None);
  }

  /// Records a single data value. The rendered value is both the message
  /// and the only argument.
  pub fn record_data(&self, source: &str, severity: Severity, id: i32, data: Option<&dyn Display>) {
    if !self.core.admits(severity) {
      return;
    }
    let rendered = format_scalar(data);
    let args: Args = std::iter::once(rendered.clone()).collect();
    self
      .core
      .push(TraceRecord::new(source, severity, id, rendered, Some(args)));
  }

  /// Swaps out the current partial page right away.
  ///
  /// Returns `false` if nothing was pending.
  pub fn flush(&self) -> bool {
    self.core.buffer.swap(FlushReason::Manual)
  }

  /// Registers a subscriber and returns its id.
  pub fn subscribe<S: PageSubscriber>(&self, subscriber: S) -> SubscriptionId {
    self.core.subscribers.add(Arc::new(subscriber))
  }

  /// Registers a shared subscriber.
  pub fn subscribe_arc(&self, subscriber: Arc<dyn PageSubscriber>) -> SubscriptionId {
    self.core.subscribers.add(subscriber)
  }

  /// Registers a closure as a subscriber.
  pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
  where
    F: Fn(&Arc<Page>) -> Result<(), SubscriberError> + Send + Sync + 'static,
  {
    self.core.subscribers.add(Arc::new(FnSubscriber(f)))
  }

  /// Removes a subscriber. Returns `false` if the id was unknown.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    self.core.subscribers.remove(id)
  }

  pub fn subscriber_count(&self) -> usize {
    self.core.subscribers.len()
  }

  /// Records waiting in the current page.
  pub fn pending(&self) -> usize {
    self.core.buffer.len()
  }

  pub fn config(&self) -> &TraceConfig {
    &self.core.config
  }

  pub fn name(&self) -> &str {
    self.core.config.name()
  }

  pub fn is_disposed(&self) -> bool {
    self.core.disposed.load(Ordering::Acquire)
  }

  /// Flushes the remaining partial page and stops the flush thread.
  ///
  /// When this returns, every page has been dispatched and no further
  /// records are accepted, also for a caller that raced another `dispose`.
  /// Calling it again does nothing. It may be called from a subscriber; the
  /// flush thread then finishes on its own once the current dispatch
  /// returns.
  pub fn dispose(&self) {
    if self.scheduler.is_flush_thread() {
      if !self.core.disposed.swap(true, Ordering::AcqRel) {
        self.core.buffer.close();
        self.scheduler.stop();
      }
      return;
    }

    let _guard = match self.disposing.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    let first = !self.core.disposed.swap(true, Ordering::AcqRel);
    let flushed = first && !self.core.buffer.is_empty();
    if first {
      self.core.buffer.close();
    }
    // Joins the flush thread unless an earlier call already did.
    self.scheduler.stop();

    if first {
      tracing::debug!(
        listener = %self.core.config.name(),
        final_page = flushed,
        pages = self.core.buffer.pages_swapped(),
        "trace listener disposed"
      );
    }
  }
}

impl Drop for TraceListener {
  fn drop(&mut self) {
    self.dispose();
  }
}

impl fmt::Debug for TraceListener {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TraceListener")
      .field("config", &self.core.config)
      .field("pending", &self.core.buffer.len())
      .field("subscribers", &self.core.subscribers.len())
      .field("disposed", &self.is_disposed())
      .finish()
  }
}
