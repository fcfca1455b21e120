//! # tracepage
//!
//! In-process trace buffering. Producers record events on any thread; the
//! engine collects them into bounded pages and hands every completed page to
//! the registered subscribers, either when the page is full or when the
//! configured flush interval has elapsed.
//!
//! ```rust,ignore
//! use tracepage::{Severity, TraceListener, TraceOptions};
//!
//! let config = TraceOptions::default()
//!   .with_name("billing")
//!   .with_page_size(512)
//!   .validate()?;
//! let listener = TraceListener::new(config)?;
//!
//! listener.subscribe_fn(|page| {
//!   println!("{} records ({})", page.len(), page.reason);
//!   Ok(())
//! });
//!
//! listener.record_message("billing", Severity::Information, 7, "invoice sent");
//! listener.dispose();
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod listener;
pub mod page;
pub mod record;
pub mod scheduler;
pub mod severity;
pub mod static_hook;
pub mod utils;

pub use config::{StaticHookMode, TraceConfig, TraceOptions};
pub use error::{ConfigError, SubscriberError, TraceError};
pub use listener::{FnSubscriber, PageSubscriber, SubscriptionId, TraceListener};
pub use page::{FlushReason, Page};
pub use record::{format_list, format_message, format_scalar, TraceRecord, NULL_DATA};
pub use severity::Severity;
