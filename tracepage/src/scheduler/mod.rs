//! # Flush scheduler
//!
//! One dedicated thread per listener. It is both the periodic timer and the
//! only place pages are handed to subscribers:
//!
//! - **Pages**: every swap, whatever triggered it, lands on the flush queue
//!   in swap order and is dispatched from here, so producers never wait on
//!   a subscriber.
//! - **Timer**: the thread waits on the queue with a timeout equal to the
//!   time left until the next flush is due. On timeout it asks the buffer to
//!   flush, which resets the baseline whether or not anything was pending.
//! - **Cancellation**: [`Message::Shutdown`] ends the loop once every page
//!   queued so far has been dispatched, including pages that arrive behind
//!   a second `Shutdown`.


use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crate::page::Page;

/// Messages carried by the flush queue.
#[derive(Debug)]
pub enum Message {
  /// A detached page waiting for dispatch
  Page(Page),
  /// Stop after everything queued so far has been dispatched
  Shutdown,
}

impl std::fmt::Display for Message {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Message::Page(page) => write!(f, "Page: #{} ({} records)", page.sequence, page.len()),
      Message::Shutdown => write!(f, "Shutdown"),
    }
  }
}

/// Handle on the flush thread.
#[derive(Debug)]
pub struct FlushScheduler {
  sender: Sender<Message>,
  flush_thread: ThreadId,
  handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
  /// Spawns the flush thread.
  ///
  /// - `tick` runs before every wait on the queue and returns how long that
  ///   wait may last.
  /// - `dispatch` receives every page pulled off the queue, in order.
  /// - `finish` runs once on the flush thread after the last dispatch.
  pub fn spawn<T, D, F>(
    thread_name: String,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    tick: T,
    dispatch: D,
    finish: F,
  ) -> std::io::Result<Self>
  where
    T: FnMut() -> Duration + Send + 'static,
    D: FnMut(Page) + Send + 'static,
    F: FnOnce() + Send + 'static,
  {
    let handle = thread::Builder::new().name(thread_name).spawn(move || {
      Self::flush_loop(receiver, tick, dispatch);
      finish();
    })?;

    Ok(Self {
      sender,
      flush_thread: handle.thread().id(),
      handle: Mutex::new(Some(handle)),
    })
  }

  fn flush_loop<T, D>(receiver: Receiver<Message>, mut tick: T, mut dispatch: D)
  where
    T: FnMut() -> Duration,
    D: FnMut(Page),
  {
    tracing::debug!("flush thread started");

    loop {
      let wait = tick();
      match receiver.recv_timeout(wait) {
        Ok(Message::Page(page)) => dispatch(page),
        Ok(Message::Shutdown) => break,
        Err(RecvTimeoutError::Timeout) => {},
        Err(RecvTimeoutError::Disconnected) => break,
      }
    }

    for message in receiver.try_iter() {
      if let Message::Page(page) = message {
        dispatch(page);
      }
    }

    tracing::debug!("flush thread stopped");
  }

  /// Signals the thread to stop and waits for it to finish dispatching.
  ///
  /// Safe to call more than once. From the flush thread itself it only
  /// signals; the thread exits when the current dispatch returns and a later
  /// call from another thread still joins it. Returns `true` on the call
  /// that joined the thread.
  pub fn stop(&self) -> bool {
    if self.is_flush_thread() {
      let _ = self.sender.send(Message::Shutdown);
      return false;
    }

    let handle = match self.handle.lock() {
      Ok(mut guard) => guard.take(),
      Err(poisoned) => poisoned.into_inner().take(),
    };
    let Some(handle) = handle else {
      return false;
    };

    let _ = self.sender.send(Message::Shutdown);
    if handle.join().is_err() {
      tracing::error!("flush thread panicked");
    }
    true
  }

  /// `true` when called from the flush thread, e.g. inside a subscriber.
  pub fn is_flush_thread(&self) -> bool {
    thread::current().id() == self.flush_thread
  }

  pub fn is_running(&self) -> bool {
    match self.handle.lock() {
      Ok(guard) => guard.as_ref().is_some_and(|h| !h.is_finished()),
      Err(poisoned) => poisoned.into_inner().as_ref().is_some_and(|h| !h.is_finished()),
    }
  }
}
