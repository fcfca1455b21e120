
use crossbeam_channel::Sender;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::page::{FlushReason, Page};
use crate::record::TraceRecord;
use crate::scheduler::Message;

/// Upper bound on the capacity reserved for a fresh page.
const PREALLOCATED_RECORDS: usize = 1024;

/// Result of [`PageBuffer::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
  /// Stored; the page still has room
  Buffered,
  /// Stored, and the page reached capacity and was swapped out
  Flushed,
  /// The buffer is closed; the record was dropped
  Closed,
}

#[derive(Debug)]
struct PageState {
  current: Vec<TraceRecord>,
  last_flush: Instant,
  sequence: u64,
  closed: bool,
}

/// Bounded page of records shared by every producer of one listener.
///
/// All page state lives behind one mutex. A swap detaches the current page
/// and pushes it onto the flush queue *while the lock is held*, so the queue
/// sees pages in exactly the order they were swapped, every page reaches
/// exactly one consumer, and no record is lost or duplicated.
///
/// Size-triggered swaps happen inside [`append`](Self::append) itself, which
/// means a page can never grow past `page_size` even when many producers
/// append at the same time.
#[derive(Debug)]
pub struct PageBuffer {
  name: String,
  page_size: usize,
  state: Mutex<PageState>,
  outbox: Sender<Message>,
}

impl PageBuffer {
  /// # Panics
  /// Panics if `page_size` is 0. A validated `TraceConfig` never has one.
  pub fn new(name: impl Into<String>, page_size: usize, outbox: Sender<Message>) -> Self {
    if page_size == 0 {
      panic!("page size must be greater than 0");
    }

    Self {
      name: name.into(),
      page_size,
      state: Mutex::new(PageState {
        current: Vec::with_capacity(page_size.min(PREALLOCATED_RECORDS)),
        last_flush: Instant::now(),
        sequence: 0,
        closed: false,
      }),
      outbox,
    }
  }

  /// Appends `record`, swapping the page out if it is now full.
  pub fn append(&self, record: TraceRecord) -> AppendOutcome {
    let mut state = self.lock();
    if state.closed {
      return AppendOutcome::Closed;
    }

    state.current.push(record);
    if state.current.len() >= self.page_size {
      self.swap_locked(&mut state, FlushReason::Size);
      AppendOutcome::Flushed
    } else {
      AppendOutcome::Buffered
    }
  }

  /// Detaches the current page and queues it for dispatch.
  ///
  /// Returns `false` without touching the baseline if the page is empty or
  /// the buffer is closed.
  pub fn swap(&self, reason: FlushReason) -> bool {
    let mut state = self.lock();
    if state.closed || state.current.is_empty() {
      return false;
    }
    self.swap_locked(&mut state, reason);
    true
  }

  /// Timer path. If `interval` has passed since the last flush, swaps out a
  /// non-empty page and resets the baseline either way.
  ///
  /// Returns how long to wait before the next check.
  pub fn flush_if_due(&self, interval: Duration) -> Duration {
    let mut state = self.lock();
    if state.closed {
      return interval;
    }

    let elapsed = state.last_flush.elapsed();
    if elapsed < interval {
      return interval - elapsed;
    }

    if state.current.is_empty() {
      state.last_flush = Instant::now();
    } else {
      self.swap_locked(&mut state, FlushReason::Interval);
    }
    interval
  }

  /// Closes the buffer and queues whatever partial page remains.
  ///
  /// Returns `false` if the buffer was already closed. Appends after this
  /// return [`AppendOutcome::Closed`].
  pub fn close(&self) -> bool {
    let mut state = self.lock();
    if state.closed {
      return false;
    }
    if !state.current.is_empty() {
      self.swap_locked(&mut state, FlushReason::Dispose);
    }
    state.closed = true;
    true
  }

  pub fn len(&self) -> usize {
    self.lock().current.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().current.is_empty()
  }

  pub fn is_closed(&self) -> bool {
    self.lock().closed
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  /// Number of pages swapped out so far.
  pub fn pages_swapped(&self) -> u64 {
    self.lock().sequence
  }

  fn swap_locked(&self, state: &mut PageState, reason: FlushReason) {
    let fresh = Vec::with_capacity(self.page_size.min(PREALLOCATED_RECORDS));
    let records = std::mem::replace(&mut state.current, fresh);
    state.sequence += 1;
    state.last_flush = Instant::now();

    let page = Page::new(self.name.as_str(), state.sequence, reason, records);
    if let Err(err) = self.outbox.send(Message::Page(page)) {
      if let Message::Page(page) = err.into_inner() {
        tracing::error!(
          listener = %self.name,
          records = page.len(),
          "flush queue disconnected, page dropped"
        );
      }
    }
  }

  /// Push and replace are the only mutations, so a poisoned lock still
  /// guards a consistent page.
  fn lock(&self) -> MutexGuard<'_, PageState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}
