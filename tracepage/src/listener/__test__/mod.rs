#[cfg(test)]
mod __test__ {
  use crossbeam_channel::{unbounded, Receiver};
  use std::collections::HashSet;
  use std::fmt::Display;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex, OnceLock, Weak};
  use std::thread;
  use std::time::{Duration, Instant};

  use crate::config::TraceOptions;
  use crate::error::{ConfigError, SubscriberError, TraceError};
  use crate::listener::{PageSubscriber, TraceListener};
  use crate::page::{FlushReason, Page};
  use crate::record::{DIAGNOSTIC_ID, NULL_DATA};
  use crate::severity::Severity;

  const LONG: Duration = Duration::from_secs(60);

  fn listener(page_size: usize, interval: Duration) -> TraceListener {
    TraceListener::from_options(
      TraceOptions::default()
        .with_name("test")
        .with_page_size(page_size)
        .with_max_flush_interval(interval)
        .with_min_severity(Severity::All),
    )
    .expect("listener starts")
  }

  fn collector(listener: &TraceListener) -> Receiver<Arc<Page>> {
    let (tx, rx) = unbounded();
    listener.subscribe_fn(move |page| {
      let _ = tx.send(Arc::clone(page));
      Ok(())
    });
    rx
  }

  fn ids(page: &Page) -> Vec<i32> {
    page.iter().map(|r| r.id).collect()
  }

  #[test]
  fn invalid_configuration_fails_construction() {
    let err = TraceListener::from_options(TraceOptions::default().with_page_size(0)).unwrap_err();
    assert!(matches!(err, TraceError::Config(ConfigError::InvalidPageSize(0))));

    let err = TraceListener::from_options(
      TraceOptions::default().with_max_flush_interval(Duration::from_millis(10)),
    )
    .unwrap_err();
    assert!(matches!(
      err,
      TraceError::Config(ConfigError::FlushIntervalTooShort { .. })
    ));
  }

  #[test]
  fn full_page_is_flushed_immediately_in_insertion_order() {
    let listener = listener(5, LONG);
    let pages = collector(&listener);

    for i in 0..5 {
      listener.record_message("svc", Severity::Information, i, "event");
    }
    assert_eq!(listener.pending(), 0);

    let page = pages.recv_timeout(Duration::from_secs(2)).expect("size flush");
    assert_eq!(page.reason, FlushReason::Size);
    assert_eq!(ids(&page), vec![0, 1, 2, 3, 4]);
    assert!(pages.try_recv().is_err());
  }

  #[test]
  fn partial_page_is_flushed_after_the_interval() {
    let interval = Duration::from_millis(100);
    let listener = listener(100, interval);
    let pages = collector(&listener);

    let start = Instant::now();
    for i in 0..3 {
      listener.record_message("svc", Severity::Information, i, "event");
    }

    let page = pages.recv_timeout(Duration::from_secs(2)).expect("interval flush");
    assert!(start.elapsed() >= interval - Duration::from_millis(5));
    assert_eq!(page.reason, FlushReason::Interval);
    assert_eq!(ids(&page), vec![0, 1, 2]);
    assert_eq!(listener.pending(), 0);

    // Nothing new was recorded, so quiet intervals produce no pages.
    assert!(pages.recv_timeout(interval * 3).is_err());
  }

  #[test]
  fn records_below_threshold_are_dropped() {
    let listener = TraceListener::from_options(
      TraceOptions::default()
        .with_min_severity(Severity::Warning)
        .with_max_flush_interval(LONG),
    )
    .unwrap();
    let pages = collector(&listener);

    listener.record_message("svc", Severity::Information, 1, "info");
    listener.record_message("svc", Severity::Verbose, 2, "verbose");
    listener.record_message("svc", Severity::Warning, 3, "warning");
    listener.record_message("svc", Severity::Error, 4, "error");
    listener.record_message("svc", Severity::Critical, 5, "critical");
    assert_eq!(listener.pending(), 3);

    listener.dispose();
    let page = pages.try_recv().expect("final page");
    assert_eq!(ids(&page), vec![3, 4, 5]);
  }

  #[test]
  fn record_formats_arguments_and_tolerates_missing_ones() {
    let listener = listener(10, LONG);
    let pages = collector(&listener);

    let user = "alice";
    let args: [Option<&dyn Display>; 2] = [Some(&user), None];
    listener.record("auth", Severity::Warning, 7, "{0} failed with {1}", Some(&args[..]));
    listener.record_data("auth", Severity::Warning, 8, None);
    listener.record_data("auth", Severity::Warning, 9, Some(&3.5));
    listener.dispose();

    let page = pages.try_recv().expect("final page");
    assert_eq!(page.reason, FlushReason::Dispose);
    assert_eq!(page.records[0].message, "alice failed with NULL_DATA");
    assert_eq!(page.records[1].message, NULL_DATA);
    assert_eq!(page.records[2].message, "3.5");
    assert_eq!(
      page.records[2].args.as_ref().map(|a| a.to_vec()),
      Some(vec!["3.5".to_string()])
    );
  }

  #[test]
  fn concurrent_producers_lose_and_duplicate_nothing() {
    const PRODUCERS: i32 = 8;
    const PER_PRODUCER: i32 = 2_500;

    let listener = Arc::new(listener(97, Duration::from_millis(50)));
    let pages = collector(&listener);

    let handles: Vec<_> = (0..PRODUCERS)
      .map(|p| {
        let listener = Arc::clone(&listener);
        thread::spawn(move || {
          for i in 0..PER_PRODUCER {
            listener.record_message("load", Severity::Information, p * PER_PRODUCER + i, "tick");
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }
    listener.dispose();

    let mut seen = HashSet::new();
    let mut last_sequence = 0;
    for page in pages.try_iter() {
      assert!(!page.is_empty() && page.len() <= 97);
      assert!(page.sequence > last_sequence, "pages delivered out of order");
      last_sequence = page.sequence;
      for record in page.iter() {
        assert!(seen.insert(record.id), "duplicate record {}", record.id);
      }
    }
    assert_eq!(seen.len(), (PRODUCERS * PER_PRODUCER) as usize);
  }

  #[test]
  fn dispose_twice_flushes_once() {
    let listener = listener(10, LONG);
    let pages = collector(&listener);
    listener.record_message("svc", Severity::Information, 1, "pending");

    listener.dispose();
    assert!(listener.is_disposed());
    listener.dispose();

    assert_eq!(pages.try_iter().count(), 1);
  }

  #[test]
  fn racing_dispose_waits_for_the_final_dispatch() {
    let listener = Arc::new(listener(10, LONG));
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    listener.subscribe_fn(move |_page| {
      thread::sleep(Duration::from_millis(300));
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(())
    });
    listener.record_message("svc", Severity::Information, 1, "pending");

    let first = {
      let listener = Arc::clone(&listener);
      thread::spawn(move || listener.dispose())
    };
    thread::sleep(Duration::from_millis(50));
    listener.dispose();

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    first.join().unwrap();
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn dispose_with_empty_page_dispatches_nothing() {
    let listener = listener(10, LONG);
    let pages = collector(&listener);
    listener.dispose();
    assert_eq!(pages.try_iter().count(), 0);
  }

  #[test]
  fn records_after_dispose_are_ignored() {
    let listener = listener(1, LONG);
    let pages = collector(&listener);
    listener.dispose();

    listener.record_message("svc", Severity::Critical, 1, "late");
    assert!(!listener.flush());
    assert_eq!(listener.pending(), 0);
    assert_eq!(pages.try_iter().count(), 0);
  }

  #[test]
  fn failing_subscriber_does_not_starve_healthy_one() {
    let listener = listener(2, LONG);
    let failing = listener.subscribe_fn(|_page| Err("disk full".into()));
    let pages = collector(&listener);

    for i in 0..6 {
      listener.record_message("svc", Severity::Information, i, "event");
    }
    listener.dispose();

    let received: Vec<_> = pages.try_iter().collect();
    let regular: Vec<_> = received.iter().filter(|p| !p.is_diagnostic()).collect();
    let diagnostics: Vec<_> = received.iter().filter(|p| p.is_diagnostic()).collect();

    assert_eq!(regular.len(), 3);
    let all_ids: Vec<i32> = regular.iter().flat_map(|p| ids(p)).collect();
    assert_eq!(all_ids, vec![0, 1, 2, 3, 4, 5]);

    assert_eq!(diagnostics.len(), 3);
    for page in diagnostics {
      assert_eq!(page.len(), 1);
      let record = &page.records[0];
      assert_eq!(record.severity, Severity::Error);
      assert_eq!(record.id, DIAGNOSTIC_ID);
      assert!(record.message.contains(&failing.to_string()));
      assert!(record.message.contains("disk full"));
    }
  }

  #[test]
  fn panicking_subscriber_is_contained() {
    let listener = listener(1, LONG);
    listener.subscribe_fn(|_page| panic!("subscriber exploded"));
    let pages = collector(&listener);

    listener.record_message("svc", Severity::Information, 1, "event");
    listener.dispose();

    let received: Vec<_> = pages.try_iter().collect();
    assert_eq!(received.len(), 2);
    assert_eq!(ids(&received[0]), vec![1]);
    assert!(received[1].is_diagnostic());
    assert!(received[1].records[0].message.contains("subscriber exploded"));
  }

  #[test]
  fn unsubscribe_stops_delivery() {
    let listener = listener(1, LONG);
    let (tx, rx) = unbounded();
    let id = listener.subscribe_fn(move |page| {
      let _ = tx.send(page.sequence);
      Ok(())
    });
    assert_eq!(listener.subscriber_count(), 1);

    listener.record_message("svc", Severity::Information, 1, "first");
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).ok(), Some(1));

    assert!(listener.unsubscribe(id));
    assert!(!listener.unsubscribe(id));
    assert_eq!(listener.subscriber_count(), 0);

    listener.record_message("svc", Severity::Information, 2, "second");
    listener.dispose();
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn manual_flush_sends_partial_page() {
    let listener = listener(10, LONG);
    let pages = collector(&listener);
    listener.record_message("svc", Severity::Information, 1, "event");

    assert!(listener.flush());
    assert!(!listener.flush());
    let page = pages.recv_timeout(Duration::from_secs(2)).expect("manual page");
    assert_eq!(page.reason, FlushReason::Manual);
  }

  #[derive(Default)]
  struct Lifecycle {
    subscribed: AtomicUsize,
    pages: AtomicUsize,
    order: Mutex<Vec<&'static str>>,
  }

  struct LifecycleSubscriber(Arc<Lifecycle>);

  impl PageSubscriber for LifecycleSubscriber {
    fn on_page(&self, _page: &Arc<Page>) -> Result<(), SubscriberError> {
      self.0.pages.fetch_add(1, Ordering::SeqCst);
      self.0.order.lock().unwrap().push("page");
      Ok(())
    }

    fn on_subscribe(&self) {
      self.0.subscribed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_shutdown(&self) {
      self.0.order.lock().unwrap().push("shutdown");
    }
  }

  #[test]
  fn subscriber_hooks_run_around_delivery() {
    let state = Arc::new(Lifecycle::default());
    let listener = listener(10, LONG);
    listener.subscribe(LifecycleSubscriber(Arc::clone(&state)));
    assert_eq!(state.subscribed.load(Ordering::SeqCst), 1);

    listener.record_message("svc", Severity::Information, 1, "event");
    listener.dispose();

    assert_eq!(state.pages.load(Ordering::SeqCst), 1);
    assert_eq!(*state.order.lock().unwrap(), vec!["page", "shutdown"]);
  }

  #[test]
  fn slow_subscriber_does_not_block_producers() {
    let listener = listener(1, LONG);
    listener.subscribe_fn(|_page| {
      thread::sleep(Duration::from_millis(200));
      Ok(())
    });

    let start = Instant::now();
    for i in 0..5 {
      listener.record_message("svc", Severity::Information, i, "event");
    }
    assert!(start.elapsed() < Duration::from_millis(200));
  }

  #[test]
  fn dispose_from_inside_a_subscriber_does_not_deadlock() {
    let listener = Arc::new(listener(1, LONG));
    let handle: Arc<OnceLock<Weak<TraceListener>>> = Arc::new(OnceLock::new());
    let _ = handle.set(Arc::downgrade(&listener));

    let (tx, rx) = unbounded();
    let inner = Arc::clone(&handle);
    listener.subscribe_fn(move |_page| {
      if let Some(listener) = inner.get().and_then(Weak::upgrade) {
        listener.dispose();
      }
      let _ = tx.send(());
      Ok(())
    });

    listener.record_message("svc", Severity::Information, 1, "event");
    rx.recv_timeout(Duration::from_secs(2)).expect("subscriber ran");
    assert!(listener.is_disposed());

    listener.record_message("svc", Severity::Information, 2, "late");
    assert_eq!(listener.pending(), 0);
  }

  #[test]
  fn debug_output_shows_state() {
    let listener = listener(10, LONG);
    listener.record_message("svc", Severity::Information, 1, "event");
    let debug = format!("{:?}", listener);
    assert!(debug.contains("TraceListener"));
    assert!(debug.contains("pending: 1"));
  }
}
