//! Dispatcher tests: routing, ordering, drain and error delivery.

#[cfg(test)]
mod tests {
  use std::{
    collections::HashSet,
    sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
  };

  use pretty_assertions::assert_eq;

  use crate::actor::{
    DispatchError, Dispatcher, Route,
    __tests__::helpers::{Job, recording_dispatcher, seqs_for},
  };

  // ==========================================================================
  // Pool Setup
  // ==========================================================================

  #[tokio::test]
  async fn test_create_zero_workers_is_invalid() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    let err = dispatcher.create_workers(0).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidInput(_)));
    assert_eq!(dispatcher.worker_count(), 0);
  }

  #[tokio::test]
  async fn test_submit_without_workers() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    dispatcher.set_handler(|s: String| async move { Ok::<_, std::io::Error>(s.len()) });

    let err = dispatcher.submit("hello".to_string(), "k", true).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoWorkers));
  }

  #[tokio::test]
  async fn test_slot_ids_are_sequential_and_resolvable() {
    let (dispatcher, _log) = recording_dispatcher(3, Duration::ZERO);
    assert_eq!(dispatcher.slot_ids(), vec![1, 2, 3]);
    assert_eq!(dispatcher.worker_count(), 3);

    for key in ["a", "b", "c", "d", ""] {
      let id = dispatcher.resolve(&Route::from(key)).unwrap();
      assert!((1..=3).contains(&id), "slot {id} out of range for key {key:?}");
    }

    dispatcher.shutdown().await;
  }

  #[tokio::test]
  async fn test_empty_payload_is_rejected() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    dispatcher.set_handler(|s: String| async move { Ok::<_, std::io::Error>(s.len()) });
    dispatcher.create_workers(1).unwrap();

    let err = dispatcher.submit(String::new(), "k", false).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidInput(_)));

    dispatcher.shutdown().await;
  }

  // ==========================================================================
  // Round Trips
  // ==========================================================================

  #[tokio::test]
  async fn test_sync_submit_returns_handler_value() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    dispatcher.set_handler(|s: String| async move { Ok::<_, std::io::Error>(s.len() * 2) });
    dispatcher.create_workers(2).unwrap();

    let value = dispatcher.submit("hello".to_string(), "doc-1", true).await.unwrap();
    assert_eq!(value, Some(10));

    let detached = dispatcher.submit("hello".to_string(), "doc-1", false).await.unwrap();
    assert_eq!(detached, None);

    dispatcher.shutdown().await;
  }

  #[tokio::test]
  async fn test_handler_installed_after_workers() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    dispatcher.create_workers(2).unwrap();
    assert!(!dispatcher.has_handler());

    dispatcher.set_handler(|s: String| async move { Ok::<_, std::io::Error>(s.len()) });
    assert!(dispatcher.has_handler());

    for key in ["a", "b", "c", "d"] {
      assert_eq!(dispatcher.call("abc".to_string(), key).await.unwrap(), 3);
    }

    dispatcher.shutdown().await;
  }

  #[tokio::test]
  async fn test_missing_handler_reported_to_sync_caller() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    dispatcher.create_workers(1).unwrap();

    let err = dispatcher.call("x".to_string(), Route::Any).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoHandler(1)));

    dispatcher.shutdown().await;
  }

  // ==========================================================================
  // Ordering
  // ==========================================================================

  /// 2 slots, keys a,a,b,a: every `a` runs on one lane, in submission order.
  #[tokio::test]
  async fn test_sticky_key_scenario() {
    let (dispatcher, log) = recording_dispatcher(2, Duration::ZERO);

    let keys = ["a", "a", "b", "a"];
    let mut slots = Vec::new();
    for (seq, key) in keys.iter().enumerate() {
      let job = Job::new(key, seq);
      slots.push((key, dispatcher.resolve(&job.route()).unwrap()));
      let returned = dispatcher.submit(job.clone(), job.route(), true).await.unwrap();
      assert_eq!(returned, Some(seq));
    }

    let a_slots: HashSet<u64> = slots.iter().filter(|(k, _)| **k == "a").map(|(_, s)| *s).collect();
    assert_eq!(a_slots.len(), 1, "key a must stay on one slot");
    assert_eq!(dispatcher.bound_slot("a"), a_slots.into_iter().next());
    assert_eq!(seqs_for(&log, "a"), vec![0, 1, 3]);

    dispatcher.shutdown().await;
  }

  #[tokio::test]
  async fn test_fire_and_forget_is_fifo_per_key() {
    let (dispatcher, log) = recording_dispatcher(4, Duration::from_millis(1));

    for seq in 0..30 {
      for key in ["x", "y", "z"] {
        let job = Job::new(key, seq);
        dispatcher.submit(job.clone(), job.route(), false).await.unwrap();
      }
    }
    dispatcher.shutdown().await;

    let expected: Vec<usize> = (0..30).collect();
    for key in ["x", "y", "z"] {
      assert_eq!(seqs_for(&log, key), expected, "key {key} out of order");
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_one_in_flight_per_key() {
    let dispatcher: Arc<Dispatcher<String, ()>> = Arc::new(Dispatcher::new(64));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let (current, max) = (in_flight.clone(), max_seen.clone());
    dispatcher.set_handler(move |_: String| {
      let (current, max) = (current.clone(), max.clone());
      async move {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        current.fetch_sub(1, Ordering::SeqCst);
        Ok::<_, std::io::Error>(())
      }
    });
    dispatcher.create_workers(4).unwrap();

    let calls = (0..20).map(|i| {
      let dispatcher = dispatcher.clone();
      tokio::spawn(async move { dispatcher.call(format!("req-{i}"), Route::sticky("same-key")).await })
    });
    for result in futures::future::join_all(calls).await {
      result.unwrap().unwrap();
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    dispatcher.shutdown().await;
  }

  // ==========================================================================
  // Sticky Bindings
  // ==========================================================================

  #[tokio::test]
  async fn test_sticky_binding_survives_growth() {
    let (dispatcher, _log) = recording_dispatcher(2, Duration::ZERO);

    let bound = dispatcher.resolve(&Route::sticky("tenant-7")).unwrap();
    dispatcher.create_workers(5).unwrap();
    assert_eq!(dispatcher.worker_count(), 7);

    for _ in 0..10 {
      assert_eq!(dispatcher.resolve(&Route::sticky("tenant-7")).unwrap(), bound);
    }
    assert_eq!(dispatcher.bound_slot("tenant-7"), Some(bound));

    dispatcher.shutdown().await;
  }

  #[tokio::test]
  async fn test_sticky_binding_rebinds_after_rebuild() {
    let (dispatcher, _log) = recording_dispatcher(2, Duration::ZERO);
    let first = dispatcher.resolve(&Route::sticky("k")).unwrap();
    assert!(first <= 2);

    dispatcher.shutdown().await;
    assert_eq!(dispatcher.worker_count(), 0);
    assert_eq!(dispatcher.bound_slot("k"), Some(first), "bindings outlive shutdown");

    let ids = dispatcher.create_workers(2).unwrap();
    assert_eq!(ids, vec![3, 4], "ids are never reused");

    let rebound = dispatcher.resolve(&Route::sticky("k")).unwrap();
    assert!(ids.contains(&rebound));
    assert_eq!(dispatcher.bound_slot("k"), Some(rebound));

    dispatcher.shutdown().await;
  }

  #[tokio::test]
  async fn test_hashed_route_is_deterministic_and_uncached() {
    let (dispatcher, _log) = recording_dispatcher(5, Duration::ZERO);

    let first = dispatcher.resolve(&Route::hashed("doc-99")).unwrap();
    for _ in 0..10 {
      assert_eq!(dispatcher.resolve(&Route::hashed("doc-99")).unwrap(), first);
    }
    assert_eq!(dispatcher.bound_slot("doc-99"), None);

    dispatcher.shutdown().await;
  }

  // ==========================================================================
  // Shutdown & Drain
  // ==========================================================================

  #[tokio::test]
  async fn test_shutdown_drains_buffered_requests_once() {
    let (dispatcher, log) = recording_dispatcher(2, Duration::from_millis(2));

    for seq in 0..40 {
      let job = Job::new(if seq % 2 == 0 { "even" } else { "odd" }, seq);
      dispatcher.submit(job.clone(), job.route(), false).await.unwrap();
    }
    dispatcher.shutdown().await;

    let seen: Vec<usize> = log.lock().iter().map(|job| job.seq).collect();
    assert_eq!(seen.len(), 40);
    let unique: HashSet<usize> = seen.into_iter().collect();
    assert_eq!(unique.len(), 40);
  }

  #[tokio::test]
  async fn test_pending_counts_buffered_requests() {
    let dispatcher: Dispatcher<String, ()> = Dispatcher::new(8);
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let handler_gate = gate.clone();
    dispatcher.set_handler(move |_: String| {
      let (gate, started) = (handler_gate.clone(), started_tx.clone());
      async move {
        let _ = started.send(());
        let _permit = gate.acquire().await?;
        Ok::<_, tokio::sync::AcquireError>(())
      }
    });
    dispatcher.create_workers(1).unwrap();
    assert_eq!(dispatcher.pending(), 0);

    for name in ["a", "b", "c"] {
      dispatcher.cast(name.to_string(), Route::Any).await.unwrap();
    }
    started_rx.recv().await.unwrap();
    assert_eq!(dispatcher.pending(), 2);
    assert_eq!(dispatcher.pending_by_slot(), vec![(1, 2)]);

    gate.add_permits(3);
    dispatcher.shutdown().await;
    assert_eq!(dispatcher.pending(), 0);
  }

  #[tokio::test]
  async fn test_submit_after_shutdown() {
    let (dispatcher, _log) = recording_dispatcher(2, Duration::ZERO);
    dispatcher.shutdown().await;
    dispatcher.shutdown().await;

    let err = dispatcher.submit(Job::new("a", 0), Route::sticky("a"), false).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoWorkers));
  }

  #[tokio::test]
  async fn test_timed_out_caller_does_not_cancel_work() {
    let dispatcher: Dispatcher<String, ()> = Dispatcher::new(8);
    let done = Arc::new(AtomicUsize::new(0));
    let counter = done.clone();
    dispatcher.set_handler(move |_: String| {
      let counter = counter.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, std::io::Error>(())
      }
    });
    dispatcher.create_workers(1).unwrap();

    let result = tokio::time::timeout(
      Duration::from_millis(5),
      dispatcher.call("slow".to_string(), Route::sticky("k")),
    )
    .await;
    assert!(result.is_err(), "caller should time out");

    dispatcher.shutdown().await;
    assert_eq!(done.load(Ordering::SeqCst), 1);
  }

  // ==========================================================================
  // Handler Failures
  // ==========================================================================

  #[tokio::test]
  async fn test_handler_error_only_reaches_sync_callers() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    dispatcher.set_handler(|s: String| async move {
      if s == "bad" {
        Err(std::io::Error::other("rejected"))
      } else {
        Ok(s.len())
      }
    });
    dispatcher.create_workers(1).unwrap();

    let err = dispatcher.submit("bad".to_string(), "k", true).await.unwrap_err();
    match err {
      DispatchError::Handler(inner) => assert_eq!(inner.to_string(), "rejected"),
      other => panic!("unexpected error: {other:?}"),
    }

    let detached = dispatcher.submit("bad".to_string(), "k", false).await.unwrap();
    assert_eq!(detached, None);

    // The lane keeps serving after both failures.
    assert_eq!(dispatcher.call("good".to_string(), "k").await.unwrap(), 4);
    dispatcher.shutdown().await;
  }

  #[tokio::test]
  async fn test_handler_panic_is_isolated() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    dispatcher.set_handler(|s: String| async move {
      if s == "boom" {
        panic!("handler exploded");
      }
      Ok::<_, std::io::Error>(s.len())
    });
    dispatcher.create_workers(1).unwrap();

    let err = dispatcher.call("boom".to_string(), "k").await.unwrap_err();
    match err {
      DispatchError::HandlerPanicked(message) => assert!(message.contains("handler exploded")),
      other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(dispatcher.call("fine".to_string(), "k").await.unwrap(), 4);
    dispatcher.shutdown().await;
  }

  // ==========================================================================
  // Broadcast
  // ==========================================================================

  #[tokio::test]
  async fn test_broadcast_reaches_every_lane() {
    let (dispatcher, log) = recording_dispatcher(3, Duration::ZERO);

    let delivered = dispatcher.broadcast(Job::new("all", 0)).await.unwrap();
    assert_eq!(delivered, 3);

    dispatcher.shutdown().await;
    assert_eq!(seqs_for(&log, "all"), vec![0, 0, 0]);
  }

  #[tokio::test]
  async fn test_broadcast_without_workers() {
    let dispatcher: Dispatcher<String, usize> = Dispatcher::new(8);
    let err = dispatcher.broadcast("ping".to_string()).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoWorkers));
  }
}
