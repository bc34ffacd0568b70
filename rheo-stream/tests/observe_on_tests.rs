// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rheo_core::{Publisher, RheoError};
use rheo_runtime::tokio_factory;
use rheo_stream::{from_values, ObserveOn, PublisherExt, ReplayProcessor};
use rheo_test_utils::{wait_until, ConditionalTestSubscriber, ManualWorker, TestPublisher, TestSubscriber};

#[test]
fn prefetch_and_limit_replenishment() {
    // Arrange - prefetch 2, so the replenish limit is 2 - 2/4 = 2
    let upstream = TestPublisher::<i32>::new();
    let worker = ManualWorker::new();
    let boundary = ObserveOn::new(upstream.clone(), worker.factory(), false, 2);
    let downstream = TestSubscriber::new(0);
    boundary.subscribe(downstream.clone());

    // The boundary prefetches before any downstream demand exists.
    assert_eq!(upstream.requests(), vec![2]);

    // Act - downstream wants 3, upstream delivers the prefetched pair
    downstream.request(3);
    upstream.emit(10);
    upstream.emit(20);
    worker.run_all();

    assert_eq!(downstream.values(), vec![10, 20]);
    // Two consumed items hit the limit: one replenishment of 2.
    assert_eq!(upstream.requests(), vec![2, 2]);

    // Act - two more arrive but only one unit of demand remains
    upstream.emit(30);
    upstream.emit(40);
    worker.run_all();
    assert_eq!(downstream.values(), vec![10, 20, 30]);

    // Act - the blocked value moves on fresh demand
    downstream.request(2);
    worker.run_all();
    assert_eq!(downstream.values(), vec![10, 20, 30, 40]);
    assert_eq!(upstream.requests(), vec![2, 2, 2]);

    // Act - final value and completion
    upstream.emit(50);
    upstream.complete();
    worker.run_all();

    assert_eq!(downstream.values(), vec![10, 20, 30, 40, 50]);
    assert!(downstream.is_complete());
    assert_eq!(worker.disposals(), 1);
}

#[test]
fn delayed_error_waits_for_the_queue_to_drain() {
    let upstream = TestPublisher::<i32>::new();
    let worker = ManualWorker::new();
    let boundary = ObserveOn::new(upstream.clone(), worker.factory(), true, 8);
    let downstream = TestSubscriber::new(u64::MAX);
    boundary.subscribe(downstream.clone());

    upstream.emit(1);
    upstream.emit(2);
    upstream.error(RheoError::failed("x"));
    worker.run_all();

    // Both buffered values are delivered before the error.
    assert_eq!(downstream.values(), vec![1, 2]);
    assert_eq!(downstream.error().map(|e| e.to_string()), Some("x".into()));
}

#[test]
fn eager_error_preempts_later_values() {
    let upstream = TestPublisher::<i32>::new();
    let worker = ManualWorker::new();
    let boundary = ObserveOn::new(upstream.clone(), worker.factory(), false, 8);
    let downstream = TestSubscriber::new(u64::MAX);
    boundary.subscribe(downstream.clone());

    upstream.emit(1);
    worker.run_all();
    upstream.error(RheoError::failed("x"));
    upstream.emit(2);
    worker.run_all();

    // Value 2 arrived after the terminal and is discarded.
    assert_eq!(downstream.values(), vec![1]);
    assert_eq!(downstream.error().map(|e| e.to_string()), Some("x".into()));
}

#[test]
fn eager_error_clears_still_queued_values() {
    let upstream = TestPublisher::<i32>::new();
    let worker = ManualWorker::new();
    let boundary = ObserveOn::new(upstream.clone(), worker.factory(), false, 8);
    let downstream = TestSubscriber::new(u64::MAX);
    boundary.subscribe(downstream.clone());

    // Error and values land before the worker ever ticks.
    upstream.emit(1);
    upstream.error(RheoError::failed("x"));
    worker.run_all();

    assert!(downstream.values().is_empty());
    assert_eq!(downstream.error().map(|e| e.to_string()), Some("x".into()));
}

#[test]
fn overrunning_source_is_cancelled_with_queue_full() {
    // prefetch 1 backs the boundary with a ring of capacity 2
    let upstream = TestPublisher::<i32>::new();
    let worker = ManualWorker::new();
    let boundary = ObserveOn::new(upstream.clone(), worker.factory(), false, 1);
    let downstream = TestSubscriber::new(0);
    boundary.subscribe(downstream.clone());

    upstream.emit(1);
    upstream.emit(2);
    upstream.emit(3);
    worker.run_all();

    assert!(upstream.is_cancelled());
    assert!(matches!(downstream.error(), Some(RheoError::QueueFull)));
}

#[test]
fn cancellation_cancels_upstream_and_disposes_the_worker() {
    let upstream = TestPublisher::<i32>::new();
    let worker = ManualWorker::new();
    let boundary = ObserveOn::new(upstream.clone(), worker.factory(), false, 4);
    let downstream = TestSubscriber::new(0);
    boundary.subscribe(downstream.clone());

    upstream.emit(1);
    downstream.cancel();
    worker.run_all();

    assert!(upstream.is_cancelled());
    assert!(worker.disposals() >= 1);
    assert!(!downstream.is_terminated());
    assert!(downstream.values().is_empty());
}

#[test]
fn sync_fused_source_skips_the_intermediate_queue() {
    // The iterator source grants sync fusion: the boundary polls it directly
    // and never issues an upstream request.
    let worker = ManualWorker::new();
    let boundary = from_values(vec![1, 2, 3]).observe_on(worker.factory(), false, 8);
    let downstream = TestSubscriber::new(u64::MAX);
    boundary.subscribe(downstream.clone());

    worker.run_all();

    assert_eq!(downstream.values(), vec![1, 2, 3]);
    assert!(downstream.is_complete());
    assert_eq!(worker.disposals(), 1);
}

#[test]
fn async_fused_replay_is_polled_through_the_boundary() {
    let replay = ReplayProcessor::unbounded();
    let worker = ManualWorker::new();
    let boundary = ObserveOn::new(replay.clone(), worker.factory(), false, 4);
    let downstream = TestSubscriber::new(u64::MAX);
    boundary.subscribe(downstream.clone());

    replay.next(1);
    replay.next(2);
    replay.complete();
    worker.run_all();

    assert_eq!(downstream.values(), vec![1, 2]);
    assert!(downstream.is_complete());
}

#[test]
fn conditional_downstream_keeps_prefetch_accounting() {
    // Arrange - every polled item counts toward replenishment even when the
    // conditional downstream refuses it.
    let upstream = TestPublisher::<i32>::new();
    let worker = ManualWorker::new();
    let boundary = ObserveOn::new(upstream.clone(), worker.factory(), false, 4);
    let downstream = ConditionalTestSubscriber::new(u64::MAX, |v: &i32| v % 2 == 0);
    boundary.subscribe_conditional(downstream.clone());

    assert_eq!(upstream.requests(), vec![4]);

    // Act - three refused and three accepted values; limit is 4 - 1 = 3
    for v in [1, 3, 5, 2, 4, 6] {
        upstream.emit(v);
        worker.run_all();
    }

    assert_eq!(downstream.accepted(), vec![2, 4, 6]);
    assert_eq!(downstream.rejected(), vec![1, 3, 5]);
    // Six polled items: two replenishments of 3.
    assert_eq!(upstream.requests(), vec![4, 3, 3]);

    upstream.complete();
    worker.run_all();
    assert!(downstream.is_complete());
}

#[tokio::test]
async fn tokio_worker_preserves_order_end_to_end() -> anyhow::Result<()> {
    let upstream = TestPublisher::<i32>::new();
    let boundary = ObserveOn::new(upstream.clone(), tokio_factory(), false, 16);
    let downstream = TestSubscriber::new(u64::MAX);
    boundary.subscribe(downstream.clone());

    for v in 1..=200 {
        upstream.emit(v);
        // Stay inside the prefetch window.
        if v % 8 == 0 {
            assert!(wait_until(1000, || downstream.value_count() >= v as usize).await);
        }
    }
    upstream.complete();

    assert!(wait_until(1000, || downstream.is_complete()).await);
    assert_eq!(downstream.values(), (1..=200).collect::<Vec<_>>());
    Ok(())
}
