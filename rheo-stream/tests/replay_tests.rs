// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rheo_core::{FusionMode, Publisher, RheoError};
use rheo_stream::{from_values, ReplayProcessor};
use rheo_test_utils::TestSubscriber;
use std::sync::Arc;

#[test]
fn unbounded_replays_to_early_and_late_subscribers() {
    // Arrange - A subscribes before any value, B after the terminal
    let replay = ReplayProcessor::unbounded();
    let early = TestSubscriber::new(u64::MAX);
    replay.subscribe(early.clone());

    // Act
    replay.next(1);
    replay.next(2);
    replay.next(3);
    replay.complete();

    let late = TestSubscriber::new(u64::MAX);
    replay.subscribe(late.clone());

    // Assert - both observe the exact same sequence
    assert_eq!(early.values(), vec![1, 2, 3]);
    assert!(early.is_complete());
    assert_eq!(late.values(), vec![1, 2, 3]);
    assert!(late.is_complete());
}

#[test]
fn unbounded_links_across_array_nodes() {
    // A batch size of 2 forces several linked array nodes.
    let replay = ReplayProcessor::unbounded_with_batch(2);
    for v in 1..=7 {
        replay.next(v);
    }
    replay.complete();

    let subscriber = TestSubscriber::new(u64::MAX);
    replay.subscribe(subscriber.clone());
    assert_eq!(subscriber.values(), (1..=7).collect::<Vec<_>>());
    assert!(subscriber.is_complete());
}

#[test]
fn bounded_replays_the_last_n_values() {
    // Arrange
    let replay = ReplayProcessor::bounded(2);
    replay.next(1);
    replay.next(2);
    replay.next(3);

    // Act - the subscriber joins mid-stream
    let subscriber = TestSubscriber::new(u64::MAX);
    replay.subscribe(subscriber.clone());
    assert_eq!(subscriber.values(), vec![2, 3]);

    replay.next(4);
    replay.complete();

    // Assert - suffix at subscription time plus everything after
    assert_eq!(subscriber.values(), vec![2, 3, 4]);
    assert!(subscriber.is_complete());
}

#[test]
fn replay_honours_demand() {
    let replay = ReplayProcessor::unbounded();
    for v in 1..=5 {
        replay.next(v);
    }
    replay.complete();

    let subscriber = TestSubscriber::new(2);
    replay.subscribe(subscriber.clone());
    assert_eq!(subscriber.values(), vec![1, 2]);
    assert!(!subscriber.is_terminated());

    subscriber.request(2);
    assert_eq!(subscriber.values(), vec![1, 2, 3, 4]);
    assert!(!subscriber.is_terminated());

    subscriber.request(1);
    assert_eq!(subscriber.values(), vec![1, 2, 3, 4, 5]);
    assert!(subscriber.is_complete());
}

#[test]
fn error_reaches_every_subscriber_after_their_replay() {
    let replay = ReplayProcessor::unbounded();
    let first = TestSubscriber::new(u64::MAX);
    replay.subscribe(first.clone());

    replay.next(1);
    replay.error(RheoError::failed("x"));

    let second = TestSubscriber::new(u64::MAX);
    replay.subscribe(second.clone());

    for subscriber in [&first, &second] {
        assert_eq!(subscriber.values(), vec![1]);
        assert_eq!(
            subscriber.error().map(|e| e.to_string()),
            Some("x".into())
        );
    }
}

#[test]
fn late_signals_after_terminal_are_dropped() {
    let replay = ReplayProcessor::unbounded();
    let subscriber = TestSubscriber::new(u64::MAX);
    replay.subscribe(subscriber.clone());

    replay.complete();
    replay.next(99);
    replay.error(RheoError::failed("late"));

    assert!(subscriber.values().is_empty());
    assert!(subscriber.is_complete());
    assert!(subscriber.error().is_none());
}

#[test]
fn zero_request_after_terminal_is_dropped() {
    let replay = ReplayProcessor::unbounded();
    let subscriber = TestSubscriber::new(u64::MAX);
    replay.subscribe(subscriber.clone());

    replay.next(1);
    replay.complete();
    assert!(subscriber.is_complete());

    // A violation after the terminal may not produce a second one.
    subscriber.request(0);

    assert!(subscriber.error().is_none());
    assert_eq!(subscriber.value_count(), 1);
}

#[test]
fn cancellation_detaches_the_subscriber() {
    let replay = ReplayProcessor::unbounded();
    let subscriber = TestSubscriber::new(1);
    replay.subscribe(subscriber.clone());
    assert_eq!(replay.subscriber_count(), 1);

    subscriber.cancel();
    assert_eq!(replay.subscriber_count(), 0);

    replay.next(1);
    assert!(subscriber.values().is_empty());
}

#[test]
fn async_fusion_signals_availability_and_is_polled() {
    // Arrange - the subscriber negotiates async fusion up front
    let replay = ReplayProcessor::unbounded();
    let subscriber = TestSubscriber::fused(0, FusionMode::Any);
    replay.subscribe(subscriber.clone());
    assert_eq!(subscriber.negotiated_mode(), Some(FusionMode::Async));

    // Act - each value announces itself instead of being pushed
    replay.next(10);
    replay.next(20);
    assert!(subscriber.pollable_count() >= 1);
    assert!(subscriber.values().is_empty());

    // Assert - values are pulled through the queue face
    assert_eq!(subscriber.fused_poll().unwrap(), Some(10));
    assert_eq!(subscriber.fused_poll().unwrap(), Some(20));
    assert_eq!(subscriber.fused_poll().unwrap(), None);

    replay.complete();
    assert!(subscriber.is_complete());
}

#[test]
fn sync_fusion_is_refused() {
    let replay = ReplayProcessor::<i32>::unbounded();
    let subscriber = TestSubscriber::fused(0, FusionMode::Sync);
    replay.subscribe(subscriber.clone());
    assert_eq!(subscriber.negotiated_mode(), Some(FusionMode::None));
}

#[test]
fn feeds_from_an_upstream_publisher() {
    // The processor is itself a subscriber with unbounded demand.
    let replay = ReplayProcessor::unbounded();
    from_values(vec![1, 2, 3]).subscribe(Arc::new(replay.clone()));

    assert!(replay.is_terminated());

    let subscriber = TestSubscriber::new(u64::MAX);
    replay.subscribe(subscriber.clone());
    assert_eq!(subscriber.values(), vec![1, 2, 3]);
    assert!(subscriber.is_complete());
}

#[test]
fn bounded_capacity_is_reported() {
    assert_eq!(ReplayProcessor::<i32>::bounded(7).capacity(), 7);
    assert_eq!(ReplayProcessor::<i32>::unbounded_with_batch(4).capacity(), 4);
}

#[test]
fn multicast_delivers_the_same_prefix_to_all() {
    let replay = ReplayProcessor::unbounded();
    let fast = TestSubscriber::new(u64::MAX);
    let slow = TestSubscriber::new(1);
    replay.subscribe(fast.clone());
    replay.subscribe(slow.clone());

    replay.next("a");
    replay.next("b");

    assert_eq!(fast.values(), vec!["a", "b"]);
    // The slow subscriber sees a prefix, never a reordering.
    assert_eq!(slow.values(), vec!["a"]);

    slow.request(5);
    assert_eq!(slow.values(), vec!["a", "b"]);
}
