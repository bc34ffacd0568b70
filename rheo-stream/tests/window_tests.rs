// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rheo_core::{Publisher, RheoError};
use rheo_stream::{from_values, PublisherExt, UnicastProcessor, Window};
use rheo_test_utils::{TestPublisher, TestSubscriber};

/// Subscribe to every emitted window with unbounded demand and return the
/// collected contents.
fn contents_of(windows: &[UnicastProcessor<i32>]) -> Vec<Vec<i32>> {
    windows
        .iter()
        .map(|window| {
            let subscriber = TestSubscriber::new(u64::MAX);
            window.subscribe(subscriber.clone());
            assert!(subscriber.is_complete() || subscriber.error().is_some());
            subscriber.values()
        })
        .collect()
}

#[test]
fn exact_windows_partition_the_sequence() {
    // [1..7] in windows of 3: [1,2,3] [4,5,6] [7]
    let outer = TestSubscriber::new(u64::MAX);
    from_values((1..=7).collect::<Vec<_>>())
        .window(3)
        .subscribe(outer.clone());

    assert!(outer.is_complete());
    let windows = outer.values();
    assert_eq!(windows.len(), 3);
    assert_eq!(
        contents_of(&windows),
        vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]
    );
}

#[test]
fn exact_windows_concatenate_back_to_the_source() {
    let outer = TestSubscriber::new(u64::MAX);
    from_values((1..=20).collect::<Vec<_>>())
        .window(6)
        .subscribe(outer.clone());

    let concatenated: Vec<i32> = contents_of(&outer.values()).into_iter().flatten().collect();
    assert_eq!(concatenated, (1..=20).collect::<Vec<_>>());
}

#[test]
fn overlapping_windows_share_values() {
    // size 3, skip 1 over [1..5]
    let outer = TestSubscriber::new(u64::MAX);
    from_values((1..=5).collect::<Vec<_>>())
        .window_with_skip(3, 1)
        .subscribe(outer.clone());

    assert!(outer.is_complete());
    assert_eq!(
        contents_of(&outer.values()),
        vec![
            vec![1, 2, 3],
            vec![2, 3, 4],
            vec![3, 4, 5],
            vec![4, 5],
            vec![5],
        ]
    );
}

#[test]
fn skip_windows_drop_the_gap() {
    // size 2, skip 3 over [1..9]: values 3, 6 and 9 fall in the gaps
    let outer = TestSubscriber::new(u64::MAX);
    from_values((1..=9).collect::<Vec<_>>())
        .window_with_skip(2, 3)
        .subscribe(outer.clone());

    assert!(outer.is_complete());
    assert_eq!(
        contents_of(&outer.values()),
        vec![vec![1, 2], vec![4, 5], vec![7, 8]]
    );
}

#[test]
fn exact_demand_translates_to_size_times_n() {
    let upstream = TestPublisher::<i32>::new();
    let outer = TestSubscriber::new(0);
    Window::exact(upstream.clone(), 3).subscribe(outer.clone());

    outer.request(2);
    assert_eq!(upstream.requests(), vec![6]);

    outer.request(1);
    assert_eq!(upstream.requests(), vec![6, 3]);
}

#[test]
fn skip_demand_accounts_for_the_gap_once_started() {
    // size 2, skip 5: first request n=2 -> 2*2 + 3*1 = 7; afterwards 5*n.
    let upstream = TestPublisher::<i32>::new();
    let outer = TestSubscriber::new(0);
    Window::with_skip(upstream.clone(), 2, 5).subscribe(outer.clone());

    outer.request(2);
    assert_eq!(upstream.requests(), vec![7]);

    outer.request(1);
    assert_eq!(upstream.requests(), vec![7, 5]);
}

#[test]
fn overlap_demand_opens_one_window_per_skip() {
    // size 4, skip 2: first request n=3 -> 4 + 2*2 = 8; afterwards 2*n.
    let upstream = TestPublisher::<i32>::new();
    let outer = TestSubscriber::new(0);
    Window::with_skip(upstream.clone(), 4, 2).subscribe(outer.clone());

    outer.request(3);
    assert_eq!(upstream.requests(), vec![8]);

    outer.request(2);
    assert_eq!(upstream.requests(), vec![8, 4]);
}

#[test]
fn upstream_stays_alive_while_a_window_is_open() {
    // Arrange - one window of 2 is open when the outer subscriber cancels
    let upstream = TestPublisher::<i32>::new();
    let outer = TestSubscriber::new(u64::MAX);
    Window::exact(upstream.clone(), 2).subscribe(outer.clone());

    upstream.emit(1);
    outer.cancel();

    // The open window still holds an upstream reference.
    assert!(!upstream.is_cancelled());

    // Act - the window fills and completes, releasing the last reference
    upstream.emit(2);
    assert!(upstream.is_cancelled());

    // The emitted window delivered its values regardless of the cancel.
    let windows = outer.values();
    assert_eq!(contents_of(&windows), vec![vec![1, 2]]);
}

#[test]
fn upstream_is_cancelled_once_no_window_is_open() {
    let upstream = TestPublisher::<i32>::new();
    let outer = TestSubscriber::new(u64::MAX);
    Window::exact(upstream.clone(), 2).subscribe(outer.clone());

    // A full window has completed; only the outer reference remains.
    upstream.emit(1);
    upstream.emit(2);
    assert!(!upstream.is_cancelled());

    outer.cancel();
    assert!(upstream.is_cancelled());
}

#[test]
fn error_terminates_open_windows_and_the_outer_stream() {
    let upstream = TestPublisher::<i32>::new();
    let outer = TestSubscriber::new(u64::MAX);
    Window::exact(upstream.clone(), 3).subscribe(outer.clone());

    upstream.emit(1);
    upstream.error(RheoError::failed("x"));

    assert_eq!(outer.error().map(|e| e.to_string()), Some("x".into()));

    let windows = outer.values();
    assert_eq!(windows.len(), 1);
    let inner = TestSubscriber::new(u64::MAX);
    windows[0].subscribe(inner.clone());
    assert_eq!(inner.values(), vec![1]);
    assert_eq!(inner.error().map(|e| e.to_string()), Some("x".into()));
}

#[test]
fn overlap_error_reaches_every_open_window() {
    let upstream = TestPublisher::<i32>::new();
    let outer = TestSubscriber::new(u64::MAX);
    Window::with_skip(upstream.clone(), 3, 1).subscribe(outer.clone());

    upstream.emit(1);
    upstream.emit(2);
    upstream.error(RheoError::failed("x"));

    assert_eq!(outer.error().map(|e| e.to_string()), Some("x".into()));
    let windows = outer.values();
    assert_eq!(windows.len(), 2);
    for (i, window) in windows.iter().enumerate() {
        let inner = TestSubscriber::new(u64::MAX);
        window.subscribe(inner.clone());
        assert_eq!(inner.values(), ((i as i32 + 1)..=2).collect::<Vec<_>>());
        assert!(inner.error().is_some());
    }
}

#[test]
fn zero_request_is_rejected_on_the_outer_stream() {
    let upstream = TestPublisher::<i32>::new();
    let outer = TestSubscriber::new(0);
    Window::exact(upstream.clone(), 2).subscribe(outer.clone());

    outer.request(0);
    assert!(matches!(outer.error(), Some(RheoError::BadRequest)));
}

#[test]
fn a_window_allows_exactly_one_subscriber() {
    let outer = TestSubscriber::new(u64::MAX);
    from_values(vec![1, 2]).window(2).subscribe(outer.clone());

    let windows = outer.values();
    let first = TestSubscriber::new(u64::MAX);
    windows[0].subscribe(first.clone());
    assert_eq!(first.values(), vec![1, 2]);

    let second = TestSubscriber::new(u64::MAX);
    windows[0].subscribe(second.clone());
    assert!(matches!(second.error(), Some(RheoError::AlreadySubscribed)));
}
