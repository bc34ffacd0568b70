// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rheo_core::Publisher;
use rheo_stream::Never;
use rheo_test_utils::TestSubscriber;

#[test]
fn only_ever_delivers_the_subscription() {
    let subscriber = TestSubscriber::<i32>::new(u64::MAX);
    Never.subscribe(subscriber.clone());

    subscriber.request(10);
    subscriber.cancel();

    assert!(subscriber.values().is_empty());
    assert!(!subscriber.is_terminated());
}
