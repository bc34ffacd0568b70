// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A hand-driven publisher recording the demand it receives.

use parking_lot::Mutex;
use rheo_core::protocol::{Publisher, Subscriber, Subscription, SubscriptionHandle};
use rheo_error::RheoError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Publisher driven manually from a test.
///
/// `subscribe` hands out a subscription that records every `request` amount
/// and whether `cancel` was called; the test then pushes signals with
/// [`emit`](Self::emit), [`error`](Self::error) and
/// [`complete`](Self::complete).
pub struct TestPublisher<T> {
    state: Arc<PublisherState<T>>,
}

struct PublisherState<T> {
    subscriber: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    requests: Mutex<Vec<u64>>,
    cancelled: AtomicBool,
}

impl<T: Send + 'static> TestPublisher<T> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(PublisherState {
                subscriber: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                cancelled: AtomicBool::new(false),
            }),
        })
    }

    /// Push one value to the current subscriber.
    pub fn emit(&self, value: T) {
        let subscriber = self.state.subscriber.lock().clone();
        if let Some(subscriber) = subscriber {
            subscriber.on_next(value);
        }
    }

    /// Fail the stream.
    pub fn error(&self, error: RheoError) {
        let subscriber = self.state.subscriber.lock().clone();
        if let Some(subscriber) = subscriber {
            subscriber.on_error(error);
        }
    }

    /// Complete the stream.
    pub fn complete(&self) {
        let subscriber = self.state.subscriber.lock().clone();
        if let Some(subscriber) = subscriber {
            subscriber.on_complete();
        }
    }

    /// Every `request` amount received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<u64> {
        self.state.requests.lock().clone()
    }

    /// Total demand received so far.
    #[must_use]
    pub fn total_requested(&self) -> u64 {
        self.state.requests.lock().iter().copied().sum()
    }

    /// Whether the subscriber cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Whether a subscriber is attached.
    #[must_use]
    pub fn has_subscriber(&self) -> bool {
        self.state.subscriber.lock().is_some()
    }
}

impl<T: Send + 'static> Publisher<T> for TestPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        *self.state.subscriber.lock() = Some(subscriber.clone());
        subscriber.on_subscribe(SubscriptionHandle::Plain(Arc::new(RecordingSubscription {
            state: Arc::clone(&self.state),
        })));
    }
}

struct RecordingSubscription<T> {
    state: Arc<PublisherState<T>>,
}

impl<T: Send + 'static> Subscription for RecordingSubscription<T> {
    fn request(&self, n: u64) {
        self.state.requests.lock().push(n);
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }
}
