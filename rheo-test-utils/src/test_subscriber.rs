// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Signal-recording subscribers with demand control.

use parking_lot::Mutex;
use rheo_core::fusion::FusionMode;
use rheo_core::protocol::{ConditionalSubscriber, Subscriber, SubscriptionHandle};
use rheo_error::{Result, RheoError};
use std::sync::Arc;

/// One recorded downstream signal.
#[derive(Debug, Clone)]
pub enum Signal<T> {
    Next(T),
    Pollable,
    Error(RheoError),
    Complete,
}

/// A subscriber that records every signal it receives.
///
/// `initial_request` is issued as soon as the subscription arrives; further
/// demand is issued with [`request`](Self::request). Construct with
/// [`fused`](Self::fused) to negotiate a fusion mode during `on_subscribe`.
pub struct TestSubscriber<T> {
    initial_request: u64,
    fusion_request: Option<FusionMode>,
    signals: Mutex<Vec<Signal<T>>>,
    subscription: Mutex<Option<SubscriptionHandle<T>>>,
    negotiated: Mutex<Option<FusionMode>>,
}

impl<T: Send + 'static> TestSubscriber<T> {
    /// Recorder that requests `initial_request` on subscription (0 to defer
    /// all demand).
    #[must_use]
    pub fn new(initial_request: u64) -> Arc<Self> {
        Arc::new(Self {
            initial_request,
            fusion_request: None,
            signals: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            negotiated: Mutex::new(None),
        })
    }

    /// Recorder that additionally negotiates `mode` fusion on subscription.
    #[must_use]
    pub fn fused(initial_request: u64, mode: FusionMode) -> Arc<Self> {
        Arc::new(Self {
            initial_request,
            fusion_request: Some(mode),
            signals: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            negotiated: Mutex::new(None),
        })
    }

    /// All signals recorded so far.
    #[must_use]
    pub fn signals(&self) -> Vec<Signal<T>>
    where
        T: Clone,
    {
        self.signals.lock().clone()
    }

    /// The recorded values, in order.
    #[must_use]
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.signals
            .lock()
            .iter()
            .filter_map(|s| match s {
                Signal::Next(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of values received.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.signals
            .lock()
            .iter()
            .filter(|s| matches!(s, Signal::Next(_)))
            .count()
    }

    /// Number of fused availability signals received.
    #[must_use]
    pub fn pollable_count(&self) -> usize {
        self.signals
            .lock()
            .iter()
            .filter(|s| matches!(s, Signal::Pollable))
            .count()
    }

    /// The recorded error, if the stream failed.
    #[must_use]
    pub fn error(&self) -> Option<RheoError> {
        self.signals.lock().iter().find_map(|s| match s {
            Signal::Error(e) => Some(e.clone()),
            _ => None,
        })
    }

    /// Whether `on_complete` was received.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.signals
            .lock()
            .iter()
            .any(|s| matches!(s, Signal::Complete))
    }

    /// Whether any terminal was received.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.signals
            .lock()
            .iter()
            .any(|s| matches!(s, Signal::Complete | Signal::Error(_)))
    }

    /// The fusion mode granted during subscription, if any was requested.
    #[must_use]
    pub fn negotiated_mode(&self) -> Option<FusionMode> {
        *self.negotiated.lock()
    }

    /// Issue more demand through the stored subscription.
    pub fn request(&self, n: u64) {
        let subscription = self.subscription.lock().clone();
        if let Some(subscription) = subscription {
            subscription.request(n);
        }
    }

    /// Cancel the stored subscription.
    pub fn cancel(&self) {
        let subscription = self.subscription.lock().clone();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// Pull one value through the fused queue face.
    ///
    /// # Panics
    ///
    /// Panics if the producer did not hand out a fused subscription.
    pub fn fused_poll(&self) -> Result<Option<T>> {
        let subscription = self.subscription.lock().clone();
        let handle = subscription.expect("no subscription stored");
        let fused = handle.fused().expect("subscription is not fused").clone();
        fused.poll()
    }

    /// Probe emptiness through the fused queue face.
    ///
    /// # Panics
    ///
    /// Panics if the producer did not hand out a fused subscription.
    #[must_use]
    pub fn fused_is_empty(&self) -> bool {
        let subscription = self.subscription.lock().clone();
        let handle = subscription.expect("no subscription stored");
        let fused = handle.fused().expect("subscription is not fused").clone();
        fused.is_empty()
    }
}

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        if let (Some(mode), Some(fused)) = (self.fusion_request, subscription.fused()) {
            *self.negotiated.lock() = Some(fused.request_fusion(mode));
        }
        *self.subscription.lock() = Some(subscription.clone());
        if self.initial_request > 0 {
            subscription.request(self.initial_request);
        }
    }

    fn on_next(&self, value: T) {
        self.signals.lock().push(Signal::Next(value));
    }

    fn on_pollable(&self) {
        self.signals.lock().push(Signal::Pollable);
    }

    fn on_error(&self, error: RheoError) {
        self.signals.lock().push(Signal::Error(error));
    }

    fn on_complete(&self) {
        self.signals.lock().push(Signal::Complete);
    }
}

/// A conditional subscriber accepting only values matching a predicate.
///
/// Rejected values are recorded separately and do not count against demand.
pub struct ConditionalTestSubscriber<T> {
    inner: Arc<TestSubscriber<T>>,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
    rejected: Mutex<Vec<T>>,
}

impl<T: Send + 'static> ConditionalTestSubscriber<T> {
    #[must_use]
    pub fn new(
        initial_request: u64,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: TestSubscriber::new(initial_request),
            predicate: Box::new(predicate),
            rejected: Mutex::new(Vec::new()),
        })
    }

    /// The accepted values, in order.
    #[must_use]
    pub fn accepted(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.values()
    }

    /// The rejected values, in order.
    #[must_use]
    pub fn rejected(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.rejected.lock().clone()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }

    #[must_use]
    pub fn error(&self) -> Option<RheoError> {
        self.inner.error()
    }

    pub fn request(&self, n: u64) {
        self.inner.request(n);
    }
}

impl<T: Send + 'static> Subscriber<T> for ConditionalTestSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        self.inner.on_subscribe(subscription);
    }

    fn on_next(&self, value: T) {
        self.inner.on_next(value);
    }

    fn on_error(&self, error: RheoError) {
        self.inner.on_error(error);
    }

    fn on_complete(&self) {
        self.inner.on_complete();
    }
}

impl<T: Send + 'static> ConditionalSubscriber<T> for ConditionalTestSubscriber<T> {
    fn try_on_next(&self, value: T) -> bool {
        if (self.predicate)(&value) {
            self.inner.on_next(value);
            true
        } else {
            self.rejected.lock().push(value);
            false
        }
    }
}
