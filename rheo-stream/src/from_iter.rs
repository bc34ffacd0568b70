// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Synchronous source emitting the elements of an iterator under
//! backpressure.
//!
//! The source owns a pull iterator and emits on the caller's stack, one
//! batch per `request`. It also exposes the sync-fused queue face, which
//! lets a downstream operator drive the iterator through `poll`/`is_empty`
//! without ever scheduling a request.
//!
//! Elements are `Result`s: an `Err` element is a failing source value and
//! terminates the stream with that error in place of the value.

use crate::outlet::{ConditionalOutlet, Outlet, PlainOutlet};
use parking_lot::Mutex;
use rheo_core::fusion::{FusionMode, QueueSubscription};
use rheo_core::protocol::{
    ConditionalSubscriber, EmptySubscription, Publisher, Subscriber, Subscription,
    SubscriptionHandle,
};
use rheo_core::demand;
use rheo_error::{Result, RheoError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Publisher that emits the elements yielded by a fresh iterator per
/// subscriber.
///
/// The wrapped factory is invoked once per `subscribe`; an empty iterator
/// completes the subscriber immediately, without a usable subscription.
///
/// # Examples
///
/// ```
/// use rheo_stream::from_values;
/// use rheo_core::Publisher;
/// use rheo_test_utils::TestSubscriber;
///
/// let source = from_values(vec![1, 2, 3]);
/// let subscriber = TestSubscriber::new(u64::MAX);
/// source.subscribe(subscriber.clone());
///
/// assert_eq!(subscriber.values(), vec![1, 2, 3]);
/// assert!(subscriber.is_complete());
/// ```
pub struct FromIter<F> {
    iterable: F,
}

impl<F> FromIter<F> {
    /// Wrap an iterator factory. See [`from_iter()`].
    pub const fn new(iterable: F) -> Self {
        Self { iterable }
    }
}

/// Create a source from a factory of fallible iterators.
pub const fn from_iter<F, I, T>(iterable: F) -> FromIter<F>
where
    F: Fn() -> I + Send + Sync,
    I: IntoIterator<Item = Result<T>>,
{
    FromIter::new(iterable)
}

/// Create a source from a cloneable collection of plain values.
pub fn from_values<C, T>(
    values: C,
) -> FromIter<impl Fn() -> std::iter::Map<C::IntoIter, fn(T) -> Result<T>> + Send + Sync>
where
    C: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    FromIter::new(move || values.clone().into_iter().map(Ok as fn(T) -> Result<T>))
}

impl<F, I, T> FromIter<F>
where
    F: Fn() -> I + Send + Sync,
    I: IntoIterator<Item = Result<T>>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
{
    fn subscribe_outlet<D: Outlet<T>>(&self, outlet: D) {
        let mut iter = (self.iterable)().into_iter();
        // Probe for the first element: an empty source completes without
        // handing out a subscription.
        match iter.next() {
            None => {
                outlet.on_subscribe(EmptySubscription::handle());
                outlet.on_complete();
            }
            Some(first) => {
                let subscription = Arc::new(IterSubscription {
                    outlet,
                    state: Mutex::new(IterState {
                        iter,
                        lookahead: Some(first),
                        done: false,
                    }),
                    requested: AtomicU64::new(0),
                    cancelled: AtomicBool::new(false),
                    finished: AtomicBool::new(false),
                });
                subscription
                    .outlet
                    .on_subscribe(SubscriptionHandle::Fused(subscription.clone()));
            }
        }
    }

    /// Subscribe a conditional downstream; values refused by `try_on_next`
    /// do not count against demand.
    pub fn subscribe_conditional(&self, subscriber: Arc<dyn ConditionalSubscriber<T>>) {
        self.subscribe_outlet(ConditionalOutlet(subscriber));
    }
}

impl<F, I, T> Publisher<T> for FromIter<F>
where
    F: Fn() -> I + Send + Sync,
    I: IntoIterator<Item = Result<T>>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.subscribe_outlet(PlainOutlet(subscriber));
    }
}

/// Iterator position shared between the emission paths and the fused queue
/// face.
///
/// Rust iterators fuse the has-next probe with element retrieval, so the
/// position is a single lookahead slot: empty means "probe before
/// answering", full means "element retrieved but not yet consumed", and
/// `done` is the terminal state after the iterator returned `None` or an
/// element failed. `is_empty` advances by at most one probe, `poll` by at
/// most one retrieval.
struct IterState<T, I> {
    iter: I,
    lookahead: Option<Result<T>>,
    done: bool,
}

struct IterSubscription<T, I, D> {
    outlet: D,
    state: Mutex<IterState<T, I>>,
    requested: AtomicU64,
    cancelled: AtomicBool,
    /// Latched when a terminal has been delivered; nothing may follow.
    finished: AtomicBool,
}

impl<T, I, D> IterSubscription<T, I, D>
where
    T: Send + 'static,
    I: Iterator<Item = Result<T>> + Send + 'static,
    D: Outlet<T>,
{
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Claim the right to deliver the terminal; `false` if already done.
    fn finish(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }

    /// Emission loop for bounded demand. Emits up to `n` consumed values,
    /// then re-reads demand and deducts what was delivered; a zero result
    /// releases drain ownership.
    fn slow_path(&self, mut n: u64) {
        let mut state = self.state.lock();
        let mut e = 0u64;
        loop {
            while e != n {
                if self.is_cancelled() {
                    return;
                }

                let item = match state.lookahead.take() {
                    Some(item) => Some(item),
                    None => state.iter.next(),
                };
                let value = match item {
                    None => {
                        state.done = true;
                        if self.finish() {
                            self.outlet.on_complete();
                        }
                        return;
                    }
                    Some(Ok(value)) => value,
                    Some(Err(error)) => {
                        state.done = true;
                        if self.finish() {
                            self.outlet.on_error(error);
                        }
                        return;
                    }
                };

                if self.is_cancelled() {
                    return;
                }

                let consumed = self.outlet.accept(value);

                if self.is_cancelled() {
                    return;
                }

                // Probe the next element so completion lands right after the
                // last value instead of waiting for another request.
                match state.iter.next() {
                    Some(item) => state.lookahead = Some(item),
                    None => {
                        state.done = true;
                        if self.finish() {
                            self.outlet.on_complete();
                        }
                        return;
                    }
                }

                if self.is_cancelled() {
                    return;
                }

                if consumed {
                    e += 1;
                }
            }

            n = self.requested.load(Ordering::SeqCst);
            if n == e {
                n = demand::produced(&self.requested, e);
                if n == 0 {
                    return;
                }
                e = 0;
            }
        }
    }

    /// Emission loop for unbounded demand: no per-item accounting.
    fn fast_path(&self) {
        let mut state = self.state.lock();
        loop {
            if self.is_cancelled() {
                return;
            }

            let item = match state.lookahead.take() {
                Some(item) => Some(item),
                None => state.iter.next(),
            };
            let value = match item {
                None => {
                    state.done = true;
                    if self.finish() {
                        self.outlet.on_complete();
                    }
                    return;
                }
                Some(Ok(value)) => value,
                Some(Err(error)) => {
                    state.done = true;
                    if self.finish() {
                        self.outlet.on_error(error);
                    }
                    return;
                }
            };

            if self.is_cancelled() {
                return;
            }

            self.outlet.accept(value);

            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl<T, I, D> Subscription for IterSubscription<T, I, D>
where
    T: Send + 'static,
    I: Iterator<Item = Result<T>> + Send + 'static,
    D: Outlet<T>,
{
    fn request(&self, n: u64) {
        if demand::validate(n).is_err() {
            // Protocol violation: terminal unless one already fired.
            if !self.cancelled.swap(true, Ordering::SeqCst) && self.finish() {
                self.outlet.on_error(RheoError::BadRequest);
            }
            return;
        }
        if demand::get_and_add_cap(&self.requested, n) == 0 {
            if n == demand::UNBOUNDED {
                self.fast_path();
            } else {
                self.slow_path(n);
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl<T, I, D> QueueSubscription<T> for IterSubscription<T, I, D>
where
    T: Send + 'static,
    I: Iterator<Item = Result<T>> + Send + 'static,
    D: Outlet<T>,
{
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        if requested.accepts(FusionMode::Sync) {
            FusionMode::Sync
        } else {
            FusionMode::None
        }
    }

    fn poll(&self) -> Result<Option<T>> {
        let mut state = self.state.lock();
        if state.done {
            return Ok(None);
        }
        let item = match state.lookahead.take() {
            Some(item) => Some(item),
            None => state.iter.next(),
        };
        match item {
            None => {
                state.done = true;
                Ok(None)
            }
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(error)) => {
                state.done = true;
                Err(error)
            }
        }
    }

    fn is_empty(&self) -> bool {
        let mut state = self.state.lock();
        if state.done {
            return true;
        }
        if state.lookahead.is_some() {
            return false;
        }
        match state.iter.next() {
            Some(item) => {
                state.lookahead = Some(item);
                false
            }
            None => {
                state.done = true;
                true
            }
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.lookahead = None;
        state.done = true;
    }
}
