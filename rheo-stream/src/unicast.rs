// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Hot unicast processor backing the window operator's inner sequences.
//!
//! Exactly one subscriber is allowed; values pushed before it arrives are
//! parked in a bounded queue and replayed once demand appears. A terminate
//! callback fires once on whichever of complete/error/cancel happens first —
//! the window operator uses it to release its shared upstream reference.

use parking_lot::Mutex;
use rheo_core::demand;
use rheo_core::executor::Task;
use rheo_core::hooks;
use rheo_core::protocol::{
    EmptySubscription, Publisher, Subscriber, Subscription, SubscriptionHandle,
};
use rheo_core::queue::ItemQueue;
use rheo_core::spsc::SpscRing;
use rheo_error::RheoError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A hot processor delivering its input to a single subscriber.
///
/// Cloning the handle shares the same underlying processor.
pub struct UnicastProcessor<T> {
    inner: Arc<UnicastInner<T>>,
}

impl<T> Clone for UnicastProcessor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> UnicastProcessor<T> {
    /// Create a processor whose internal queue holds at least `capacity`
    /// items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_terminate(capacity, None)
    }

    pub(crate) fn with_terminate(capacity: usize, on_terminate: Option<Arc<dyn Task>>) -> Self {
        Self {
            inner: Arc::new(UnicastInner {
                queue: SpscRing::new(capacity),
                on_terminate: Mutex::new(on_terminate),
                actual: Mutex::new(None),
                once: AtomicBool::new(false),
                done: AtomicBool::new(false),
                error: Mutex::new(None),
                cancelled: AtomicBool::new(false),
                wip: AtomicU64::new(0),
                requested: AtomicU64::new(0),
            }),
        }
    }

    /// Push one value into the processor.
    pub fn next(&self, value: T) {
        self.inner.next(value);
    }

    /// Terminate the processor normally.
    pub fn complete(&self) {
        self.inner.complete();
    }

    /// Terminate the processor with an error.
    pub fn error(&self, error: RheoError) {
        self.inner.error(error);
    }

    /// Whether a terminal has been recorded.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.done.load(Ordering::SeqCst)
    }
}

impl<T: Send + 'static> Publisher<T> for UnicastProcessor<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = &self.inner;
        if inner.once.swap(true, Ordering::SeqCst) {
            EmptySubscription::error(subscriber.as_ref(), RheoError::AlreadySubscribed);
            return;
        }
        *inner.actual.lock() = Some(subscriber.clone());
        subscriber.on_subscribe(SubscriptionHandle::Plain(Arc::new(UnicastSubscription {
            inner: Arc::clone(inner),
        })));
        if inner.cancelled.load(Ordering::SeqCst) {
            *inner.actual.lock() = None;
        } else {
            inner.drain();
        }
    }
}

struct UnicastInner<T> {
    queue: SpscRing<T>,
    on_terminate: Mutex<Option<Arc<dyn Task>>>,
    actual: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    once: AtomicBool,
    done: AtomicBool,
    error: Mutex<Option<RheoError>>,
    cancelled: AtomicBool,
    wip: AtomicU64,
    requested: AtomicU64,
}

impl<T: Send + 'static> UnicastInner<T> {
    fn next(&self, value: T) {
        if self.done.load(Ordering::SeqCst) || self.cancelled.load(Ordering::SeqCst) {
            hooks::next_dropped();
            return;
        }
        if self.queue.offer(value).is_err() {
            *self.error.lock() = Some(RheoError::QueueFull);
            self.done.store(true, Ordering::SeqCst);
            self.terminate_once();
            hooks::next_dropped();
        }
        self.drain();
    }

    fn complete(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.terminate_once();
        self.drain();
    }

    fn error(&self, error: RheoError) {
        if self.done.load(Ordering::SeqCst) {
            hooks::error_dropped(&error);
            return;
        }
        *self.error.lock() = Some(error);
        self.done.store(true, Ordering::SeqCst);
        self.terminate_once();
        self.drain();
    }

    /// Run the terminate callback exactly once.
    fn terminate_once(&self) {
        let callback = self.on_terminate.lock().take();
        if let Some(task) = callback {
            task.run();
        }
    }

    fn check_terminated(&self, done: bool, empty: bool, actual: &Arc<dyn Subscriber<T>>) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            self.queue.clear();
            *self.actual.lock() = None;
            return true;
        }
        if done && empty {
            *self.actual.lock() = None;
            match self.error.lock().take() {
                Some(error) => actual.on_error(error),
                None => actual.on_complete(),
            }
            return true;
        }
        false
    }

    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::SeqCst) != 0 {
            return;
        }
        let mut missed = 1u64;
        loop {
            let actual = self.actual.lock().clone();
            if let Some(actual) = actual {
                let r = self.requested.load(Ordering::SeqCst);
                let mut e = 0u64;

                while e != r {
                    let done = self.done.load(Ordering::SeqCst);
                    let item = self.queue.poll();
                    let empty = item.is_none();
                    if self.check_terminated(done, empty, &actual) {
                        return;
                    }
                    let Some(value) = item else { break };
                    actual.on_next(value);
                    e += 1;
                }

                if e == r
                    && self.check_terminated(
                        self.done.load(Ordering::SeqCst),
                        self.queue.is_empty(),
                        &actual,
                    )
                {
                    return;
                }

                if e != 0 && r != demand::UNBOUNDED {
                    demand::produced(&self.requested, e);
                }
            }

            let w = self.wip.load(Ordering::SeqCst);
            if missed == w {
                missed = self.wip.fetch_sub(missed, Ordering::SeqCst) - missed;
                if missed == 0 {
                    break;
                }
            } else {
                missed = w;
            }
        }
    }
}

struct UnicastSubscription<T> {
    inner: Arc<UnicastInner<T>>,
}

impl<T: Send + 'static> Subscription for UnicastSubscription<T> {
    fn request(&self, n: u64) {
        let inner = &self.inner;
        if demand::validate(n).is_err() {
            *inner.error.lock() = Some(RheoError::BadRequest);
            inner.done.store(true, Ordering::SeqCst);
            inner.terminate_once();
            inner.drain();
            return;
        }
        demand::get_and_add_cap(&inner.requested, n);
        inner.drain();
    }

    fn cancel(&self) {
        let inner = &self.inner;
        if inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.terminate_once();
        if inner.wip.fetch_add(1, Ordering::SeqCst) == 0 {
            inner.queue.clear();
            *inner.actual.lock() = None;
        }
    }
}
