// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Splits one sequence into a sequence of bounded sub-sequences.
//!
//! Each emitted window is a [`UnicastProcessor`] receiving `size` values.
//! Three regimes, chosen by comparing `skip` to `size`:
//!
//! - *Exact* (`skip == size`): back-to-back windows, every value lands in
//!   exactly one.
//! - *Skip* (`skip > size`): values between `size` and `skip` are dropped,
//!   yielding sparse windows.
//! - *Overlap* (`skip < size`): a new window opens every `skip` values, so
//!   values land in several windows; each value is cloned into every open
//!   window.
//!
//! Downstream demand for `n` windows is translated into upstream demand
//! with saturating arithmetic so every completed window can be filled
//! without starvation. The upstream subscription is reference-counted: the
//! outer subscriber and every live window hold one reference, and upstream
//! is cancelled only when the last reference is released.

use parking_lot::Mutex;
use rheo_core::demand;
use rheo_core::executor::Task;
use rheo_core::hooks;
use rheo_core::protocol::{self, Publisher, Subscriber, Subscription, SubscriptionHandle};
use rheo_error::RheoError;
use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::unicast::UnicastProcessor;

/// Publisher splitting its source into windows of `size` values, opening a
/// new window every `skip` values.
pub struct Window<S> {
    source: S,
    size: usize,
    skip: usize,
}

impl<S> Window<S> {
    /// Back-to-back windows of exactly `size` values (the last may be
    /// shorter).
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn exact(source: S, size: usize) -> Self {
        Self::with_skip(source, size, size)
    }

    /// Windows of `size` values, a new one opening every `skip` values.
    ///
    /// # Panics
    ///
    /// Panics if `size` or `skip` is 0.
    pub fn with_skip(source: S, size: usize, skip: usize) -> Self {
        assert!(size > 0, "window size must be positive");
        assert!(skip > 0, "window skip must be positive");
        Self { source, size, skip }
    }
}

impl<S, T> Publisher<UnicastProcessor<T>> for Window<S>
where
    S: Publisher<T>,
    T: Clone + Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<UnicastProcessor<T>>>) {
        match self.skip.cmp(&self.size) {
            CmpOrdering::Equal => self.source.subscribe(Arc::new(ExactAgent {
                state: Arc::new(ExactState::new(subscriber, self.size)),
            })),
            CmpOrdering::Greater => self.source.subscribe(Arc::new(SkipAgent {
                state: Arc::new(SkipState::new(subscriber, self.size, self.skip)),
            })),
            CmpOrdering::Less => self.source.subscribe(Arc::new(OverlapAgent {
                state: Arc::new(OverlapState::new(subscriber, self.size, self.skip)),
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Exact regime: skip == size.
// ---------------------------------------------------------------------------

struct ExactState<T> {
    actual: Arc<dyn Subscriber<UnicastProcessor<T>>>,
    size: usize,
    /// Shared upstream reference count: 1 for the outer subscriber plus one
    /// per live window.
    refs: AtomicU64,
    once: AtomicBool,
    index: AtomicUsize,
    upstream: Mutex<Option<SubscriptionHandle<T>>>,
    window: Mutex<Option<UnicastProcessor<T>>>,
    done: AtomicBool,
}

impl<T: Send + 'static> ExactState<T> {
    fn new(actual: Arc<dyn Subscriber<UnicastProcessor<T>>>, size: usize) -> Self {
        Self {
            actual,
            size,
            refs: AtomicU64::new(1),
            once: AtomicBool::new(false),
            index: AtomicUsize::new(0),
            upstream: Mutex::new(None),
            window: Mutex::new(None),
            done: AtomicBool::new(false),
        }
    }
}

impl<T: Send + 'static> Subscription for ExactState<T> {
    fn request(&self, n: u64) {
        if demand::validate(n).is_err() {
            if !self.done.swap(true, Ordering::SeqCst) {
                self.actual.on_error(RheoError::BadRequest);
            }
            return;
        }
        protocol::request_upstream(&self.upstream, demand::multiply_cap(self.size as u64, n));
    }

    fn cancel(&self) {
        if !self.once.swap(true, Ordering::SeqCst) {
            self.run();
        }
    }
}

impl<T: Send + 'static> Task for ExactState<T> {
    /// Release one upstream reference; the last one cancels upstream.
    fn run(&self) {
        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            protocol::cancel_upstream(&self.upstream);
        }
    }
}

struct ExactAgent<T> {
    state: Arc<ExactState<T>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> for ExactAgent<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        let st = &self.state;
        if protocol::store_upstream(&st.upstream, subscription) {
            st.actual
                .on_subscribe(SubscriptionHandle::Plain(
                    Arc::clone(&self.state) as Arc<dyn Subscription>
                ));
        }
    }

    fn on_next(&self, value: T) {
        let st = &self.state;
        if st.done.load(Ordering::SeqCst) {
            hooks::next_dropped();
            return;
        }

        let mut i = st.index.load(Ordering::Relaxed);
        let window = if i == 0 {
            st.refs.fetch_add(1, Ordering::SeqCst);
            let window = UnicastProcessor::with_terminate(
                st.size,
                Some(Arc::clone(&self.state) as Arc<dyn Task>),
            );
            *st.window.lock() = Some(window.clone());
            st.actual.on_next(window.clone());
            window
        } else {
            match st.window.lock().clone() {
                Some(window) => window,
                None => return,
            }
        };

        i += 1;
        window.next(value);

        if i == st.size {
            st.index.store(0, Ordering::Relaxed);
            *st.window.lock() = None;
            window.complete();
        } else {
            st.index.store(i, Ordering::Relaxed);
        }
    }

    fn on_error(&self, error: RheoError) {
        let st = &self.state;
        if st.done.swap(true, Ordering::SeqCst) {
            hooks::error_dropped(&error);
            return;
        }
        if let Some(window) = st.window.lock().take() {
            window.error(error.clone());
        }
        st.actual.on_error(error);
    }

    fn on_complete(&self) {
        let st = &self.state;
        if st.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(window) = st.window.lock().take() {
            window.complete();
        }
        st.actual.on_complete();
    }
}

// ---------------------------------------------------------------------------
// Skip regime: skip > size. Values between size and skip are dropped.
// ---------------------------------------------------------------------------

struct SkipState<T> {
    actual: Arc<dyn Subscriber<UnicastProcessor<T>>>,
    size: usize,
    skip: usize,
    refs: AtomicU64,
    once: AtomicBool,
    first_request: AtomicBool,
    index: AtomicUsize,
    upstream: Mutex<Option<SubscriptionHandle<T>>>,
    window: Mutex<Option<UnicastProcessor<T>>>,
    done: AtomicBool,
}

impl<T: Send + 'static> SkipState<T> {
    fn new(actual: Arc<dyn Subscriber<UnicastProcessor<T>>>, size: usize, skip: usize) -> Self {
        Self {
            actual,
            size,
            skip,
            refs: AtomicU64::new(1),
            once: AtomicBool::new(false),
            first_request: AtomicBool::new(false),
            index: AtomicUsize::new(0),
            upstream: Mutex::new(None),
            window: Mutex::new(None),
            done: AtomicBool::new(false),
        }
    }
}

impl<T: Send + 'static> Subscription for SkipState<T> {
    fn request(&self, n: u64) {
        if demand::validate(n).is_err() {
            if !self.done.swap(true, Ordering::SeqCst) {
                self.actual.on_error(RheoError::BadRequest);
            }
            return;
        }
        let size = self.size as u64;
        let skip = self.skip as u64;
        let upstream_demand = if self
            .first_request
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // The first window needs `size` values; each further window is
            // preceded by a gap of `skip - size` dropped values.
            demand::add_cap(
                demand::multiply_cap(size, n),
                demand::multiply_cap(skip - size, n - 1),
            )
        } else {
            demand::multiply_cap(skip, n)
        };
        protocol::request_upstream(&self.upstream, upstream_demand);
    }

    fn cancel(&self) {
        if !self.once.swap(true, Ordering::SeqCst) {
            self.run();
        }
    }
}

impl<T: Send + 'static> Task for SkipState<T> {
    fn run(&self) {
        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            protocol::cancel_upstream(&self.upstream);
        }
    }
}

struct SkipAgent<T> {
    state: Arc<SkipState<T>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> for SkipAgent<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        let st = &self.state;
        if protocol::store_upstream(&st.upstream, subscription) {
            st.actual
                .on_subscribe(SubscriptionHandle::Plain(
                    Arc::clone(&self.state) as Arc<dyn Subscription>
                ));
        }
    }

    fn on_next(&self, value: T) {
        let st = &self.state;
        if st.done.load(Ordering::SeqCst) {
            hooks::next_dropped();
            return;
        }

        let mut i = st.index.load(Ordering::Relaxed);
        let mut window = st.window.lock().clone();

        if i == 0 {
            st.refs.fetch_add(1, Ordering::SeqCst);
            let fresh = UnicastProcessor::with_terminate(
                st.size,
                Some(Arc::clone(&self.state) as Arc<dyn Task>),
            );
            *st.window.lock() = Some(fresh.clone());
            window = Some(fresh.clone());
            st.actual.on_next(fresh);
        }

        i += 1;

        if let Some(window) = &window {
            window.next(value);
        }
        // In the gap between size and skip there is no open window and the
        // value falls on the floor: sparse windowing.

        if i == st.size {
            *st.window.lock() = None;
            if let Some(window) = window {
                window.complete();
            }
        }

        st.index
            .store(if i == st.skip { 0 } else { i }, Ordering::Relaxed);
    }

    fn on_error(&self, error: RheoError) {
        let st = &self.state;
        if st.done.swap(true, Ordering::SeqCst) {
            hooks::error_dropped(&error);
            return;
        }
        if let Some(window) = st.window.lock().take() {
            window.error(error.clone());
        }
        st.actual.on_error(error);
    }

    fn on_complete(&self) {
        let st = &self.state;
        if st.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(window) = st.window.lock().take() {
            window.complete();
        }
        st.actual.on_complete();
    }
}

// ---------------------------------------------------------------------------
// Overlap regime: skip < size. Values land in several windows; freshly
// opened windows wait in an emission queue drained under downstream demand.
// ---------------------------------------------------------------------------

struct OverlapState<T> {
    actual: Arc<dyn Subscriber<UnicastProcessor<T>>>,
    size: usize,
    skip: usize,
    /// Windows opened but not yet handed downstream.
    emit_queue: Mutex<VecDeque<UnicastProcessor<T>>>,
    /// Windows currently receiving values, oldest first.
    windows: Mutex<VecDeque<UnicastProcessor<T>>>,
    refs: AtomicU64,
    once: AtomicBool,
    first_request: AtomicBool,
    requested: AtomicU64,
    /// Work-in-progress counter of the downstream emission loop.
    dw: AtomicU64,
    index: AtomicUsize,
    filled: AtomicUsize,
    upstream: Mutex<Option<SubscriptionHandle<T>>>,
    done: AtomicBool,
    error: Mutex<Option<RheoError>>,
    cancelled: AtomicBool,
    /// Latched once a terminal has been delivered downstream.
    finished: AtomicBool,
}

impl<T: Clone + Send + 'static> OverlapState<T> {
    fn new(actual: Arc<dyn Subscriber<UnicastProcessor<T>>>, size: usize, skip: usize) -> Self {
        Self {
            actual,
            size,
            skip,
            emit_queue: Mutex::new(VecDeque::new()),
            windows: Mutex::new(VecDeque::new()),
            refs: AtomicU64::new(1),
            once: AtomicBool::new(false),
            first_request: AtomicBool::new(false),
            requested: AtomicU64::new(0),
            dw: AtomicU64::new(0),
            index: AtomicUsize::new(0),
            filled: AtomicUsize::new(0),
            upstream: Mutex::new(None),
            done: AtomicBool::new(false),
            error: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    fn check_terminated(&self, done: bool, empty: bool) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            self.finished.store(true, Ordering::SeqCst);
            self.emit_queue.lock().clear();
            return true;
        }
        if done {
            let error = self.error.lock().take();
            if let Some(error) = error {
                self.finished.store(true, Ordering::SeqCst);
                self.emit_queue.lock().clear();
                self.actual.on_error(error);
                return true;
            } else if empty {
                self.finished.store(true, Ordering::SeqCst);
                self.actual.on_complete();
                return true;
            }
        }
        false
    }

    fn drain(&self) {
        if self.dw.fetch_add(1, Ordering::SeqCst) != 0 {
            return;
        }
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let mut missed = 1u64;
        loop {
            let r = self.requested.load(Ordering::SeqCst);
            let mut e = 0u64;

            while e != r {
                let done = self.done.load(Ordering::SeqCst);
                let item = self.emit_queue.lock().pop_front();
                let empty = item.is_none();
                if self.check_terminated(done, empty) {
                    return;
                }
                let Some(window) = item else { break };
                self.actual.on_next(window);
                e += 1;
            }

            if e == r
                && self.check_terminated(
                    self.done.load(Ordering::SeqCst),
                    self.emit_queue.lock().is_empty(),
                )
            {
                return;
            }

            if e != 0 && r != demand::UNBOUNDED {
                demand::produced(&self.requested, e);
            }

            let w = self.dw.load(Ordering::SeqCst);
            if missed == w {
                missed = self.dw.fetch_sub(missed, Ordering::SeqCst) - missed;
                if missed == 0 {
                    break;
                }
            } else {
                missed = w;
            }
        }
    }
}

impl<T: Clone + Send + 'static> Subscription for OverlapState<T> {
    fn request(&self, n: u64) {
        if demand::validate(n).is_err() {
            *self.error.lock() = Some(RheoError::BadRequest);
            self.done.store(true, Ordering::SeqCst);
            self.drain();
            return;
        }
        let size = self.size as u64;
        let skip = self.skip as u64;
        let upstream_demand = if self
            .first_request
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // The first window needs `size` values; every further one opens
            // `skip` values later.
            demand::add_cap(size, demand::multiply_cap(skip, n - 1))
        } else {
            demand::multiply_cap(skip, n)
        };
        protocol::request_upstream(&self.upstream, upstream_demand);

        demand::get_and_add_cap(&self.requested, n);
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if !self.once.swap(true, Ordering::SeqCst) {
            self.run();
        }
    }
}

impl<T: Clone + Send + 'static> Task for OverlapState<T> {
    fn run(&self) {
        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            protocol::cancel_upstream(&self.upstream);
        }
    }
}

struct OverlapAgent<T> {
    state: Arc<OverlapState<T>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> for OverlapAgent<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        let st = &self.state;
        if protocol::store_upstream(&st.upstream, subscription) {
            st.actual
                .on_subscribe(SubscriptionHandle::Plain(
                    Arc::clone(&self.state) as Arc<dyn Subscription>
                ));
        }
    }

    fn on_next(&self, value: T) {
        let st = &self.state;
        if st.done.load(Ordering::SeqCst) {
            hooks::next_dropped();
            return;
        }

        let i = st.index.load(Ordering::Relaxed);

        if i == 0 && !st.cancelled.load(Ordering::SeqCst) {
            st.refs.fetch_add(1, Ordering::SeqCst);
            let window = UnicastProcessor::with_terminate(
                st.size,
                Some(Arc::clone(&self.state) as Arc<dyn Task>),
            );
            st.windows.lock().push_back(window.clone());
            st.emit_queue.lock().push_back(window);
            st.drain();
        }

        let i = i + 1;

        for window in st.windows.lock().iter() {
            window.next(value.clone());
        }

        let filled = st.filled.load(Ordering::Relaxed) + 1;
        if filled == st.size {
            // The oldest window is full `skip` values before the next one is.
            st.filled.store(filled - st.skip, Ordering::Relaxed);
            let oldest = st.windows.lock().pop_front();
            if let Some(window) = oldest {
                window.complete();
            }
        } else {
            st.filled.store(filled, Ordering::Relaxed);
        }

        st.index
            .store(if i == st.skip { 0 } else { i }, Ordering::Relaxed);
    }

    fn on_error(&self, error: RheoError) {
        let st = &self.state;
        if st.done.load(Ordering::SeqCst) {
            hooks::error_dropped(&error);
            return;
        }
        for window in st.windows.lock().drain(..) {
            window.error(error.clone());
        }
        *st.error.lock() = Some(error);
        st.done.store(true, Ordering::SeqCst);
        st.drain();
    }

    fn on_complete(&self) {
        let st = &self.state;
        if st.done.load(Ordering::SeqCst) {
            return;
        }
        for window in st.windows.lock().drain(..) {
            window.complete();
        }
        st.done.store(true, Ordering::SeqCst);
        st.drain();
    }
}
