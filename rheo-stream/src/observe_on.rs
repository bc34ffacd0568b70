// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Asynchronous boundary moving items from the producing context to a
//! worker-driven consuming context.
//!
//! Items cross through a bounded queue of `prefetch` capacity. The drain
//! loop runs on the worker, serialised by a work-in-progress counter, and
//! replenishes upstream demand in batches of `prefetch - prefetch/4` so the
//! producer is never starved and never overruns the queue.
//!
//! When the upstream offers a fused queue face the intermediate queue is
//! elided: in sync mode the upstream *is* the queue and draining it to
//! empty is completion; in async mode items still arrive asynchronously
//! but are polled straight out of the upstream.

use crate::outlet::{ConditionalOutlet, Outlet, PlainOutlet};
use parking_lot::Mutex;
use rheo_core::demand;
use rheo_core::executor::{Task, Worker, WorkerFactory};
use rheo_core::fusion::FusionMode;
use rheo_core::hooks;
use rheo_core::protocol::{
    self, ConditionalSubscriber, Publisher, Subscriber, Subscription, SubscriptionHandle,
};
use rheo_core::queue::ItemQueue;
use rheo_core::spsc::SpscRing;
use rheo_core::QueueSubscription;
use rheo_error::{Result, RheoError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

const MODE_NORMAL: u8 = 0;
const MODE_SYNC: u8 = 1;
const MODE_ASYNC: u8 = 2;

/// Publisher that re-emits its source on a worker obtained from a factory.
///
/// One worker is obtained per subscriber and disposed on whichever terminal
/// (normal, errored, cancelled) occurs first.
///
/// With `delay_error` set, an upstream error is withheld until the queue has
/// drained; otherwise it preempts queued values.
pub struct ObserveOn<S> {
    source: S,
    worker_factory: WorkerFactory,
    delay_error: bool,
    prefetch: usize,
}

impl<S> ObserveOn<S> {
    /// Wrap `source` so its signals are re-emitted on a fresh worker.
    ///
    /// # Panics
    ///
    /// Panics if `prefetch` is 0. `prefetch == usize::MAX` requests an
    /// unbounded upstream and disables replenishment.
    pub fn new(
        source: S,
        worker_factory: WorkerFactory,
        delay_error: bool,
        prefetch: usize,
    ) -> Self {
        assert!(prefetch > 0, "prefetch must be positive");
        Self {
            source,
            worker_factory,
            delay_error,
            prefetch,
        }
    }

    fn boundary<T, D>(&self, outlet: D) -> Arc<dyn Subscriber<T>>
    where
        T: Send + 'static,
        D: Outlet<T>,
    {
        let worker = (self.worker_factory)();
        Arc::new(BoundaryAgent {
            state: Arc::new(BoundaryState::new(
                outlet,
                worker,
                self.delay_error,
                self.prefetch,
            )),
        })
    }

    /// Subscribe a conditional downstream. Values refused by `try_on_next`
    /// do not count against downstream demand, but every polled item still
    /// counts toward upstream replenishment, preserving prefetch accounting
    /// regardless of filtering efficiency.
    pub fn subscribe_conditional<T>(&self, subscriber: Arc<dyn ConditionalSubscriber<T>>)
    where
        T: Send + 'static,
        S: Publisher<T>,
    {
        let agent = self.boundary(ConditionalOutlet(subscriber));
        self.source.subscribe(agent);
    }
}

impl<S, T> Publisher<T> for ObserveOn<S>
where
    S: Publisher<T>,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let agent = self.boundary(PlainOutlet(subscriber));
        self.source.subscribe(agent);
    }
}

/// The queue the drain loop consumes from: the allocated ring, an unbounded
/// spill list for unbounded prefetch, or the fused upstream itself.
enum SourceQueue<T> {
    Ring(SpscRing<T>),
    Unbounded(Mutex<VecDeque<T>>),
    Fused(Arc<dyn QueueSubscription<T>>),
}

impl<T: Send + 'static> SourceQueue<T> {
    fn offer(&self, value: T) -> std::result::Result<(), T> {
        match self {
            Self::Ring(ring) => ring.offer(value),
            Self::Unbounded(deque) => {
                deque.lock().push_back(value);
                Ok(())
            }
            // A fused upstream is never offered into; hand the value back.
            Self::Fused(_) => Err(value),
        }
    }

    fn poll(&self) -> Result<Option<T>> {
        match self {
            Self::Ring(ring) => Ok(ring.poll()),
            Self::Unbounded(deque) => Ok(deque.lock().pop_front()),
            Self::Fused(fused) => fused.poll(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Ring(ring) => ring.is_empty(),
            Self::Unbounded(deque) => deque.lock().is_empty(),
            Self::Fused(fused) => fused.is_empty(),
        }
    }

    fn clear(&self) {
        match self {
            Self::Ring(ring) => ring.clear(),
            Self::Unbounded(deque) => deque.lock().clear(),
            Self::Fused(fused) => fused.clear(),
        }
    }
}

struct BoundaryState<T, D> {
    outlet: D,
    worker: Arc<dyn Worker>,
    delay_error: bool,
    prefetch: u64,
    limit: u64,
    upstream: Mutex<Option<SubscriptionHandle<T>>>,
    queue: OnceLock<SourceQueue<T>>,
    mode: AtomicU8,
    done: AtomicBool,
    error: Mutex<Option<RheoError>>,
    cancelled: AtomicBool,
    /// Latched once a terminal has been delivered (or cancellation has been
    /// honoured); no signal may follow.
    finished: AtomicBool,
    wip: AtomicU64,
    requested: AtomicU64,
    // Drain-owner scratch, persisted between passes.
    emitted: AtomicU64,
    polled: AtomicU64,
}

impl<T, D> BoundaryState<T, D> {
    fn new(outlet: D, worker: Arc<dyn Worker>, delay_error: bool, prefetch: usize) -> Self {
        let prefetch = if prefetch == usize::MAX {
            demand::UNBOUNDED
        } else {
            prefetch as u64
        };
        let limit = if prefetch == demand::UNBOUNDED {
            demand::UNBOUNDED
        } else {
            prefetch - (prefetch >> 2)
        };
        Self {
            outlet,
            worker,
            delay_error,
            prefetch,
            limit,
            upstream: Mutex::new(None),
            queue: OnceLock::new(),
            mode: AtomicU8::new(MODE_NORMAL),
            done: AtomicBool::new(false),
            error: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            wip: AtomicU64::new(0),
            requested: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            polled: AtomicU64::new(0),
        }
    }

    fn fresh_queue(&self) -> SourceQueue<T> {
        if self.prefetch == demand::UNBOUNDED {
            SourceQueue::Unbounded(Mutex::new(VecDeque::new()))
        } else {
            SourceQueue::Ring(SpscRing::new(self.prefetch as usize))
        }
    }
}

/// Subscriber, subscription and drain task of one observe-on boundary.
struct BoundaryAgent<T, D> {
    state: Arc<BoundaryState<T, D>>,
}

impl<T, D> Clone for BoundaryAgent<T, D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, D> BoundaryAgent<T, D>
where
    T: Send + 'static,
    D: Outlet<T>,
{
    fn try_schedule(&self) {
        if self.state.wip.fetch_add(1, Ordering::SeqCst) != 0 {
            return;
        }
        self.state.worker.schedule(Arc::new(self.clone()));
    }

    /// Evaluate the terminal ladder. Returns `true` when the drain is over
    /// and all resources have been released.
    fn check_terminated(&self, done: bool, empty: bool) -> bool {
        let st = &self.state;
        if st.cancelled.load(Ordering::SeqCst) {
            st.finished.store(true, Ordering::SeqCst);
            protocol::cancel_upstream(&st.upstream);
            st.worker.dispose();
            if let Some(queue) = st.queue.get() {
                queue.clear();
            }
            return true;
        }
        if done {
            if st.delay_error {
                if empty {
                    st.finished.store(true, Ordering::SeqCst);
                    st.worker.dispose();
                    match st.error.lock().take() {
                        Some(error) => st.outlet.on_error(error),
                        None => st.outlet.on_complete(),
                    }
                    return true;
                }
            } else {
                let error = st.error.lock().take();
                if let Some(error) = error {
                    st.finished.store(true, Ordering::SeqCst);
                    st.worker.dispose();
                    if let Some(queue) = st.queue.get() {
                        queue.clear();
                    }
                    st.outlet.on_error(error);
                    return true;
                } else if empty {
                    st.finished.store(true, Ordering::SeqCst);
                    st.worker.dispose();
                    st.outlet.on_complete();
                    return true;
                }
            }
        }
        false
    }

    /// Drain for a sync-fused upstream: the queue is known-terminating and
    /// empty means complete; no replenishment ever happens.
    fn run_sync(&self) {
        let st = &self.state;
        let Some(queue) = st.queue.get() else { return };
        let mut missed = 1u64;
        let mut emitted = st.emitted.load(Ordering::Relaxed);

        loop {
            // A protocol violation recorded by `request` preempts the queue.
            if let Some(error) = st.error.lock().take() {
                st.finished.store(true, Ordering::SeqCst);
                st.worker.dispose();
                queue.clear();
                st.outlet.on_error(error);
                return;
            }

            let r = st.requested.load(Ordering::SeqCst);

            while emitted != r {
                let item = match queue.poll() {
                    Ok(item) => item,
                    Err(error) => {
                        st.finished.store(true, Ordering::SeqCst);
                        st.worker.dispose();
                        st.outlet.on_error(error);
                        return;
                    }
                };

                if st.cancelled.load(Ordering::SeqCst) {
                    st.finished.store(true, Ordering::SeqCst);
                    st.worker.dispose();
                    return;
                }

                match item {
                    None => {
                        st.finished.store(true, Ordering::SeqCst);
                        st.worker.dispose();
                        st.outlet.on_complete();
                        return;
                    }
                    Some(value) => {
                        if st.outlet.accept(value) {
                            emitted += 1;
                        }
                    }
                }
            }

            if emitted == r {
                if st.cancelled.load(Ordering::SeqCst) {
                    st.finished.store(true, Ordering::SeqCst);
                    st.worker.dispose();
                    return;
                }
                if queue.is_empty() {
                    st.finished.store(true, Ordering::SeqCst);
                    st.worker.dispose();
                    st.outlet.on_complete();
                    return;
                }
            }

            let w = st.wip.load(Ordering::SeqCst);
            if missed == w {
                st.emitted.store(emitted, Ordering::Relaxed);
                missed = st.wip.fetch_sub(missed, Ordering::SeqCst) - missed;
                if missed == 0 {
                    break;
                }
            } else {
                missed = w;
            }
        }
    }

    fn run_async(&self) {
        let st = &self.state;
        let mut missed = 1u64;
        let mut emitted = st.emitted.load(Ordering::Relaxed);
        let mut polled = st.polled.load(Ordering::Relaxed);

        loop {
            let r = st.requested.load(Ordering::SeqCst);

            while emitted != r {
                let done = st.done.load(Ordering::SeqCst);
                let item = match st.queue.get() {
                    Some(queue) => queue.poll(),
                    None => Ok(None),
                };
                let item = match item {
                    Ok(item) => item,
                    Err(error) => {
                        // A failing fused poll behaves like an upstream error.
                        *st.error.lock() = Some(error);
                        st.done.store(true, Ordering::SeqCst);
                        continue;
                    }
                };

                let empty = item.is_none();
                if self.check_terminated(done, empty) {
                    return;
                }
                let Some(value) = item else { break };

                if st.outlet.accept(value) {
                    emitted += 1;
                }
                polled += 1;
                if polled == st.limit {
                    protocol::request_upstream(&st.upstream, polled);
                    polled = 0;
                }
            }

            if emitted == r {
                let empty = st.queue.get().map_or(true, SourceQueue::is_empty);
                if self.check_terminated(st.done.load(Ordering::SeqCst), empty) {
                    return;
                }
            }

            let w = st.wip.load(Ordering::SeqCst);
            if missed == w {
                st.emitted.store(emitted, Ordering::Relaxed);
                st.polled.store(polled, Ordering::Relaxed);
                missed = st.wip.fetch_sub(missed, Ordering::SeqCst) - missed;
                if missed == 0 {
                    break;
                }
            } else {
                missed = w;
            }
        }
    }
}

impl<T, D> Subscriber<T> for BoundaryAgent<T, D>
where
    T: Send + 'static,
    D: Outlet<T>,
{
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        let st = &self.state;
        if !protocol::store_upstream(&st.upstream, subscription.clone()) {
            return;
        }

        if let Some(fused) = subscription.fused() {
            match fused.request_fusion(FusionMode::Any) {
                FusionMode::Sync => {
                    st.mode.store(MODE_SYNC, Ordering::SeqCst);
                    let _ = st.queue.set(SourceQueue::Fused(Arc::clone(fused)));
                    st.done.store(true, Ordering::SeqCst);

                    st.outlet
                        .on_subscribe(SubscriptionHandle::Plain(Arc::new(self.clone())));
                    // No initial request: the sync queue already holds the
                    // whole sequence.
                    return;
                }
                FusionMode::Async => {
                    st.mode.store(MODE_ASYNC, Ordering::SeqCst);
                    let _ = st.queue.set(SourceQueue::Fused(Arc::clone(fused)));
                }
                _ => {
                    let _ = st.queue.set(st.fresh_queue());
                }
            }
        } else {
            let _ = st.queue.set(st.fresh_queue());
        }

        st.outlet
            .on_subscribe(SubscriptionHandle::Plain(Arc::new(self.clone())));

        subscription.request(st.prefetch);
    }

    fn on_next(&self, value: T) {
        let st = &self.state;
        if st.mode.load(Ordering::SeqCst) == MODE_ASYNC {
            self.try_schedule();
            return;
        }
        if st.done.load(Ordering::SeqCst) {
            hooks::next_dropped();
            return;
        }
        let rejected = match st.queue.get() {
            Some(queue) => queue.offer(value).is_err(),
            None => true,
        };
        if rejected {
            // The source overran the negotiated prefetch.
            protocol::cancel_upstream(&st.upstream);
            *st.error.lock() = Some(RheoError::QueueFull);
            st.done.store(true, Ordering::SeqCst);
            hooks::next_dropped();
        }
        self.try_schedule();
    }

    fn on_pollable(&self) {
        self.try_schedule();
    }

    fn on_error(&self, error: RheoError) {
        let st = &self.state;
        if st.done.load(Ordering::SeqCst) {
            hooks::error_dropped(&error);
            return;
        }
        *st.error.lock() = Some(error);
        st.done.store(true, Ordering::SeqCst);
        self.try_schedule();
    }

    fn on_complete(&self) {
        self.state.done.store(true, Ordering::SeqCst);
        self.try_schedule();
    }
}

impl<T, D> Subscription for BoundaryAgent<T, D>
where
    T: Send + 'static,
    D: Outlet<T>,
{
    fn request(&self, n: u64) {
        let st = &self.state;
        if demand::validate(n).is_err() {
            protocol::cancel_upstream(&st.upstream);
            *st.error.lock() = Some(RheoError::BadRequest);
            st.done.store(true, Ordering::SeqCst);
            self.try_schedule();
            return;
        }
        demand::get_and_add_cap(&st.requested, n);
        self.try_schedule();
    }

    fn cancel(&self) {
        let st = &self.state;
        if st.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        st.worker.dispose();
        if st.wip.fetch_add(1, Ordering::SeqCst) == 0 {
            protocol::cancel_upstream(&st.upstream);
            if let Some(queue) = st.queue.get() {
                queue.clear();
            }
        }
    }
}

impl<T, D> Task for BoundaryAgent<T, D>
where
    T: Send + 'static,
    D: Outlet<T>,
{
    fn run(&self) {
        if self.state.finished.load(Ordering::SeqCst) {
            return;
        }
        if self.state.mode.load(Ordering::SeqCst) == MODE_SYNC {
            self.run_sync();
        } else {
            self.run_async();
        }
    }
}
