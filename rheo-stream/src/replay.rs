// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Hot multicast processor replaying all or the last N values.
//!
//! The processor appends every value into a shared buffer and each
//! subscriber owns a cursor into it, so current and future subscribers all
//! observe a prefix of the same well-ordered sequence. Two buffer shapes:
//!
//! - *Unbounded*: a linked chain of fixed arrays of write-once slots; a
//!   release-published size counter guarantees no reader observes a slot
//!   before it is written.
//! - *Bounded*: a singly linked node chain with a sentinel head that
//!   advances on overflow, dropping the oldest value.
//!
//! Subscribers may consume classically or negotiate async fusion, in which
//! case availability is signalled through `on_pollable` and values are
//! pulled with `poll`.

use parking_lot::Mutex;
use rheo_core::demand;
use rheo_core::fusion::{FusionMode, QueueSubscription};
use rheo_core::hooks;
use rheo_core::protocol::{
    self, Publisher, Subscriber, Subscription, SubscriptionHandle,
};
use rheo_error::{Result, RheoError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

const DEFAULT_BATCH: usize = 16;

/// Hot multicast processor with replay.
///
/// Cloning the handle shares the same underlying processor. Values are fed
/// either through the inherent [`next`](Self::next) / [`error`](Self::error)
/// / [`complete`](Self::complete) API or by subscribing the processor to an
/// upstream publisher (it requests unbounded demand).
///
/// # Examples
///
/// ```
/// use rheo_stream::ReplayProcessor;
/// use rheo_core::Publisher;
/// use rheo_test_utils::TestSubscriber;
///
/// let replay = ReplayProcessor::unbounded();
/// replay.next(1);
/// replay.next(2);
/// replay.complete();
///
/// // Late subscribers still get the full sequence.
/// let late = TestSubscriber::new(u64::MAX);
/// replay.subscribe(late.clone());
/// assert_eq!(late.values(), vec![1, 2]);
/// assert!(late.is_complete());
/// ```
pub struct ReplayProcessor<T> {
    inner: Arc<ReplayInner<T>>,
}

impl<T> Clone for ReplayProcessor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ReplayProcessor<T> {
    /// Unbounded replay with the default internal batch size.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::unbounded_with_batch(DEFAULT_BATCH)
    }

    /// Unbounded replay; `batch` is the length of each linked array node.
    ///
    /// # Panics
    ///
    /// Panics if `batch` is 0.
    #[must_use]
    pub fn unbounded_with_batch(batch: usize) -> Self {
        assert!(batch > 0, "batch size must be positive");
        Self::with_buffer(ReplayBuffer::Unbounded(UnboundedBuffer::new(batch)))
    }

    /// Replay of at most the last `limit` values.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    #[must_use]
    pub fn bounded(limit: usize) -> Self {
        assert!(limit > 0, "limit must be positive");
        Self::with_buffer(ReplayBuffer::Bounded(BoundedBuffer::new(limit)))
    }

    fn with_buffer(buffer: ReplayBuffer<T>) -> Self {
        Self {
            inner: Arc::new(ReplayInner {
                buffer,
                registry: Mutex::new(Registry {
                    terminated: false,
                    subscribers: Vec::new(),
                }),
                upstream: Mutex::new(None),
            }),
        }
    }

    /// Append one value and replay it to every current subscriber.
    pub fn next(&self, value: T) {
        let inner = &self.inner;
        if inner.buffer.is_done() {
            hooks::next_dropped();
            return;
        }
        inner.buffer.on_next(value);
        for subscriber in inner.snapshot() {
            inner.buffer.drain(&subscriber);
        }
    }

    /// Terminate with an error; every current subscriber observes it after
    /// its remaining replay.
    pub fn error(&self, error: RheoError) {
        let inner = &self.inner;
        if inner.buffer.is_done() {
            hooks::error_dropped(&error);
            return;
        }
        inner.buffer.on_error(error);
        for subscriber in inner.terminate_registry() {
            inner.buffer.drain(&subscriber);
        }
    }

    /// Terminate normally.
    pub fn complete(&self) {
        let inner = &self.inner;
        if inner.buffer.is_done() {
            return;
        }
        inner.buffer.on_complete();
        for subscriber in inner.terminate_registry() {
            inner.buffer.drain(&subscriber);
        }
    }

    /// Whether a terminal has been recorded.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.buffer.is_done()
    }

    /// Number of currently attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().subscribers.len()
    }

    /// The bounded limit, or the internal batch size when unbounded.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.buffer.capacity()
    }
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> for ReplayProcessor<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = &self.inner;
        let subscription = Arc::new(ReplaySubscription {
            actual: subscriber.clone(),
            parent: Arc::clone(inner),
            cursor: Mutex::new(ReplayCursor {
                node: None,
                offset: 0,
                index: 0,
            }),
            wip: AtomicU64::new(0),
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            fused: AtomicBool::new(false),
        });
        subscriber.on_subscribe(SubscriptionHandle::Fused(subscription.clone()));

        if inner.add(&subscription) {
            if subscription.is_cancelled() {
                inner.remove(&subscription);
            }
        } else {
            // Already terminated: replay straight off the buffer so late
            // subscribers still observe the full sequence and terminal.
            inner.buffer.drain(&subscription);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Subscriber<T> for ReplayProcessor<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        if self.inner.buffer.is_done() {
            subscription.cancel();
            return;
        }
        if protocol::store_upstream(&self.inner.upstream, subscription.clone()) {
            subscription.request(demand::UNBOUNDED);
        }
    }

    fn on_next(&self, value: T) {
        self.next(value);
    }

    fn on_error(&self, error: RheoError) {
        self.error(error);
    }

    fn on_complete(&self) {
        self.complete();
    }
}

struct Registry<T> {
    terminated: bool,
    subscribers: Vec<Arc<ReplaySubscription<T>>>,
}

struct ReplayInner<T> {
    buffer: ReplayBuffer<T>,
    registry: Mutex<Registry<T>>,
    upstream: Mutex<Option<SubscriptionHandle<T>>>,
}

impl<T: Clone + Send + Sync + 'static> ReplayInner<T> {
    fn add(&self, subscription: &Arc<ReplaySubscription<T>>) -> bool {
        let mut registry = self.registry.lock();
        if registry.terminated {
            false
        } else {
            registry.subscribers.push(Arc::clone(subscription));
            true
        }
    }

    fn remove(&self, subscription: &ReplaySubscription<T>) {
        self.registry
            .lock()
            .subscribers
            .retain(|s| !std::ptr::eq(Arc::as_ptr(s), subscription));
    }

    fn snapshot(&self) -> Vec<Arc<ReplaySubscription<T>>> {
        self.registry.lock().subscribers.clone()
    }

    /// Swap the registry to its terminated state, returning the subscribers
    /// that still need to observe the terminal.
    fn terminate_registry(&self) -> Vec<Arc<ReplaySubscription<T>>> {
        let mut registry = self.registry.lock();
        registry.terminated = true;
        std::mem::take(&mut registry.subscribers)
    }
}

/// Per-subscriber position into the shared buffer.
struct ReplayCursor<T> {
    node: Option<CursorNode<T>>,
    /// Intra-node slot index (unbounded buffer only).
    offset: usize,
    /// Global index of the next value to deliver (unbounded buffer only).
    index: usize,
}

enum CursorNode<T> {
    Unbounded(Arc<ArrayNode<T>>),
    Bounded(Arc<ListNode<T>>),
}

impl<T> ReplayCursor<T> {
    fn array_node(&mut self, head: &Arc<ArrayNode<T>>) -> Arc<ArrayNode<T>> {
        match &self.node {
            Some(CursorNode::Unbounded(node)) => Arc::clone(node),
            _ => {
                let node = Arc::clone(head);
                self.node = Some(CursorNode::Unbounded(Arc::clone(&node)));
                node
            }
        }
    }

    fn list_node(&mut self, head: &Arc<ListNode<T>>) -> Arc<ListNode<T>> {
        match &self.node {
            Some(CursorNode::Bounded(node)) => Arc::clone(node),
            _ => {
                let node = Arc::clone(head);
                self.node = Some(CursorNode::Bounded(Arc::clone(&node)));
                node
            }
        }
    }

    fn reset(&mut self) {
        self.node = None;
        self.offset = 0;
        self.index = 0;
    }
}

struct ReplaySubscription<T> {
    actual: Arc<dyn Subscriber<T>>,
    parent: Arc<ReplayInner<T>>,
    cursor: Mutex<ReplayCursor<T>>,
    wip: AtomicU64,
    requested: AtomicU64,
    cancelled: AtomicBool,
    /// Latched when the terminal has been delivered; nothing may follow.
    finished: AtomicBool,
    fused: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> ReplaySubscription<T> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Claim the right to deliver the terminal; `false` if already done.
    fn finish(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }

    fn is_fused(&self) -> bool {
        self.fused.load(Ordering::SeqCst)
    }

    /// Claim drain ownership; `true` means this caller runs the loop.
    fn enter(&self) -> bool {
        self.wip.fetch_add(1, Ordering::SeqCst) == 0
    }

    fn leave(&self, missed: u64) -> u64 {
        self.wip.fetch_sub(missed, Ordering::SeqCst) - missed
    }
}

impl<T: Clone + Send + Sync + 'static> Subscription for ReplaySubscription<T> {
    fn request(&self, n: u64) {
        if demand::validate(n).is_err() {
            if !self.cancelled.swap(true, Ordering::SeqCst) {
                self.parent.remove(self);
                // Terminal unless one already fired.
                if self.finish() {
                    self.actual.on_error(RheoError::BadRequest);
                }
            }
            return;
        }
        if !self.is_fused() {
            demand::get_and_add_cap(&self.requested, n);
        }
        self.parent.buffer.drain(self);
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.parent.remove(self);
        // Unpin the buffer if we won the drain lock; otherwise the active
        // drain owner observes `cancelled` and does it.
        if self.enter() {
            self.cursor.lock().reset();
        }
    }
}

impl<T: Clone + Send + Sync + 'static> QueueSubscription<T> for ReplaySubscription<T> {
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        if requested.accepts(FusionMode::Async) {
            self.fused.store(true, Ordering::SeqCst);
            FusionMode::Async
        } else {
            FusionMode::None
        }
    }

    fn poll(&self) -> Result<Option<T>> {
        Ok(self.parent.buffer.poll(self))
    }

    fn is_empty(&self) -> bool {
        self.parent.buffer.is_buffer_empty(self)
    }

    fn clear(&self) {
        self.cursor.lock().reset();
    }
}

enum ReplayBuffer<T> {
    Unbounded(UnboundedBuffer<T>),
    Bounded(BoundedBuffer<T>),
}

impl<T: Clone + Send + Sync + 'static> ReplayBuffer<T> {
    fn on_next(&self, value: T) {
        match self {
            Self::Unbounded(b) => b.append(value),
            Self::Bounded(b) => b.append(value),
        }
    }

    fn on_error(&self, error: RheoError) {
        match self {
            Self::Unbounded(b) => b.terminate(Some(error)),
            Self::Bounded(b) => b.terminate(Some(error)),
        }
    }

    fn on_complete(&self) {
        match self {
            Self::Unbounded(b) => b.terminate(None),
            Self::Bounded(b) => b.terminate(None),
        }
    }

    fn is_done(&self) -> bool {
        match self {
            Self::Unbounded(b) => b.done.load(Ordering::SeqCst),
            Self::Bounded(b) => b.done.load(Ordering::SeqCst),
        }
    }

    fn capacity(&self) -> usize {
        match self {
            Self::Unbounded(b) => b.batch,
            Self::Bounded(b) => b.limit,
        }
    }

    fn terminal_error(&self) -> Option<RheoError> {
        match self {
            Self::Unbounded(b) => b.error.lock().clone(),
            Self::Bounded(b) => b.error.lock().clone(),
        }
    }

    fn drain(&self, rp: &ReplaySubscription<T>) {
        if !rp.enter() {
            return;
        }
        if rp.finished.load(Ordering::SeqCst) {
            return;
        }
        if rp.is_fused() {
            self.drain_fused(rp);
        } else {
            match self {
                Self::Unbounded(b) => b.drain_normal(rp),
                Self::Bounded(b) => b.drain_normal(rp),
            }
        }
    }

    /// Fused drain: signal availability, then the terminal once done.
    fn drain_fused(&self, rp: &ReplaySubscription<T>) {
        let mut missed = 1u64;
        loop {
            if rp.is_cancelled() {
                rp.cursor.lock().reset();
                return;
            }

            rp.actual.on_pollable();

            if self.is_done() {
                if rp.finish() {
                    match self.terminal_error() {
                        Some(error) => rp.actual.on_error(error),
                        None => rp.actual.on_complete(),
                    }
                }
                return;
            }

            missed = rp.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn poll(&self, rp: &ReplaySubscription<T>) -> Option<T> {
        match self {
            Self::Unbounded(b) => b.poll(rp),
            Self::Bounded(b) => b.poll(rp),
        }
    }

    fn is_buffer_empty(&self, rp: &ReplaySubscription<T>) -> bool {
        match self {
            Self::Unbounded(b) => b.is_empty(rp),
            Self::Bounded(b) => b.is_empty(rp),
        }
    }
}

/// A node of the unbounded linked-array buffer: `batch` write-once slots and
/// a write-once link to the successor.
struct ArrayNode<T> {
    slots: Box<[OnceLock<T>]>,
    next: OnceLock<Arc<ArrayNode<T>>>,
}

impl<T> ArrayNode<T> {
    fn new(batch: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: (0..batch).map(|_| OnceLock::new()).collect(),
            next: OnceLock::new(),
        })
    }
}

struct UnboundedBuffer<T> {
    batch: usize,
    /// Published count of appended values. Stored after the slot write so a
    /// reader that observes `index < size` always finds the slot filled.
    size: AtomicUsize,
    head: Arc<ArrayNode<T>>,
    tail: Mutex<TailPosition<T>>,
    done: AtomicBool,
    error: Mutex<Option<RheoError>>,
}

struct TailPosition<T> {
    node: Arc<ArrayNode<T>>,
    offset: usize,
}

impl<T: Clone + Send + Sync + 'static> UnboundedBuffer<T> {
    fn new(batch: usize) -> Self {
        let head = ArrayNode::new(batch);
        Self {
            batch,
            size: AtomicUsize::new(0),
            head: Arc::clone(&head),
            tail: Mutex::new(TailPosition {
                node: head,
                offset: 0,
            }),
            done: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    fn append(&self, value: T) {
        let mut tail = self.tail.lock();
        if tail.offset == self.batch {
            let node = ArrayNode::new(self.batch);
            let _ = tail.node.next.set(Arc::clone(&node));
            tail.node = node;
            tail.offset = 0;
        }
        let _ = tail.node.slots[tail.offset].set(value);
        tail.offset += 1;
        self.size.fetch_add(1, Ordering::SeqCst);
    }

    fn terminate(&self, error: Option<RheoError>) {
        if let Some(error) = error {
            *self.error.lock() = Some(error);
        }
        self.done.store(true, Ordering::SeqCst);
    }

    fn emit_terminal(&self, rp: &ReplaySubscription<T>) {
        if !rp.finish() {
            return;
        }
        match self.error.lock().clone() {
            Some(error) => rp.actual.on_error(error),
            None => rp.actual.on_complete(),
        }
    }

    fn drain_normal(&self, rp: &ReplaySubscription<T>) {
        let mut missed = 1u64;
        loop {
            {
                let mut cursor = rp.cursor.lock();
                let r = rp.requested.load(Ordering::SeqCst);
                let mut e = 0u64;

                let mut node = cursor.array_node(&self.head);
                let mut offset = cursor.offset;
                let mut index = cursor.index;

                while e != r {
                    if rp.is_cancelled() {
                        cursor.reset();
                        return;
                    }

                    let done = self.done.load(Ordering::SeqCst);
                    let empty = index == self.size.load(Ordering::SeqCst);

                    if done && empty {
                        cursor.reset();
                        self.emit_terminal(rp);
                        return;
                    }
                    if empty {
                        break;
                    }

                    if offset == self.batch {
                        let Some(next) = node.next.get().cloned() else { break };
                        node = next;
                        offset = 0;
                    }
                    let Some(value) = node.slots[offset].get().cloned() else {
                        break;
                    };

                    rp.actual.on_next(value);

                    e += 1;
                    offset += 1;
                    index += 1;
                }

                if e == r {
                    if rp.is_cancelled() {
                        cursor.reset();
                        return;
                    }
                    let done = self.done.load(Ordering::SeqCst);
                    let empty = index == self.size.load(Ordering::SeqCst);
                    if done && empty {
                        cursor.reset();
                        self.emit_terminal(rp);
                        return;
                    }
                }

                if e != 0 && r != demand::UNBOUNDED {
                    demand::produced(&rp.requested, e);
                }

                cursor.node = Some(CursorNode::Unbounded(node));
                cursor.offset = offset;
                cursor.index = index;
            }

            missed = rp.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn poll(&self, rp: &ReplaySubscription<T>) -> Option<T> {
        let mut cursor = rp.cursor.lock();
        if cursor.index == self.size.load(Ordering::SeqCst) {
            return None;
        }
        let mut node = cursor.array_node(&self.head);
        if cursor.offset == self.batch {
            node = node.next.get().cloned()?;
            cursor.offset = 0;
            cursor.node = Some(CursorNode::Unbounded(Arc::clone(&node)));
        }
        let value = node.slots[cursor.offset].get().cloned()?;
        cursor.offset += 1;
        cursor.index += 1;
        Some(value)
    }

    fn is_empty(&self, rp: &ReplaySubscription<T>) -> bool {
        rp.cursor.lock().index == self.size.load(Ordering::SeqCst)
    }
}

/// A node of the bounded linked-list buffer.
struct ListNode<T> {
    value: Option<T>,
    next: OnceLock<Arc<ListNode<T>>>,
}

impl<T> ListNode<T> {
    fn new(value: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            value,
            next: OnceLock::new(),
        })
    }
}

struct BoundedBuffer<T> {
    limit: usize,
    list: Mutex<ListPosition<T>>,
    done: AtomicBool,
    error: Mutex<Option<RheoError>>,
}

struct ListPosition<T> {
    /// Sentinel: values are read from the *successor* of the cursor node, so
    /// advancing `head` drops the oldest retained value.
    head: Arc<ListNode<T>>,
    tail: Arc<ListNode<T>>,
    size: usize,
}

impl<T: Clone + Send + Sync + 'static> BoundedBuffer<T> {
    fn new(limit: usize) -> Self {
        let sentinel = ListNode::new(None);
        Self {
            limit,
            list: Mutex::new(ListPosition {
                head: Arc::clone(&sentinel),
                tail: sentinel,
                size: 0,
            }),
            done: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    fn append(&self, value: T) {
        let mut list = self.list.lock();
        let node = ListNode::new(Some(value));
        let _ = list.tail.next.set(Arc::clone(&node));
        list.tail = node;
        if list.size == self.limit {
            let next = list.head.next.get().cloned();
            if let Some(next) = next {
                list.head = next;
            }
        } else {
            list.size += 1;
        }
    }

    fn terminate(&self, error: Option<RheoError>) {
        if let Some(error) = error {
            *self.error.lock() = Some(error);
        }
        self.done.store(true, Ordering::SeqCst);
    }

    fn emit_terminal(&self, rp: &ReplaySubscription<T>) {
        if !rp.finish() {
            return;
        }
        match self.error.lock().clone() {
            Some(error) => rp.actual.on_error(error),
            None => rp.actual.on_complete(),
        }
    }

    fn current_head(&self) -> Arc<ListNode<T>> {
        Arc::clone(&self.list.lock().head)
    }

    fn drain_normal(&self, rp: &ReplaySubscription<T>) {
        let mut missed = 1u64;
        loop {
            {
                let mut cursor = rp.cursor.lock();
                let r = rp.requested.load(Ordering::SeqCst);
                let mut e = 0u64;

                let mut node = cursor.list_node(&self.current_head());

                while e != r {
                    if rp.is_cancelled() {
                        cursor.reset();
                        return;
                    }

                    let done = self.done.load(Ordering::SeqCst);
                    let next = node.next.get().cloned();

                    match next {
                        None => {
                            if done {
                                cursor.reset();
                                self.emit_terminal(rp);
                                return;
                            }
                            break;
                        }
                        Some(next) => {
                            let Some(value) = next.value.clone() else { break };
                            rp.actual.on_next(value);
                            e += 1;
                            node = next;
                        }
                    }
                }

                if e == r {
                    if rp.is_cancelled() {
                        cursor.reset();
                        return;
                    }
                    if self.done.load(Ordering::SeqCst) && node.next.get().is_none() {
                        cursor.reset();
                        self.emit_terminal(rp);
                        return;
                    }
                }

                if e != 0 && r != demand::UNBOUNDED {
                    demand::produced(&rp.requested, e);
                }

                cursor.node = Some(CursorNode::Bounded(node));
            }

            missed = rp.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn poll(&self, rp: &ReplaySubscription<T>) -> Option<T> {
        let mut cursor = rp.cursor.lock();
        let node = cursor.list_node(&self.current_head());
        let next = node.next.get().cloned()?;
        cursor.node = Some(CursorNode::Bounded(Arc::clone(&next)));
        next.value.clone()
    }

    fn is_empty(&self, rp: &ReplaySubscription<T>) -> bool {
        let mut cursor = rp.cursor.lock();
        let node = cursor.list_node(&self.current_head());
        node.next.get().is_none()
    }
}
