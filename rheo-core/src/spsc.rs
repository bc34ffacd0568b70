// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A fixed-capacity single-producer single-consumer ring queue.
//!
//! This is the queue the observe-on boundary and the unicast window
//! processors move items through. It stores elements in
//! `UnsafeCell<Option<T>>` slots indexed by two monotonically increasing
//! cursors; a power-of-two capacity turns the modulo into a mask.
//!
//! All safety relies on the cursors: the producer only writes the slot at
//! `tail` after checking it is free, publishes it with a release store, and
//! the consumer only reads a slot after an acquire load of `tail` covers it.

use crate::queue::ItemQueue;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A bounded SPSC ring queue.
///
/// Capacity is rounded up to the next power of two and is at least 2.
///
/// # Safety
///
/// `Send`/`Sync` are implemented unsafely under these conventions:
///
/// 1. At most one thread offers at a time and at most one thread polls at a
///    time. The operators guarantee this: only the upstream thread offers
///    and only the current drain owner polls.
/// 2. A slot is written only between the free-check and the release store of
///    `tail`, and read only after an acquire load of `tail` covers it, so
///    producer and consumer never touch the same slot concurrently.
pub struct SpscRing<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: see the type-level safety conventions above.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a ring with room for at least `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        let capacity = capacity.next_power_of_two().max(2);
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// The rounded-up capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T: Send> ItemQueue<T> for SpscRing<T> {
    fn offer(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) == self.capacity() {
            return Err(value);
        }
        // SAFETY: the slot at `tail` is outside the occupied window, so the
        // consumer will not read it until the release store below.
        unsafe {
            *self.slots[tail & self.mask].get() = Some(value);
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    fn poll(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        // SAFETY: `head < tail` means the producer published this slot and
        // will not touch it again until `head` passes it.
        let value = unsafe { (*self.slots[head & self.mask].get()).take() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        value
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    fn clear(&self) {
        while self.poll().is_some() {}
    }
}
