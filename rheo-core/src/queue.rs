// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The bounded queue face operators hand items through.

/// A bounded queue with non-blocking offer/poll semantics.
///
/// Implementations choose their own concurrency class; the one shipped with
/// this crate ([`SpscRing`](crate::spsc::SpscRing)) is single-producer
/// single-consumer, which matches how the operators use it: the upstream
/// thread offers, the drain owner polls.
pub trait ItemQueue<T>: Send + Sync {
    /// Enqueue `value`, handing it back if the queue is full.
    fn offer(&self, value: T) -> Result<(), T>;

    /// Dequeue the oldest value, or `None` if the queue is empty.
    fn poll(&self) -> Option<T>;

    /// Whether a `poll` would currently return `None`.
    fn is_empty(&self) -> bool;

    /// Drop all queued values. May only be called from the consumer side.
    fn clear(&self);
}
