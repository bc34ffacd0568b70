// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Capability negotiation between adjacent operators.
//!
//! Fusion lets a downstream operator pull items straight out of its upstream
//! through a queue face, bypassing the per-item `request`/`on_next`
//! round-trip. The handshake is a single call to
//! [`QueueSubscription::request_fusion`] made from `on_subscribe`.

use crate::protocol::Subscription;
use rheo_error::Result;

/// The negotiated fusion mode between two adjacent operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    /// No fusion; the classical signal exchange is used.
    None,
    /// The upstream queue is known-terminating: draining it to empty equals
    /// completion, and no separate terminal arrives through the queue face.
    Sync,
    /// Items appear in the queue asynchronously; availability is signalled
    /// through [`Subscriber::on_pollable`] and completion through a separate
    /// terminal.
    ///
    /// [`Subscriber::on_pollable`]: crate::protocol::Subscriber::on_pollable
    Async,
    /// Request-side wildcard: the consumer accepts whichever mode the
    /// producer can offer. Never returned from a negotiation.
    Any,
}

impl FusionMode {
    /// Whether a producer offering `offered` satisfies this requested mode.
    #[must_use]
    pub const fn accepts(self, offered: FusionMode) -> bool {
        matches!(
            (self, offered),
            (FusionMode::Any, _)
                | (FusionMode::Sync, FusionMode::Sync)
                | (FusionMode::Async, FusionMode::Async)
        )
    }
}

/// A subscription that additionally exposes a pull-queue face.
///
/// The queue face may only be used after [`request_fusion`] returned a mode
/// other than [`FusionMode::None`], and only by the single negotiated
/// consumer. In `Sync` mode `poll() == Ok(None)` is completion; in `Async`
/// mode completion arrives separately and `Ok(None)` merely means
/// "currently empty".
///
/// [`request_fusion`]: QueueSubscription::request_fusion
pub trait QueueSubscription<T>: Subscription {
    /// Negotiate a fusion mode. `requested` is what the consumer can handle
    /// ([`FusionMode::Any`] for either); the return value is what the
    /// producer grants, possibly [`FusionMode::None`].
    fn request_fusion(&self, requested: FusionMode) -> FusionMode;

    /// Pull the next item. `Ok(None)` means empty; an error is a failing
    /// source element and terminates the stream.
    fn poll(&self) -> Result<Option<T>>;

    /// Whether a `poll` would currently return `Ok(None)`.
    fn is_empty(&self) -> bool;

    /// Drop all remaining items. Idempotent; used on cancellation.
    fn clear(&self);
}
