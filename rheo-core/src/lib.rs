// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions)]
//! Protocol primitives for the rheo reactive streams library.
//!
//! This crate defines the demand-driven publish/subscribe contract every
//! rheo operator obeys: the [`Publisher`] / [`Subscriber`] / [`Subscription`]
//! traits, the fusion extension ([`QueueSubscription`], [`FusionMode`]),
//! saturating demand accounting ([`demand`]), the single-producer
//! single-consumer ring queue operators hand items through ([`SpscRing`]),
//! the external executor seam ([`Worker`], [`Task`]) and the late-signal
//! drop hooks ([`hooks`]).
//!
//! The contract, in short:
//!
//! 1. A subscriber receives exactly one `on_subscribe`, then zero or more
//!    `on_next` strictly bounded by its outstanding demand, then at most one
//!    terminal (`on_error` or `on_complete`). Nothing follows a terminal.
//! 2. `request(0)` is a protocol violation answered with
//!    [`RheoError::BadRequest`](rheo_error::RheoError::BadRequest).
//!    Positive demand accumulates with saturating addition;
//!    [`demand::UNBOUNDED`] means "no limit".
//! 3. `cancel` is idempotent and observable from any thread.

pub mod demand;
pub mod executor;
pub mod fusion;
pub mod hooks;
pub mod protocol;
pub mod queue;
pub mod spsc;

pub use executor::{Task, Worker, WorkerFactory};
pub use fusion::{FusionMode, QueueSubscription};
pub use protocol::{
    ConditionalSubscriber, EmptySubscription, Publisher, Subscriber, Subscription,
    SubscriptionHandle,
};
pub use queue::ItemQueue;
pub use rheo_error::{Result, RheoError};
pub use spsc::SpscRing;
