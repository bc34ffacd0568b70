// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions)]
//! Worker implementations for the rheo reactive streams library.
//!
//! Operators never create threads; they hand drain ticks to a
//! [`Worker`](rheo_core::Worker). This crate provides the two stock
//! implementations: [`TokioWorker`] runs ticks as Tokio tasks and
//! [`ImmediateWorker`] trampolines them on the calling thread.

mod immediate;
mod tokio_worker;

pub use immediate::{immediate_factory, ImmediateWorker};
pub use tokio_worker::{tokio_factory, TokioWorker};
