// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The external executor seam.
//!
//! Operators that cross an asynchronous boundary do not create threads; they
//! hand drain ticks to a [`Worker`] obtained from a [`WorkerFactory`]. Each
//! `schedule` call runs the task once, somewhere, later. Concrete workers
//! live in `rheo-runtime` and `rheo-test-utils`.

use std::sync::Arc;

/// A unit of work a worker can run.
pub trait Task: Send + Sync {
    /// Run the task once. Implementations are re-entrant-safe: the drain
    /// loops guard themselves with a work-in-progress counter.
    fn run(&self);
}

/// A single-slot task acceptor bound to one operator instance.
///
/// The operator may schedule any number of times; each call is one run of
/// the task. `dispose` releases whatever resources back the worker and is
/// idempotent — it is the sentinel-release of the underlying executor slot.
/// After `dispose`, further `schedule` calls are no-ops.
pub trait Worker: Send + Sync {
    /// Arrange for `task.run()` to be invoked once.
    fn schedule(&self, task: Arc<dyn Task>);

    /// Release the worker. Idempotent.
    fn dispose(&self);
}

/// Factory producing one fresh [`Worker`] per subscription.
pub type WorkerFactory = Arc<dyn Fn() -> Arc<dyn Worker> + Send + Sync>;
