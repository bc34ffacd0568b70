// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions)]
//! Core operators of the rheo reactive streams library.
//!
//! Every operator speaks the demand-driven protocol defined in `rheo-core`:
//! downstream requests `n` values, the operator translates that into
//! upstream demand, applies its transformation and re-emits under its own
//! demand discipline.
//!
//! - [`from_iter`] / [`from_values`] — synchronous iterator source with a
//!   sync-fused queue face.
//! - [`ObserveOn`] — asynchronous boundary onto a worker, with prefetch and
//!   optional delayed errors.
//! - [`ReplayProcessor`] — hot multicast replaying all or the last N values.
//! - [`Window`] — exact, skip or overlapping windows over an inner
//!   [`UnicastProcessor`].
//! - [`Never`] — the silent publisher.
//! - [`PublisherExt`] — fluent composition plus the bridge into
//!   `futures::Stream`.

pub mod from_iter;
pub mod into_stream;
pub mod never;
pub mod observe_on;
mod outlet;
pub mod replay;
pub mod unicast;
pub mod window;

pub use from_iter::{from_iter, from_values, FromIter};
pub use into_stream::PublisherStream;
pub use never::Never;
pub use observe_on::ObserveOn;
pub use replay::ReplayProcessor;
pub use unicast::UnicastProcessor;
pub use window::Window;

use rheo_core::executor::WorkerFactory;
use rheo_core::protocol::Publisher;

/// Fluent extension methods over any [`Publisher`].
pub trait PublisherExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Re-emit this publisher's signals on a worker from `worker_factory`.
    ///
    /// See [`ObserveOn::new`] for the parameter contract.
    fn observe_on(
        self,
        worker_factory: WorkerFactory,
        delay_error: bool,
        prefetch: usize,
    ) -> ObserveOn<Self> {
        ObserveOn::new(self, worker_factory, delay_error, prefetch)
    }

    /// Split this publisher into back-to-back windows of `size` values.
    fn window(self, size: usize) -> Window<Self> {
        Window::exact(self, size)
    }

    /// Split this publisher into windows of `size` values, opening a new
    /// window every `skip` values.
    fn window_with_skip(self, size: usize, skip: usize) -> Window<Self> {
        Window::with_skip(self, size, skip)
    }

    /// Bridge this publisher into a `futures::Stream` with the given
    /// prefetch.
    ///
    /// # Panics
    ///
    /// Panics if `prefetch` is 0.
    fn into_stream(self, prefetch: usize) -> PublisherStream<T> {
        PublisherStream::new(&self, prefetch)
    }
}

impl<T, P> PublisherExt<T> for P
where
    P: Publisher<T> + Sized,
    T: Send + 'static,
{
}
