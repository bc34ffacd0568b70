// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions)]
//! Shared test helpers for the rheo reactive streams library.

pub mod helpers;
pub mod manual_worker;
pub mod test_publisher;
pub mod test_subscriber;

pub use helpers::wait_until;
pub use manual_worker::ManualWorker;
pub use test_publisher::TestPublisher;
pub use test_subscriber::{ConditionalTestSubscriber, Signal, TestSubscriber};
