// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A publisher that never signals anything after `on_subscribe`.

use rheo_core::protocol::{EmptySubscription, Publisher, Subscriber};
use std::sync::Arc;

/// Publisher that only delivers `on_subscribe` and then stays silent
/// forever. Useful as a neutral element in tests and compositions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl<T: Send + 'static> Publisher<T> for Never {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(EmptySubscription::handle());
    }
}
