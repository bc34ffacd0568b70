// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Internal delivery seam unifying plain and conditional downstreams.
//!
//! Operators that support both `Subscriber` and `ConditionalSubscriber`
//! downstreams run one generic emission loop over this trait; `accept`
//! reports whether the value counted against demand.

use rheo_core::{ConditionalSubscriber, Subscriber, SubscriptionHandle};
use rheo_error::RheoError;
use std::sync::Arc;

pub(crate) trait Outlet<T>: Send + Sync + 'static {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>);

    /// Deliver one value; returns whether it consumed demand.
    fn accept(&self, value: T) -> bool;

    fn on_error(&self, error: RheoError);

    fn on_complete(&self);
}

pub(crate) struct PlainOutlet<T>(pub(crate) Arc<dyn Subscriber<T>>);

impl<T: Send + 'static> Outlet<T> for PlainOutlet<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        self.0.on_subscribe(subscription);
    }

    fn accept(&self, value: T) -> bool {
        self.0.on_next(value);
        true
    }

    fn on_error(&self, error: RheoError) {
        self.0.on_error(error);
    }

    fn on_complete(&self) {
        self.0.on_complete();
    }
}

pub(crate) struct ConditionalOutlet<T>(pub(crate) Arc<dyn ConditionalSubscriber<T>>);

impl<T: Send + 'static> Outlet<T> for ConditionalOutlet<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        self.0.on_subscribe(subscription);
    }

    fn accept(&self, value: T) -> bool {
        self.0.try_on_next(value)
    }

    fn on_error(&self, error: RheoError) {
        self.0.on_error(error);
    }

    fn on_complete(&self) {
        self.0.on_complete();
    }
}
