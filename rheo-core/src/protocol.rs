// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The subscriber/subscription contract shared by every operator.

use crate::fusion::QueueSubscription;
use crate::hooks;
use parking_lot::Mutex;
use rheo_error::RheoError;
use std::sync::Arc;

/// A producer of a bounded or unbounded sequence of values.
///
/// `subscribe` wires a [`Subscriber`] to this publisher. The publisher must
/// deliver `on_subscribe` exactly once before any other signal.
pub trait Publisher<T>: Send + Sync {
    /// Attach `subscriber` to this publisher and start the signal exchange.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

impl<T, P> Publisher<T> for Arc<P>
where
    P: Publisher<T> + ?Sized,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        (**self).subscribe(subscriber);
    }
}

/// A consumer of the four stream signals.
///
/// Signal order per the protocol: exactly one `on_subscribe`, then zero or
/// more `on_next` bounded by outstanding demand, then at most one terminal.
/// After a terminal no further signal fires; late signals are routed to the
/// [`hooks`] module by well-behaved producers.
pub trait Subscriber<T>: Send + Sync {
    /// Receives the subscription handle. Demand must be signalled through it
    /// before any `on_next` arrives.
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>);

    /// Receives one value. Producers never call this beyond outstanding demand.
    fn on_next(&self, value: T);

    /// Fused-mode availability signal: the upstream queue holds at least one
    /// pollable item.
    ///
    /// Only subscribers that negotiated [`FusionMode::Async`]
    /// (via [`QueueSubscription::request_fusion`]) receive this; they react by
    /// polling the fused subscription instead of waiting for `on_next`.
    ///
    /// [`FusionMode::Async`]: crate::fusion::FusionMode::Async
    fn on_pollable(&self) {}

    /// Terminal: the stream failed. No signal may follow.
    fn on_error(&self, error: RheoError);

    /// Terminal: the stream completed normally. No signal may follow.
    fn on_complete(&self);
}

/// A subscriber that can refuse individual values.
///
/// `try_on_next` returning `false` means "not consumed": the value does not
/// count against outstanding demand and the producer may immediately offer
/// the next one. Used to fuse with filtering upstreams without a request
/// round-trip per dropped value.
pub trait ConditionalSubscriber<T>: Subscriber<T> {
    /// Offer one value; returns whether it was consumed.
    fn try_on_next(&self, value: T) -> bool;
}

/// The handle a producer hands to its consumer.
///
/// Carries the consumer's outstanding demand and the cancelled flag on the
/// producer side; the consumer drives both through `request` and `cancel`.
pub trait Subscription: Send + Sync {
    /// Add `n` to outstanding demand. `n == 0` is a protocol violation and
    /// is answered with an `on_error(RheoError::BadRequest)` instead of being
    /// counted. Demand saturates at [`demand::UNBOUNDED`](crate::demand::UNBOUNDED).
    fn request(&self, n: u64);

    /// Cancel the subscription. Idempotent; callable from any thread. After
    /// the producer observes cancellation, at most one in-flight `on_next`
    /// may still arrive and no terminal is delivered.
    fn cancel(&self);
}

/// The capability set a producer exposes, delivered through `on_subscribe`.
///
/// A plain subscription only carries demand and cancellation; a fused one
/// additionally exposes the pull-queue face used for operator fusion.
pub enum SubscriptionHandle<T> {
    /// Demand and cancellation only.
    Plain(Arc<dyn Subscription>),
    /// Demand, cancellation and a negotiable pull-queue face.
    Fused(Arc<dyn QueueSubscription<T>>),
}

impl<T> Clone for SubscriptionHandle<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(s) => Self::Plain(Arc::clone(s)),
            Self::Fused(s) => Self::Fused(Arc::clone(s)),
        }
    }
}

impl<T> SubscriptionHandle<T> {
    /// Forward `request` to whichever face is present.
    pub fn request(&self, n: u64) {
        match self {
            Self::Plain(s) => s.request(n),
            Self::Fused(s) => s.request(n),
        }
    }

    /// Forward `cancel` to whichever face is present.
    pub fn cancel(&self) {
        match self {
            Self::Plain(s) => s.cancel(),
            Self::Fused(s) => s.cancel(),
        }
    }

    /// Returns the pull-queue face, if the producer offers one.
    pub fn fused(&self) -> Option<&Arc<dyn QueueSubscription<T>>> {
        match self {
            Self::Plain(_) => None,
            Self::Fused(s) => Some(s),
        }
    }
}

/// Store an incoming upstream handle into `slot`, enforcing the
/// at-most-one-subscription rule.
///
/// Returns `true` if the handle was stored. A second subscription is
/// cancelled without touching the first and reported to the drop hooks.
pub fn store_upstream<T>(
    slot: &Mutex<Option<SubscriptionHandle<T>>>,
    incoming: SubscriptionHandle<T>,
) -> bool {
    {
        let mut guard = slot.lock();
        if guard.is_none() {
            *guard = Some(incoming);
            return true;
        }
    }
    incoming.cancel();
    hooks::subscription_dropped();
    false
}

/// Issue `request(n)` through a stored upstream handle, if one is present.
pub fn request_upstream<T>(slot: &Mutex<Option<SubscriptionHandle<T>>>, n: u64) {
    let upstream = slot.lock().clone();
    if let Some(up) = upstream {
        up.request(n);
    }
}

/// Cancel a stored upstream handle, if one is present.
pub fn cancel_upstream<T>(slot: &Mutex<Option<SubscriptionHandle<T>>>) {
    let upstream = slot.lock().take();
    if let Some(up) = upstream {
        up.cancel();
    }
}

/// The do-nothing subscription used when a terminal must be delivered before
/// any real producer state exists.
///
/// `on_subscribe(EmptySubscription)` followed immediately by a terminal is
/// the protocol-conforming way to reject or complete a subscriber eagerly.
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

impl EmptySubscription {
    /// A fresh plain handle around the empty subscription.
    pub fn handle<T>() -> SubscriptionHandle<T> {
        SubscriptionHandle::Plain(Arc::new(Self))
    }

    /// Deliver `on_subscribe` + `on_error` to a subscriber that never got a
    /// real subscription.
    pub fn error<T>(subscriber: &dyn Subscriber<T>, error: RheoError) {
        subscriber.on_subscribe(Self::handle());
        subscriber.on_error(error);
    }

    /// Deliver `on_subscribe` + `on_complete` to a subscriber that never got
    /// a real subscription.
    pub fn complete<T>(subscriber: &dyn Subscriber<T>) {
        subscriber.on_subscribe(Self::handle());
        subscriber.on_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingSubscription {
        cancels: AtomicU64,
    }

    impl Subscription for CountingSubscription {
        fn request(&self, _n: u64) {}

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn second_subscription_is_cancelled() {
        let slot = Mutex::new(None);
        let first = Arc::new(CountingSubscription {
            cancels: AtomicU64::new(0),
        });
        let second = Arc::new(CountingSubscription {
            cancels: AtomicU64::new(0),
        });

        assert!(store_upstream(
            &slot,
            SubscriptionHandle::<u32>::Plain(first.clone())
        ));
        assert!(!store_upstream(
            &slot,
            SubscriptionHandle::<u32>::Plain(second.clone())
        ));

        assert_eq!(first.cancels.load(Ordering::SeqCst), 0);
        assert_eq!(second.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_upstream_takes_the_slot() {
        let sub = Arc::new(CountingSubscription {
            cancels: AtomicU64::new(0),
        });
        let slot = Mutex::new(Some(SubscriptionHandle::<u32>::Plain(sub.clone())));

        cancel_upstream(&slot);
        cancel_upstream(&slot);

        assert_eq!(sub.cancels.load(Ordering::SeqCst), 1);
        assert!(slot.lock().is_none());
    }
}
