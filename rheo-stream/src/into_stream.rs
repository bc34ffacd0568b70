// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bridge from the demand-driven protocol to `futures::Stream`.
//!
//! The bridging subscriber requests `prefetch` values up front, forwards
//! them into a bounded channel, and replenishes demand in batches of
//! `prefetch - prefetch/4` as the stream consumer polls values out.
//! Dropping the stream cancels the subscription.

use futures::Stream;
use parking_lot::Mutex;
use rheo_core::demand;
use rheo_core::protocol::{self, Publisher, Subscriber, SubscriptionHandle};
use rheo_error::{Result, RheoError};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

enum BridgeSignal<T> {
    Item(T),
    Error(RheoError),
    Complete,
}

struct BridgeSubscriber<T> {
    tx: async_channel::Sender<BridgeSignal<T>>,
    upstream: Mutex<Option<SubscriptionHandle<T>>>,
    prefetch: u64,
}

impl<T: Send + 'static> Subscriber<T> for BridgeSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionHandle<T>) {
        if protocol::store_upstream(&self.upstream, subscription.clone()) {
            subscription.request(self.prefetch);
        }
    }

    fn on_next(&self, value: T) {
        // Capacity is prefetch + 1, so a well-behaved upstream never
        // overruns; a misbehaving one loses the value.
        let _ = self.tx.try_send(BridgeSignal::Item(value));
    }

    fn on_error(&self, error: RheoError) {
        let _ = self.tx.try_send(BridgeSignal::Error(error));
        self.tx.close();
    }

    fn on_complete(&self) {
        let _ = self.tx.try_send(BridgeSignal::Complete);
        self.tx.close();
    }
}

/// A `futures::Stream` over the values of a [`Publisher`].
///
/// Yields `Ok(value)` per value and a final `Err` if the publisher
/// terminated with an error. Created by
/// [`PublisherExt::into_stream`](crate::PublisherExt::into_stream).
pub struct PublisherStream<T> {
    rx: Pin<Box<async_channel::Receiver<BridgeSignal<T>>>>,
    bridge: Arc<BridgeSubscriber<T>>,
    limit: u64,
    consumed: u64,
    terminated: bool,
}

impl<T: Send + 'static> PublisherStream<T> {
    pub(crate) fn new<P: Publisher<T> + ?Sized>(publisher: &P, prefetch: usize) -> Self {
        assert!(prefetch > 0, "prefetch must be positive");
        let (prefetch, limit, capacity) = if prefetch == usize::MAX {
            (demand::UNBOUNDED, demand::UNBOUNDED, None)
        } else {
            let p = prefetch as u64;
            (p, p - (p >> 2), Some(prefetch + 1))
        };
        let (tx, rx) = match capacity {
            Some(capacity) => async_channel::bounded(capacity),
            None => async_channel::unbounded(),
        };
        let bridge = Arc::new(BridgeSubscriber {
            tx,
            upstream: Mutex::new(None),
            prefetch,
        });
        publisher.subscribe(bridge.clone());
        Self {
            rx: Box::pin(rx),
            bridge,
            limit,
            consumed: 0,
            terminated: false,
        }
    }
}

impl<T: Send + 'static> Stream for PublisherStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        match this.rx.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.terminated = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(BridgeSignal::Item(value))) => {
                this.consumed += 1;
                if this.consumed == this.limit {
                    protocol::request_upstream(&this.bridge.upstream, this.consumed);
                    this.consumed = 0;
                }
                Poll::Ready(Some(Ok(value)))
            }
            Poll::Ready(Some(BridgeSignal::Error(error))) => {
                this.terminated = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(BridgeSignal::Complete)) => {
                this.terminated = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T> Drop for PublisherStream<T> {
    fn drop(&mut self) {
        protocol::cancel_upstream(&self.bridge.upstream);
        self.rx.close();
    }
}
