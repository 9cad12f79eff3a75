//! Terminal subscribers.

use crate::publisher::{Cancellable, Completion, Demand, Subscriber, SubscriptionHandle};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Upstream {
    subscription: Option<SubscriptionHandle>,
    cancelled: bool,
}

/// Connects a terminal subscriber to the [`Cancellable`] handed to its
/// owner.
///
/// Cancelling before the subscription arrives cancels it on arrival.
#[derive(Clone, Default)]
pub(crate) struct UpstreamLink {
    inner: Arc<Mutex<Upstream>>,
}

impl UpstreamLink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `subscription` and requests `demand` from it.
    pub(crate) fn connect(&self, subscription: SubscriptionHandle, demand: Demand) {
        {
            let mut upstream = self.inner.lock();
            if !upstream.cancelled {
                upstream.subscription = Some(subscription.clone());
                drop(upstream);
                subscription.request(demand);
                return;
            }
        }
        subscription.cancel();
    }

    /// Forgets the subscription once the stream has terminated.
    pub(crate) fn disconnect(&self) {
        let subscription = self.inner.lock().subscription.take();
        drop(subscription);
    }

    pub(crate) fn cancellable(&self) -> Cancellable {
        let inner = self.inner.clone();
        Cancellable::new(move || {
            let subscription = {
                let mut upstream = inner.lock();
                upstream.cancelled = true;
                upstream.subscription.take()
            };
            if let Some(subscription) = subscription {
                subscription.cancel();
            }
        })
    }
}

/// Subscriber calling closures, created by
/// [`PublisherExt::sink`](crate::PublisherExt::sink).
pub(crate) struct Sink<T> {
    link: UpstreamLink,
    on_value: Box<dyn FnMut(T) + Send>,
    on_completion: Option<Box<dyn FnOnce(Completion) + Send>>,
}

impl<T> Sink<T> {
    pub(crate) fn new<V, C>(link: UpstreamLink, on_value: V, on_completion: C) -> Self
    where
        V: FnMut(T) + Send + 'static,
        C: FnOnce(Completion) + Send + 'static,
    {
        Self {
            link,
            on_value: Box::new(on_value),
            on_completion: Some(Box::new(on_completion)),
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for Sink<T> {
    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.link.connect(subscription, Demand::Unlimited);
    }

    fn receive(&mut self, value: T) -> Demand {
        (self.on_value)(value);
        Demand::NONE
    }

    fn receive_completion(&mut self, completion: Completion) {
        self.link.disconnect();
        if let Some(on_completion) = self.on_completion.take() {
            on_completion(completion);
        }
    }
}
