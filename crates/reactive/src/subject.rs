//! Publishers driven by the caller.
//!
//! `Just` emits one value and finishes. `PassthroughSubject` broadcasts
//! values sent to it to every subscriber that has requested demand.

use crate::publisher::{Completion, Demand, Publisher, Subscriber, Subscription};
use crate::relay::Relay;
use eddy_core::{Error, NotificationToken};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Unique identifier for a subject subscriber.
pub type SubscriptionId = u64;

/// Emits a single value, then finishes.
#[derive(Clone, Debug)]
pub struct Just<T> {
    value: T,
}

impl<T> Just<T> {
    /// Creates a publisher emitting `value`.
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Clone + Send + 'static> Publisher for Just<T> {
    type Output = T;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let relay = Relay::new(subscriber);
        relay.start(Arc::new(JustSubscription {
            relay: relay.clone(),
            value: Mutex::new(Some(self.value.clone())),
        }));
    }
}

struct JustSubscription<T> {
    relay: Arc<Relay<T>>,
    value: Mutex<Option<T>>,
}

impl<T: Send + 'static> Subscription for JustSubscription<T> {
    fn request(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        if let Some(mark) = self.relay.begin_activation() {
            self.relay
                .finish_activation(mark, None, Ok(NotificationToken::noop()));
            if let Some(value) = self.value.lock().take() {
                self.relay.send(value);
            }
            self.relay.complete(Completion::Finished);
        }
    }

    fn cancel(&self) {
        self.relay.cancel();
    }
}

struct SubjectState<T> {
    /// Subscribers, keyed by subscription id.
    subscribers: HashMap<SubscriptionId, Arc<Relay<T>>>,
    /// Next subscription id to assign.
    next_id: SubscriptionId,
    /// Set once the subject has completed.
    completion: Option<Completion>,
}

/// Broadcasts values to its current subscribers.
///
/// Values sent before a subscriber requests demand are not replayed to it.
/// Subscribers attaching after completion receive the completion
/// immediately.
pub struct PassthroughSubject<T> {
    state: Arc<Mutex<SubjectState<T>>>,
}

impl<T> Clone for PassthroughSubject<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for PassthroughSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> PassthroughSubject<T> {
    /// Creates a subject with no subscribers.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                subscribers: HashMap::new(),
                next_id: 1,
                completion: None,
            })),
        }
    }

    /// Sends `value` to every subscriber.
    pub fn send(&self, value: T) {
        let relays: Vec<Arc<Relay<T>>> = {
            let state = self.state.lock();
            if state.completion.is_some() {
                return;
            }
            let mut ids: Vec<_> = state.subscribers.keys().copied().collect();
            ids.sort_unstable();
            ids.iter()
                .filter_map(|id| state.subscribers.get(id).cloned())
                .collect()
        };
        for relay in relays {
            relay.send(value.clone());
        }
    }

    /// Finishes every subscriber.
    pub fn finish(&self) {
        self.complete(Completion::Finished);
    }

    /// Fails every subscriber with `error`.
    pub fn fail(&self, error: Error) {
        self.complete(Completion::Failure(error));
    }

    fn complete(&self, completion: Completion) {
        let relays: Vec<Arc<Relay<T>>> = {
            let mut state = self.state.lock();
            if state.completion.is_some() {
                return;
            }
            state.completion = Some(completion.clone());
            state.subscribers.drain().map(|(_, relay)| relay).collect()
        };
        for relay in relays {
            relay.complete(completion.clone());
        }
    }

    /// Returns the number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|_, relay| !relay.is_terminated());
        state.subscribers.len()
    }
}

impl<T: Clone + Send + 'static> Publisher for PassthroughSubject<T> {
    type Output = T;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let relay = Relay::new(subscriber);
        let (id, completion) = {
            let mut state = self.state.lock();
            match state.completion.clone() {
                Some(completion) => (None, Some(completion)),
                None => {
                    let id = state.next_id;
                    state.next_id += 1;
                    state.subscribers.insert(id, relay.clone());
                    (Some(id), None)
                }
            }
        };
        relay.start(Arc::new(SubjectSubscription {
            relay: relay.clone(),
            id,
            subject: Arc::downgrade(&self.state),
        }));
        if let Some(completion) = completion {
            relay.complete(completion);
        }
    }
}

struct SubjectSubscription<T> {
    relay: Arc<Relay<T>>,
    id: Option<SubscriptionId>,
    subject: Weak<Mutex<SubjectState<T>>>,
}

impl<T: Send + 'static> Subscription for SubjectSubscription<T> {
    fn request(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        if let Some(mark) = self.relay.begin_activation() {
            self.relay
                .finish_activation(mark, None, Ok(NotificationToken::noop()));
        }
    }

    fn cancel(&self) {
        if let (Some(id), Some(subject)) = (self.id, self.subject.upgrade()) {
            let removed = subject.lock().subscribers.remove(&id);
            drop(removed);
        }
        self.relay.cancel();
    }
}
