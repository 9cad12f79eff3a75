//! Adapter from callback registration to a demand-driven publisher.
//!
//! An [`ObservableBridge`] wraps a registration closure. Each subscriber gets
//! its own registration, made lazily on its first non-zero demand and
//! released when the stream terminates or is cancelled.

use crate::publisher::{Demand, Publisher, Subscriber, Subscription};
use crate::relay::{Emitter, Relay};
use eddy_core::{NotificationToken, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Registers a source callback that forwards into an [`Emitter`].
pub type Register<T> = dyn Fn(Emitter<T>) -> Result<NotificationToken> + Send + Sync;

/// A publisher backed by a callback registration.
pub struct ObservableBridge<T> {
    initial: Option<T>,
    register: Arc<Register<T>>,
}

impl<T: Clone> Clone for ObservableBridge<T> {
    fn clone(&self) -> Self {
        Self {
            initial: self.initial.clone(),
            register: self.register.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ObservableBridge<T> {
    /// Creates a bridge.
    ///
    /// When `initial` is set, each subscriber receives it first, ahead of
    /// anything the source emits while its registration is being made.
    pub fn new<F>(initial: Option<T>, register: F) -> Self
    where
        F: Fn(Emitter<T>) -> Result<NotificationToken> + Send + Sync + 'static,
    {
        Self {
            initial,
            register: Arc::new(register),
        }
    }
}

impl<T: Clone + Send + 'static> Publisher for ObservableBridge<T> {
    type Output = T;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let relay = Relay::new(subscriber);
        relay.start(Arc::new(BridgeSubscription {
            relay: relay.clone(),
            initial: Mutex::new(self.initial.clone()),
            register: self.register.clone(),
        }));
    }
}

struct BridgeSubscription<T> {
    relay: Arc<Relay<T>>,
    initial: Mutex<Option<T>>,
    register: Arc<Register<T>>,
}

impl<T: Send + 'static> Subscription for BridgeSubscription<T> {
    fn request(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        let Some(mark) = self.relay.begin_activation() else {
            return;
        };
        trace!("registering source for first demand");
        let initial = self.initial.lock().take();
        let registration = (self.register)(Emitter::new(self.relay.clone()));
        self.relay.finish_activation(mark, initial, registration);
    }

    fn cancel(&self) {
        self.relay.cancel();
    }
}
