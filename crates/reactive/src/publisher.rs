//! The publisher protocol.
//!
//! A [`Publisher`] hands each [`Subscriber`] a [`Subscription`]. Nothing is
//! produced until the subscriber requests demand through it, and nothing is
//! produced after the subscription is cancelled. A subscriber receives at
//! most one completion, after which it receives nothing else.

use core::fmt;
use eddy_core::Error;
use std::sync::Arc;

/// Number of values a subscriber is willing to receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Demand {
    /// No limit.
    Unlimited,
    /// At most this many more values.
    Max(usize),
}

impl Demand {
    /// No additional demand.
    pub const NONE: Demand = Demand::Max(0);

    /// Returns true if the demand allows no values.
    #[inline]
    pub fn is_none(&self) -> bool {
        *self == Demand::NONE
    }
}

/// How a stream terminated.
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    /// The stream ended normally.
    Finished,
    /// The stream ended with an error.
    Failure(Error),
}

impl Completion {
    /// Returns the error of a failed stream.
    pub fn error(&self) -> Option<&Error> {
        match self {
            Completion::Finished => None,
            Completion::Failure(err) => Some(err),
        }
    }
}

/// Control handle a publisher gives to its subscriber.
pub trait Subscription: Send + Sync {
    /// Signals demand. The first request with non-zero demand activates the
    /// underlying source.
    fn request(&self, demand: Demand);

    /// Stops the stream and releases the underlying source.
    fn cancel(&self);
}

/// Shared subscription handle.
pub type SubscriptionHandle = Arc<dyn Subscription>;

/// Receives the events of one subscription, in order.
pub trait Subscriber<T>: Send + 'static {
    /// Called once, before any value.
    fn receive_subscription(&mut self, subscription: SubscriptionHandle);

    /// Called for each value. Returns additional demand.
    fn receive(&mut self, value: T) -> Demand;

    /// Called at most once, after the last value.
    fn receive_completion(&mut self, completion: Completion);
}

/// A source of values that subscribers attach to.
pub trait Publisher {
    /// Value type produced.
    type Output: Send + 'static;

    /// Attaches `subscriber`.
    fn subscribe(&self, subscriber: Box<dyn Subscriber<Self::Output>>);
}

/// Cancels a subscription when cancelled explicitly or dropped.
#[must_use = "the subscription is cancelled when the Cancellable is dropped"]
pub struct Cancellable {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Cancellable {
    /// Creates a cancellable running `cancel` once.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancels the subscription.
    pub fn cancel(mut self) {
        self.run();
    }

    /// Moves the cancellable into `bag`, tying its lifetime to the bag.
    pub fn store_in(self, bag: &mut Vec<Cancellable>) {
        bag.push(self);
    }

    fn run(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Cancellable {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
