//! Serialized delivery to one subscriber.
//!
//! A relay owns the subscriber of one subscription. Events may be produced
//! from any thread, and from inside the subscriber's own callbacks; they are
//! queued and handed to the subscriber one at a time, in order, by whichever
//! thread is draining. The relay lock is never held while the subscriber
//! runs. Cancelling from another thread waits for a callback in flight to
//! return, so nothing reaches the subscriber once `cancel` has returned.

use crate::publisher::{Completion, Subscriber, SubscriptionHandle};
use eddy_core::{Error, NotificationToken, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::trace;

enum Signal<T> {
    Subscribe(SubscriptionHandle),
    Value(T),
    Complete(Completion),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Subscribed, no demand yet.
    Idle,
    /// Demand received, values flow.
    Active,
    /// A completion is queued.
    Closing,
    /// The completion was delivered.
    Finished,
    Cancelled,
}

impl Phase {
    #[inline]
    fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Cancelled)
    }
}

struct Slot<T> {
    /// `None` while a drainer is calling into it, or once terminated.
    subscriber: Option<Box<dyn Subscriber<T>>>,
    pending: VecDeque<Signal<T>>,
    phase: Phase,
    /// A thread is delivering pending events.
    draining: bool,
    /// Thread currently inside a subscriber callback.
    delivering: Option<ThreadId>,
    /// The source is being registered; events queue until it finishes.
    activating: bool,
    /// Registration with the underlying source.
    token: Option<NotificationToken>,
}

pub(crate) struct Relay<T> {
    slot: Mutex<Slot<T>>,
    /// Signalled whenever a callback returns.
    returned: Condvar,
}

impl<T: Send + 'static> Relay<T> {
    pub(crate) fn new(subscriber: Box<dyn Subscriber<T>>) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                subscriber: Some(subscriber),
                pending: VecDeque::new(),
                phase: Phase::Idle,
                draining: false,
                delivering: None,
                activating: false,
                token: None,
            }),
            returned: Condvar::new(),
        })
    }

    /// Hands the subscription to the subscriber.
    pub(crate) fn start(&self, subscription: SubscriptionHandle) {
        self.slot
            .lock()
            .pending
            .push_back(Signal::Subscribe(subscription));
        self.drain();
    }

    /// Moves an idle relay to active and returns the queue position where a
    /// synthetic initial value belongs. Returns `None` if the relay was
    /// already activated or terminated.
    pub(crate) fn begin_activation(&self) -> Option<usize> {
        let mut slot = self.slot.lock();
        if slot.phase != Phase::Idle {
            return None;
        }
        slot.phase = Phase::Active;
        slot.activating = true;
        Some(slot.pending.len())
    }

    /// Completes activation with the outcome of registering the source.
    ///
    /// On success the token is kept until the stream terminates and
    /// `initial`, if any, is placed ahead of every value the source produced
    /// during registration. On failure the stream fails with the error.
    pub(crate) fn finish_activation(
        &self,
        mark: usize,
        initial: Option<T>,
        registration: Result<NotificationToken>,
    ) {
        let mut release = None;
        {
            let mut slot = self.slot.lock();
            slot.activating = false;
            match registration {
                Ok(token) => {
                    if !slot.phase.is_terminal() {
                        if let Some(value) = initial {
                            let at = mark.min(slot.pending.len());
                            slot.pending.insert(at, Signal::Value(value));
                        }
                    }
                    if slot.phase == Phase::Active {
                        slot.token = Some(token);
                    } else {
                        release = Some(token);
                    }
                }
                Err(err) => {
                    trace!(error = %err, "source registration failed");
                    if slot.phase == Phase::Active {
                        slot.phase = Phase::Closing;
                        slot.pending
                            .push_back(Signal::Complete(Completion::Failure(err)));
                    }
                }
            }
        }
        if let Some(mut token) = release {
            token.invalidate();
        }
        self.drain();
    }

    /// Queues a value. Dropped unless the relay is active.
    pub(crate) fn send(&self, value: T) -> bool {
        {
            let mut slot = self.slot.lock();
            if slot.phase != Phase::Active {
                return false;
            }
            slot.pending.push_back(Signal::Value(value));
        }
        self.drain();
        true
    }

    /// Queues the completion and releases the source registration.
    pub(crate) fn complete(&self, completion: Completion) {
        let token = {
            let mut slot = self.slot.lock();
            if !matches!(slot.phase, Phase::Idle | Phase::Active) {
                return;
            }
            slot.phase = Phase::Closing;
            slot.pending.push_back(Signal::Complete(completion));
            slot.token.take()
        };
        if let Some(mut token) = token {
            token.invalidate();
        }
        self.drain();
    }

    /// Stops delivery and releases the source registration.
    ///
    /// When another thread is inside a subscriber callback, waits for it to
    /// return. Cancelling from within a callback does not wait.
    pub(crate) fn cancel(&self) {
        let current = thread::current().id();
        let (token, subscriber, pending) = {
            let mut slot = self.slot.lock();
            if slot.phase.is_terminal() {
                return;
            }
            slot.phase = Phase::Cancelled;
            let taken = (
                slot.token.take(),
                slot.subscriber.take(),
                std::mem::take(&mut slot.pending),
            );
            while slot.delivering.is_some_and(|id| id != current) {
                self.returned.wait(&mut slot);
            }
            taken
        };
        // Dropped outside the lock; the subscriber may cancel other streams
        drop(pending);
        drop(subscriber);
        if let Some(mut token) = token {
            token.invalidate();
        }
        trace!("subscription cancelled");
    }

    /// Returns true once the stream finished or was cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        self.slot.lock().phase.is_terminal()
    }

    fn drain(&self) {
        {
            let mut slot = self.slot.lock();
            if slot.draining || slot.activating {
                return;
            }
            slot.draining = true;
        }

        let current = thread::current().id();
        let mut returned: Option<Box<dyn Subscriber<T>>> = None;
        loop {
            let mut retired = None;
            let step = {
                let mut slot = self.slot.lock();
                if let Some(subscriber) = returned.take() {
                    slot.delivering = None;
                    self.returned.notify_all();
                    if slot.phase.is_terminal() {
                        retired = Some(subscriber);
                    } else {
                        slot.subscriber = Some(subscriber);
                    }
                }
                if slot.activating {
                    // The activating thread drains once registration is done
                    slot.draining = false;
                    None
                } else {
                    match slot.subscriber.take() {
                        None => {
                            slot.pending.clear();
                            slot.draining = false;
                            None
                        }
                        Some(subscriber) => match slot.pending.pop_front() {
                            Some(signal) => {
                                slot.delivering = Some(current);
                                Some((subscriber, signal))
                            }
                            None => {
                                slot.subscriber = Some(subscriber);
                                slot.draining = false;
                                None
                            }
                        },
                    }
                }
            };
            drop(retired);

            let Some((mut subscriber, signal)) = step else {
                return;
            };
            match signal {
                Signal::Subscribe(subscription) => subscriber.receive_subscription(subscription),
                Signal::Value(value) => {
                    subscriber.receive(value);
                }
                Signal::Complete(completion) => {
                    {
                        let mut slot = self.slot.lock();
                        if slot.phase != Phase::Cancelled {
                            slot.phase = Phase::Finished;
                        }
                    }
                    subscriber.receive_completion(completion);
                }
            }
            returned = Some(subscriber);
        }
    }
}

/// Forwards source events into one subscription.
///
/// Handed to the registration closure of an
/// [`ObservableBridge`](crate::ObservableBridge).
pub struct Emitter<T> {
    relay: Arc<Relay<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            relay: self.relay.clone(),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    pub(crate) fn new(relay: Arc<Relay<T>>) -> Self {
        Self { relay }
    }

    /// Emits a value. Returns false if the stream no longer accepts values.
    pub fn send(&self, value: T) -> bool {
        self.relay.send(value)
    }

    /// Terminates the stream with `error` and releases the registration.
    pub fn fail(&self, error: Error) {
        self.relay.complete(Completion::Failure(error));
    }

    /// Terminates the stream normally and releases the registration.
    pub fn finish(&self) {
        self.relay.complete(Completion::Finished);
    }

    /// Returns true once the stream finished or was cancelled.
    pub fn is_terminated(&self) -> bool {
        self.relay.is_terminated()
    }
}
