//! Operators for composing publishers.

use crate::publisher::{Cancellable, Completion, Demand, Publisher, Subscriber, SubscriptionHandle};
use crate::sink::{Sink, UpstreamLink};
use core::marker::PhantomData;
use std::sync::Arc;

/// A type-erased publisher.
pub struct BoxPublisher<T> {
    subscribe: Arc<dyn Fn(Box<dyn Subscriber<T>>) + Send + Sync>,
}

impl<T> Clone for BoxPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe: self.subscribe.clone(),
        }
    }
}

impl<T: Send + 'static> Publisher for BoxPublisher<T> {
    type Output = T;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        (self.subscribe)(subscriber)
    }
}

/// Transforms each value.
pub struct Map<P, F> {
    upstream: P,
    transform: Arc<F>,
}

impl<P, F, U> Publisher for Map<P, F>
where
    P: Publisher,
    F: Fn(P::Output) -> U + Send + Sync + 'static,
    U: Send + 'static,
{
    type Output = U;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<U>>) {
        self.upstream.subscribe(Box::new(MapSubscriber {
            downstream: subscriber,
            transform: self.transform.clone(),
            _input: PhantomData,
        }));
    }
}

struct MapSubscriber<T, U, F> {
    downstream: Box<dyn Subscriber<U>>,
    transform: Arc<F>,
    _input: PhantomData<fn(T)>,
}

impl<T, U, F> Subscriber<T> for MapSubscriber<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&mut self, value: T) -> Demand {
        self.downstream.receive((self.transform)(value))
    }

    fn receive_completion(&mut self, completion: Completion) {
        self.downstream.receive_completion(completion);
    }
}

/// Forwards only the values matching a predicate.
pub struct Filter<P, F> {
    upstream: P,
    predicate: Arc<F>,
}

impl<P, F> Publisher for Filter<P, F>
where
    P: Publisher,
    F: Fn(&P::Output) -> bool + Send + Sync + 'static,
{
    type Output = P::Output;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<P::Output>>) {
        self.upstream.subscribe(Box::new(FilterSubscriber {
            downstream: subscriber,
            predicate: self.predicate.clone(),
        }));
    }
}

struct FilterSubscriber<T, F> {
    downstream: Box<dyn Subscriber<T>>,
    predicate: Arc<F>,
}

impl<T, F> Subscriber<T> for FilterSubscriber<T, F>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&mut self, value: T) -> Demand {
        if (self.predicate)(&value) {
            self.downstream.receive(value)
        } else {
            Demand::Max(1)
        }
    }

    fn receive_completion(&mut self, completion: Completion) {
        self.downstream.receive_completion(completion);
    }
}

/// Drops the first `count` values.
pub struct Skip<P> {
    upstream: P,
    count: usize,
}

impl<P: Publisher> Publisher for Skip<P> {
    type Output = P::Output;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<P::Output>>) {
        self.upstream.subscribe(Box::new(SkipSubscriber {
            downstream: subscriber,
            remaining: self.count,
        }));
    }
}

struct SkipSubscriber<T> {
    downstream: Box<dyn Subscriber<T>>,
    remaining: usize,
}

impl<T: Send + 'static> Subscriber<T> for SkipSubscriber<T> {
    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&mut self, value: T) -> Demand {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Demand::Max(1);
        }
        self.downstream.receive(value)
    }

    fn receive_completion(&mut self, completion: Completion) {
        self.downstream.receive_completion(completion);
    }
}

/// Forwards the first `count` values, then finishes and cancels upstream.
pub struct Take<P> {
    upstream: P,
    count: usize,
}

impl<P: Publisher> Publisher for Take<P> {
    type Output = P::Output;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<P::Output>>) {
        self.upstream.subscribe(Box::new(TakeSubscriber {
            downstream: subscriber,
            remaining: self.count,
            upstream: None,
            done: false,
        }));
    }
}

struct TakeSubscriber<T> {
    downstream: Box<dyn Subscriber<T>>,
    remaining: usize,
    upstream: Option<SubscriptionHandle>,
    done: bool,
}

impl<T: 'static> TakeSubscriber<T> {
    fn finish(&mut self) {
        self.done = true;
        if let Some(upstream) = self.upstream.take() {
            upstream.cancel();
        }
        self.downstream.receive_completion(Completion::Finished);
    }
}

impl<T: Send + 'static> Subscriber<T> for TakeSubscriber<T> {
    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.upstream = Some(subscription.clone());
        self.downstream.receive_subscription(subscription);
        if self.remaining == 0 && !self.done {
            self.finish();
        }
    }

    fn receive(&mut self, value: T) -> Demand {
        if self.done {
            return Demand::NONE;
        }
        self.remaining = self.remaining.saturating_sub(1);
        let demand = self.downstream.receive(value);
        if self.remaining == 0 {
            self.finish();
            return Demand::NONE;
        }
        demand
    }

    fn receive_completion(&mut self, completion: Completion) {
        if !self.done {
            self.done = true;
            self.upstream = None;
            self.downstream.receive_completion(completion);
        }
    }
}

/// Combinators available on every publisher.
pub trait PublisherExt: Publisher + Sized {
    /// Transforms each value with `transform`.
    fn map<U, F>(self, transform: F) -> Map<Self, F>
    where
        F: Fn(Self::Output) -> U + Send + Sync + 'static,
        U: Send + 'static,
    {
        Map {
            upstream: self,
            transform: Arc::new(transform),
        }
    }

    /// Forwards only values for which `predicate` returns true.
    fn filter<F>(self, predicate: F) -> Filter<Self, F>
    where
        F: Fn(&Self::Output) -> bool + Send + Sync + 'static,
    {
        Filter {
            upstream: self,
            predicate: Arc::new(predicate),
        }
    }

    /// Drops the first `count` values.
    fn skip(self, count: usize) -> Skip<Self> {
        Skip {
            upstream: self,
            count,
        }
    }

    /// Forwards at most `count` values.
    fn take(self, count: usize) -> Take<Self> {
        Take {
            upstream: self,
            count,
        }
    }

    /// Erases the publisher type.
    fn boxed(self) -> BoxPublisher<Self::Output>
    where
        Self: Send + Sync + 'static,
    {
        BoxPublisher {
            subscribe: Arc::new(move |subscriber: Box<dyn Subscriber<Self::Output>>| {
                self.subscribe(subscriber)
            }),
        }
    }

    /// Subscribes with unlimited demand, calling `on_value` for each value
    /// and `on_completion` once when the stream terminates.
    fn sink<V, C>(&self, on_value: V, on_completion: C) -> Cancellable
    where
        V: FnMut(Self::Output) + Send + 'static,
        C: FnOnce(Completion) + Send + 'static,
    {
        let link = UpstreamLink::new();
        let cancellable = link.cancellable();
        self.subscribe(Box::new(Sink::new(link, on_value, on_completion)));
        cancellable
    }

    /// Subscribes with unlimited demand and ignores the completion.
    fn sink_values<V>(&self, on_value: V) -> Cancellable
    where
        V: FnMut(Self::Output) + Send + 'static,
    {
        self.sink(on_value, |_| {})
    }
}

impl<P: Publisher> PublisherExt for P {}
