//! Subscribers that write received values into a store.
//!
//! Every received value is applied in its own write transaction. A failed
//! write is reported to the error handler, or logged when there is none, and
//! the subscriber keeps consuming.

use crate::publisher::{Cancellable, Completion, Demand, Publisher, Subscriber, SubscriptionHandle};
use crate::sink::UpstreamLink;
use eddy_core::{Error, Result, StoreObject, StoreProvider, StoreWriter, UpdatePolicy, WriteStore};
use std::sync::Arc;
use tracing::{trace, warn};

/// Receives write failures.
pub type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

/// Where a write subscriber finds its store.
pub enum StoreBinding<S> {
    /// A fixed store handle.
    Store(S),
    /// A provider asked for a store on every write.
    Provider(Arc<dyn StoreProvider<Store = S>>),
}

impl<S: Clone + 'static> StoreBinding<S> {
    /// Binds a provider.
    pub fn provider<P>(provider: P) -> Self
    where
        P: StoreProvider<Store = S>,
    {
        StoreBinding::Provider(Arc::new(provider))
    }

    /// Returns the bound store, asking the provider if necessary.
    pub fn resolve(&self) -> Result<S> {
        match self {
            StoreBinding::Store(store) => Ok(store.clone()),
            StoreBinding::Provider(provider) => provider.provide(),
        }
    }
}

impl<S: Clone + 'static> Clone for StoreBinding<S> {
    fn clone(&self) -> Self {
        match self {
            StoreBinding::Store(store) => StoreBinding::Store(store.clone()),
            StoreBinding::Provider(provider) => StoreBinding::Provider(provider.clone()),
        }
    }
}

type Resolve<I, S> = Box<dyn Fn(&I) -> Result<S> + Send>;
type Mutate<I, O> = Box<dyn Fn(&mut dyn StoreWriter<O>, &I) -> Result<()> + Send>;

/// Subscriber applying each value to a store in one transaction.
struct WriteSink<I, S: WriteStore> {
    operation: &'static str,
    link: UpstreamLink,
    resolve: Resolve<I, S>,
    mutate: Mutate<I, S::Object>,
    on_error: Option<ErrorHandler>,
}

impl<I, S: WriteStore> WriteSink<I, S> {
    fn apply(&self, input: &I) -> Result<()> {
        let store = (self.resolve)(input)?;
        store.write_with(&mut |writer: &mut dyn StoreWriter<S::Object>| {
            (self.mutate)(writer, input)
        })
    }

    fn report(&self, error: Error) {
        match &self.on_error {
            Some(handler) => handler(error),
            None => warn!(operation = self.operation, error = %error, "store write failed"),
        }
    }
}

impl<I, S> Subscriber<I> for WriteSink<I, S>
where
    I: Send + 'static,
    S: WriteStore,
{
    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.link.connect(subscription, Demand::Unlimited);
    }

    fn receive(&mut self, input: I) -> Demand {
        match self.apply(&input) {
            Ok(()) => trace!(operation = self.operation, "store write applied"),
            Err(error) => self.report(error),
        }
        Demand::NONE
    }

    fn receive_completion(&mut self, _completion: Completion) {
        self.link.disconnect();
    }
}

fn attach<P, S>(
    publisher: &P,
    operation: &'static str,
    resolve: Resolve<P::Output, S>,
    mutate: Mutate<P::Output, S::Object>,
    on_error: Option<ErrorHandler>,
) -> Cancellable
where
    P: Publisher,
    S: WriteStore,
{
    let link = UpstreamLink::new();
    let cancellable = link.cancellable();
    publisher.subscribe(Box::new(WriteSink {
        operation,
        link,
        resolve,
        mutate,
        on_error,
    }));
    cancellable
}

/// Resolves the store owning the first element of a sequence.
fn first_owner<O: StoreObject>(objects: &[O]) -> Result<O::Store> {
    objects
        .first()
        .and_then(|object| object.owner())
        .ok_or(Error::Unknown)
}

/// Store-writing subscribers available on every publisher.
pub trait WriteExt: Publisher + Sized {
    /// Adds each received object to the store.
    fn add_to_store<S>(
        &self,
        binding: StoreBinding<S>,
        policy: UpdatePolicy,
        on_error: Option<ErrorHandler>,
    ) -> Cancellable
    where
        S: WriteStore<Object = Self::Output>,
    {
        attach::<Self, S>(
            self,
            "add",
            Box::new(move |_: &Self::Output| binding.resolve()),
            Box::new(move |writer: &mut dyn StoreWriter<S::Object>, object: &S::Object| {
                writer.add(object, policy)
            }),
            on_error,
        )
    }

    /// Adds every object of each received sequence in one transaction.
    fn add_all_to_store<S>(
        &self,
        binding: StoreBinding<S>,
        policy: UpdatePolicy,
        on_error: Option<ErrorHandler>,
    ) -> Cancellable
    where
        S: WriteStore,
        S::Object: Send + 'static,
        Self: Publisher<Output = Vec<S::Object>>,
    {
        attach::<Self, S>(
            self,
            "add_all",
            Box::new(move |_: &Vec<S::Object>| binding.resolve()),
            Box::new(
                move |writer: &mut dyn StoreWriter<S::Object>, objects: &Vec<S::Object>| {
                    objects.iter().try_for_each(|object| writer.add(object, policy))
                },
            ),
            on_error,
        )
    }

    /// Deletes each received object.
    ///
    /// Without a binding the object's owning store is used; an object with
    /// no owner is reported as [`Error::Unknown`].
    fn delete_from_store(
        &self,
        binding: Option<StoreBinding<<Self::Output as StoreObject>::Store>>,
        on_error: Option<ErrorHandler>,
    ) -> Cancellable
    where
        Self::Output: StoreObject,
    {
        attach::<Self, <Self::Output as StoreObject>::Store>(
            self,
            "delete",
            Box::new(move |object: &Self::Output| match &binding {
                Some(binding) => binding.resolve(),
                None => object.owner().ok_or(Error::Unknown),
            }),
            Box::new(|writer: &mut dyn StoreWriter<Self::Output>, object: &Self::Output| {
                writer.delete(object)
            }),
            on_error,
        )
    }

    /// Deletes every object of each received sequence in one transaction.
    ///
    /// Without a binding the owner of the first element is used. An empty
    /// sequence, or a first element with no owner, is reported as
    /// [`Error::Unknown`] and nothing is written.
    fn delete_all_from_store<O>(
        &self,
        binding: Option<StoreBinding<O::Store>>,
        on_error: Option<ErrorHandler>,
    ) -> Cancellable
    where
        O: StoreObject + Send + 'static,
        Self: Publisher<Output = Vec<O>>,
    {
        attach::<Self, O::Store>(
            self,
            "delete_all",
            Box::new(move |objects: &Vec<O>| {
                if objects.is_empty() {
                    return Err(Error::Unknown);
                }
                match &binding {
                    Some(binding) => binding.resolve(),
                    None => first_owner(objects),
                }
            }),
            Box::new(|writer: &mut dyn StoreWriter<O>, objects: &Vec<O>| {
                objects.iter().try_for_each(|object| writer.delete(object))
            }),
            on_error,
        )
    }
}

impl<P: Publisher> WriteExt for P {}
