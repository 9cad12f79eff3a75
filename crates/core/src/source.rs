//! Interfaces a notifying store exposes to the reactive layer.
//!
//! Observation is callback based: a source registers a callback and hands
//! back a [`NotificationToken`] that keeps the registration alive. Writes go
//! through a scoped transaction opened by [`WriteStore::write_with`].

use crate::change::{CollectionChange, ObjectChange, StoreNotification, UpdatePolicy};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::token::NotificationToken;

/// Callback invoked for every collection notification.
pub type CollectionCallback<C> = Box<dyn Fn(CollectionChange<C>) + Send + Sync>;

/// Callback invoked for every object notification.
pub type ObjectCallback<O> = Box<dyn Fn(ObjectChange<O>) + Send + Sync>;

/// Callback invoked for every store notification.
pub type StoreCallback<S> = Box<dyn Fn(S, StoreNotification) + Send + Sync>;

/// An ordered collection that reports changes.
pub trait CollectionSource: Clone + Send + Sync + 'static {
    /// Element type produced when the collection is materialized.
    type Element: Clone + Send + 'static;

    /// Registers `callback` for change notifications delivered on `queue`,
    /// or inline on the committing thread when `queue` is `None`.
    fn observe(
        &self,
        queue: Option<&Dispatcher>,
        callback: CollectionCallback<Self>,
    ) -> Result<NotificationToken>;

    /// Returns the current number of elements.
    fn len(&self) -> usize;

    /// Returns true if the collection is currently empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materializes the current elements in order.
    fn to_vec(&self) -> Vec<Self::Element>;
}

/// A single stored object that reports property changes and deletion.
pub trait ObjectSource: Clone + Send + Sync + 'static {
    /// Registers `callback` for change notifications delivered on `queue`,
    /// or inline on the committing thread when `queue` is `None`.
    fn observe(
        &self,
        queue: Option<&Dispatcher>,
        callback: ObjectCallback<Self>,
    ) -> Result<NotificationToken>;
}

/// A store handle that reports store-wide notifications.
pub trait StoreSource: Clone + Send + Sync + 'static {
    /// Registers `callback` for store notifications.
    fn observe(&self, callback: StoreCallback<Self>) -> Result<NotificationToken>;
}

/// Mutations available inside a write transaction.
pub trait StoreWriter<O> {
    /// Adds `object`, resolving primary key collisions with `policy`.
    fn add(&mut self, object: &O, policy: UpdatePolicy) -> Result<()>;

    /// Deletes `object`.
    fn delete(&mut self, object: &O) -> Result<()>;
}

/// A store that accepts scoped write transactions.
pub trait WriteStore: Clone + Send + Sync + 'static {
    /// Object type the store manages.
    type Object;

    /// Runs `f` inside one write transaction. The transaction commits when
    /// `f` returns `Ok` and rolls back when it returns `Err`.
    fn write_with(
        &self,
        f: &mut dyn FnMut(&mut dyn StoreWriter<Self::Object>) -> Result<()>,
    ) -> Result<()>;
}

/// An object that can report which store currently owns it.
pub trait StoreObject: Sized {
    /// Store type owning objects of this type.
    type Store: WriteStore<Object = Self>;

    /// Returns the owning store, or `None` if the object is detached or was
    /// deleted.
    fn owner(&self) -> Option<Self::Store>;
}

/// Resolves a store handle on demand.
pub trait StoreProvider: Send + Sync + 'static {
    /// Store type produced.
    type Store;

    /// Opens or looks up the store.
    fn provide(&self) -> Result<Self::Store>;
}
