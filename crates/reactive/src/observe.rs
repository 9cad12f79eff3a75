//! Publishers over store notifications.
//!
//! Each function returns a publisher; nothing is registered with the store
//! until a subscriber requests demand, and every subscriber gets its own
//! registration.

use crate::bridge::ObservableBridge;
use crate::operators::{BoxPublisher, PublisherExt};
use eddy_core::{
    Changeset, CollectionChange, CollectionSource, Dispatcher, Error, ObjectChange, ObjectSource,
    PropertyChange, StoreNotification, StoreSource,
};
use hashbrown::HashSet;

/// Options for collection publishers.
#[derive(Clone, Debug)]
pub struct ObserveOptions {
    /// Emit the current state synchronously when demand arrives. When
    /// disabled, nothing is emitted until the collection changes.
    pub synchronous_start: bool,
    /// Queue the store delivers notifications on. `None` delivers inline on
    /// the committing thread.
    pub queue: Option<Dispatcher>,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            synchronous_start: true,
            queue: None,
        }
    }
}

impl ObserveOptions {
    /// Default options: synchronous start, inline delivery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the current state is emitted synchronously.
    pub fn synchronous_start(mut self, enabled: bool) -> Self {
        self.synchronous_start = enabled;
        self
    }

    /// Delivers notifications on `queue`.
    pub fn on_queue(mut self, queue: Dispatcher) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// Emits the collection whenever it changes.
///
/// With synchronous start the collection is emitted as soon as demand
/// arrives; otherwise the first value is the first update after
/// registration. The store's own initial notification is always skipped.
pub fn observe_collection<C: CollectionSource>(
    collection: &C,
    options: ObserveOptions,
) -> BoxPublisher<C> {
    let initial = options.synchronous_start.then(|| collection.clone());
    let source = collection.clone();
    ObservableBridge::new(initial, move |emitter| {
        source.observe(
            options.queue.as_ref(),
            Box::new(move |change| match change {
                // The store's own snapshot is never forwarded
                CollectionChange::Initial(_) => {}
                CollectionChange::Update(latest, _) => {
                    emitter.send(latest);
                }
                CollectionChange::Error(err) => emitter.fail(err),
            }),
        )
    })
    .boxed()
}

/// Like [`observe_collection`], emitting the elements as a vector.
pub fn observe_array<C: CollectionSource>(
    collection: &C,
    options: ObserveOptions,
) -> BoxPublisher<Vec<C::Element>> {
    observe_collection(collection, options)
        .map(|latest: C| latest.to_vec())
        .boxed()
}

/// Emits the collection with the changeset of each update.
///
/// The synchronous initial value carries no changeset.
pub fn observe_changeset<C: CollectionSource>(
    collection: &C,
    options: ObserveOptions,
) -> BoxPublisher<(C, Option<Changeset>)> {
    let initial = options
        .synchronous_start
        .then(|| (collection.clone(), None));
    let source = collection.clone();
    ObservableBridge::new(initial, move |emitter| {
        source.observe(
            options.queue.as_ref(),
            Box::new(move |change| match change {
                // The store's own snapshot is never forwarded
                CollectionChange::Initial(_) => {}
                CollectionChange::Update(latest, changes) => {
                    emitter.send((latest, Some(changes)));
                }
                CollectionChange::Error(err) => emitter.fail(err),
            }),
        )
    })
    .boxed()
}

/// Like [`observe_changeset`], emitting the elements as a vector.
pub fn observe_array_with_changeset<C: CollectionSource>(
    collection: &C,
    options: ObserveOptions,
) -> BoxPublisher<(Vec<C::Element>, Option<Changeset>)> {
    observe_changeset(collection, options)
        .map(|(latest, changes): (C, Option<Changeset>)| (latest.to_vec(), changes))
        .boxed()
}

/// Emits each store-wide notification. There is no initial value.
pub fn observe_store<S: StoreSource>(store: &S) -> BoxPublisher<(S, StoreNotification)> {
    let source = store.clone();
    ObservableBridge::new(None, move |emitter| {
        source.observe(Box::new(move |store, notification| {
            emitter.send((store, notification));
        }))
    })
    .boxed()
}

/// Emits the object whenever its properties change.
///
/// With `emit_initial` the object is emitted as soon as demand arrives.
/// With `properties` set, only changes touching at least one of the named
/// properties are emitted. Deletion fails the stream with
/// [`Error::ObjectDeleted`].
pub fn observe_object<O: ObjectSource>(
    object: &O,
    emit_initial: bool,
    properties: Option<Vec<String>>,
) -> BoxPublisher<O> {
    let initial = emit_initial.then(|| object.clone());
    let source = object.clone();
    let watched: Option<HashSet<String>> = properties.map(|p| p.into_iter().collect());
    ObservableBridge::new(initial, move |emitter| {
        let observed = source.clone();
        let watched = watched.clone();
        source.observe(
            None,
            Box::new(move |change| match change {
                ObjectChange::Changed(_, changes) => {
                    let relevant = watched.as_ref().map_or(true, |watched| {
                        changes.iter().any(|c| watched.contains(&c.name))
                    });
                    if relevant {
                        emitter.send(observed.clone());
                    }
                }
                ObjectChange::Deleted => emitter.fail(Error::ObjectDeleted),
                ObjectChange::Error(err) => emitter.fail(err),
            }),
        )
    })
    .boxed()
}

/// Emits one [`PropertyChange`] per changed property, in the order the
/// store reports them. Deletion fails the stream with
/// [`Error::ObjectDeleted`].
pub fn observe_property_changes<O: ObjectSource>(object: &O) -> BoxPublisher<PropertyChange> {
    let source = object.clone();
    ObservableBridge::new(None, move |emitter| {
        source.observe(
            None,
            Box::new(move |change| match change {
                ObjectChange::Changed(_, changes) => {
                    for property in changes {
                        if !emitter.send(property) {
                            break;
                        }
                    }
                }
                ObjectChange::Deleted => emitter.fail(Error::ObjectDeleted),
                ObjectChange::Error(err) => emitter.fail(err),
            }),
        )
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = ObserveOptions::new();
        assert!(options.synchronous_start);
        assert!(options.queue.is_none());

        let queue = Dispatcher::new("main");
        let options = ObserveOptions::new()
            .synchronous_start(false)
            .on_queue(queue.clone());
        assert!(!options.synchronous_start);
        assert!(options.queue.unwrap().same_queue(&queue));
    }
}
