//! Observer registrations and notification delivery.
//!
//! Notifications are computed while the store data is locked, so their order
//! matches commit order. They are queued in an outbox and delivered after the
//! lock is released. Only one thread drains the outbox at a time; a commit
//! made from inside a callback queues its notifications behind the ones
//! still being delivered.

use crate::journal::ChangeDiff;
use crate::object::Object;
use crate::results::Results;
use crate::store::{HandleState, Store, StoreShared};
use crate::table::{ObjectKey, StoreData};
use eddy_core::{
    Changeset, CollectionChange, Dispatcher, Error, ObjectChange, StoreNotification, Task,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

pub(crate) type SharedCollectionCallback = Arc<dyn Fn(CollectionChange<Results>) + Send + Sync>;
pub(crate) type SharedObjectCallback = Arc<dyn Fn(ObjectChange<Object>) + Send + Sync>;
pub(crate) type SharedStoreCallback = Arc<dyn Fn(Store, StoreNotification) + Send + Sync>;

/// A notification waiting to be delivered.
pub(crate) struct Notice {
    queue: Option<Dispatcher>,
    task: Task,
}

impl Notice {
    fn new<F>(queue: Option<Dispatcher>, active: &Arc<AtomicBool>, deliver: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let active = active.clone();
        Self {
            queue,
            task: Box::new(move || {
                // Registrations released after the notice was queued stay silent
                if active.load(Ordering::Acquire) {
                    deliver();
                }
            }),
        }
    }

    /// Runs the notice inline or posts it to its queue.
    pub(crate) fn dispatch(self) {
        match self.queue {
            Some(queue) => queue.post(self.task),
            None => (self.task)(),
        }
    }
}

/// Pending notices plus the single-drainer flag.
#[derive(Default)]
pub(crate) struct Outbox {
    pub(crate) queue: VecDeque<Notice>,
    pub(crate) draining: bool,
}

pub(crate) struct CollectionObserver {
    pub(crate) results: Results,
    /// Keys as last reported to the callback.
    pub(crate) last: Vec<ObjectKey>,
    pub(crate) queue: Option<Dispatcher>,
    pub(crate) callback: SharedCollectionCallback,
    pub(crate) active: Arc<AtomicBool>,
}

impl CollectionObserver {
    pub(crate) fn notice(&self, change: CollectionChange<Results>) -> Notice {
        let callback = self.callback.clone();
        Notice::new(self.queue.clone(), &self.active, move || callback(change))
    }
}

pub(crate) struct ObjectObserver {
    pub(crate) object: Object,
    pub(crate) key: ObjectKey,
    pub(crate) queue: Option<Dispatcher>,
    pub(crate) callback: SharedObjectCallback,
    pub(crate) active: Arc<AtomicBool>,
}

impl ObjectObserver {
    fn notice(&self, change: ObjectChange<Object>) -> Notice {
        let callback = self.callback.clone();
        Notice::new(self.queue.clone(), &self.active, move || callback(change))
    }
}

pub(crate) struct StoreObserver {
    pub(crate) handle: Arc<HandleState>,
    pub(crate) callback: SharedStoreCallback,
    pub(crate) active: Arc<AtomicBool>,
}

impl StoreObserver {
    fn notice(&self, store: Store, notification: StoreNotification) -> Notice {
        let callback = self.callback.clone();
        Notice::new(None, &self.active, move || callback(store, notification))
    }
}

/// A registration taken out of the registry.
///
/// Returned to the caller so that it is dropped after the registry lock is
/// released; dropping a callback may release other registrations.
pub(crate) enum Registration {
    Collection(CollectionObserver),
    Object(ObjectObserver),
    Store(StoreObserver),
}

/// Registered observers, keyed by registration id in registration order.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: u64,
    collections: BTreeMap<u64, CollectionObserver>,
    objects: BTreeMap<u64, ObjectObserver>,
    stores: BTreeMap<u64, StoreObserver>,
}

impl ObserverRegistry {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn add_collection(&mut self, observer: CollectionObserver) -> u64 {
        let id = self.allocate_id();
        self.collections.insert(id, observer);
        id
    }

    pub(crate) fn add_object(&mut self, observer: ObjectObserver) -> u64 {
        let id = self.allocate_id();
        self.objects.insert(id, observer);
        id
    }

    pub(crate) fn add_store(&mut self, observer: StoreObserver) -> u64 {
        let id = self.allocate_id();
        self.stores.insert(id, observer);
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<Registration> {
        if let Some(observer) = self.collections.remove(&id) {
            return Some(Registration::Collection(observer));
        }
        if let Some(observer) = self.objects.remove(&id) {
            return Some(Registration::Object(observer));
        }
        self.stores.remove(&id).map(Registration::Store)
    }

    /// Returns the number of live registrations.
    pub(crate) fn len(&self) -> usize {
        self.collections.len() + self.objects.len() + self.stores.len()
    }

    /// Queues the notifications produced by one commit.
    ///
    /// Returns the object registrations retired by deletions.
    pub(crate) fn collect_commit(
        &mut self,
        shared: &Arc<StoreShared>,
        data: &StoreData,
        diff: &ChangeDiff,
        origin: &Arc<HandleState>,
        out: &mut VecDeque<Notice>,
    ) -> Vec<Registration> {
        for observer in self.collections.values_mut() {
            let keys = observer.results.keys_in(data);
            let changes = Changeset::compute(&observer.last, &keys, |k| diff.is_modified(*k));
            observer.last = keys;
            if !changes.is_empty() {
                trace!(
                    object_type = observer.results.object_type(),
                    changes = changes.len(),
                    "queueing collection update"
                );
                let notice =
                    observer.notice(CollectionChange::Update(observer.results.clone(), changes));
                out.push_back(notice);
            }
        }

        let mut retired = Vec::new();
        let deleted: Vec<u64> = self
            .objects
            .iter()
            .filter(|(_, o)| diff.deleted().contains(&o.key))
            .map(|(id, _)| *id)
            .collect();
        for observer in self.objects.values() {
            if let Some(changes) = diff.changes(observer.key) {
                let change = ObjectChange::Changed(observer.object.clone(), changes.to_vec());
                out.push_back(observer.notice(change));
            } else if diff.deleted().contains(&observer.key) {
                out.push_back(observer.notice(ObjectChange::Deleted));
            }
        }
        for id in deleted {
            if let Some(observer) = self.objects.remove(&id) {
                retired.push(Registration::Object(observer));
            }
        }

        for observer in self.stores.values() {
            let notification = if Arc::ptr_eq(&observer.handle, origin)
                || observer.handle.is_autorefresh()
            {
                StoreNotification::DidChange
            } else {
                StoreNotification::RefreshRequired
            };
            let store = Store::with_handle(shared.clone(), observer.handle.clone());
            out.push_back(observer.notice(store, notification));
        }
        retired
    }

    /// Queues `DidChange` for the observers of one handle.
    pub(crate) fn collect_refresh(
        &self,
        shared: &Arc<StoreShared>,
        handle: &Arc<HandleState>,
        out: &mut VecDeque<Notice>,
    ) {
        for observer in self.stores.values() {
            if Arc::ptr_eq(&observer.handle, handle) {
                let store = Store::with_handle(shared.clone(), handle.clone());
                out.push_back(observer.notice(store, StoreNotification::DidChange));
            }
        }
    }

    /// Queues a terminal `StoreClosed` error for every collection and object
    /// observer and empties the registry.
    pub(crate) fn close(&mut self, out: &mut VecDeque<Notice>) -> Vec<Registration> {
        let mut retired = Vec::with_capacity(self.len());
        for (_, observer) in std::mem::take(&mut self.collections) {
            out.push_back(observer.notice(CollectionChange::Error(Error::StoreClosed)));
            retired.push(Registration::Collection(observer));
        }
        for (_, observer) in std::mem::take(&mut self.objects) {
            out.push_back(observer.notice(ObjectChange::Error(Error::StoreClosed)));
            retired.push(Registration::Object(observer));
        }
        for (_, observer) in std::mem::take(&mut self.stores) {
            retired.push(Registration::Store(observer));
        }
        retired
    }
}
