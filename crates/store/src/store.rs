//! Store handles.
//!
//! A store is shared by every [`Store`] handle opened for it. Each handle has
//! its own autorefresh setting: after another handle commits, autorefreshing
//! handles report `DidChange` while the others report `RefreshRequired`
//! until [`Store::refresh`] is called.

use crate::config::StoreConfig;
use crate::notify::{
    CollectionObserver, ObjectObserver, ObserverRegistry, Outbox, Registration, StoreObserver,
};
use crate::object::Object;
use crate::results::Results;
use crate::table::{ObjectKey, StoreData};
use crate::transaction::WriteTransaction;
use core::cell::RefCell;
use core::fmt;
use eddy_core::{
    CollectionCallback, CollectionChange, Dispatcher, Error, NotificationToken, ObjectCallback,
    Result, StoreCallback, StoreSource, StoreWriter, Value, WriteStore,
};
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Per-handle state.
pub(crate) struct HandleState {
    autorefresh: AtomicBool,
}

impl HandleState {
    pub(crate) fn new(autorefresh: bool) -> Self {
        Self {
            autorefresh: AtomicBool::new(autorefresh),
        }
    }

    #[inline]
    pub(crate) fn is_autorefresh(&self) -> bool {
        self.autorefresh.load(Ordering::Acquire)
    }
}

/// State shared by every handle of one store.
///
/// Lock order is data, then observers, then outbox. No lock is held while a
/// callback runs.
pub(crate) struct StoreShared {
    config: StoreConfig,
    /// Reentrant so that a write closure can read through object handles.
    data: ReentrantMutex<RefCell<StoreData>>,
    observers: Mutex<ObserverRegistry>,
    outbox: Mutex<Outbox>,
}

impl StoreShared {
    pub(crate) fn new(config: StoreConfig) -> Arc<Self> {
        let data = StoreData::new(&config);
        Arc::new(Self {
            config,
            data: ReentrantMutex::new(RefCell::new(data)),
            observers: Mutex::new(ObserverRegistry::default()),
            outbox: Mutex::new(Outbox::default()),
        })
    }

    #[inline]
    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Runs `f` with shared access to the store data.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&StoreData) -> R) -> R {
        let guard = self.data.lock();
        let data = guard.borrow();
        f(&data)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.read(|data| data.closed)
    }

    pub(crate) fn observe_collection(
        this: &Arc<Self>,
        results: Results,
        queue: Option<&Dispatcher>,
        callback: CollectionCallback<Results>,
    ) -> Result<NotificationToken> {
        let guard = this.data.lock();
        let keys = {
            let data = guard.borrow();
            if data.closed {
                return Err(Error::StoreClosed);
            }
            data.table(results.object_type())?;
            results.keys_in(&data)
        };

        let active = Arc::new(AtomicBool::new(true));
        let observer = CollectionObserver {
            results: results.clone(),
            last: keys,
            queue: queue.cloned(),
            callback: Arc::from(callback),
            active: active.clone(),
        };
        let initial = observer.notice(CollectionChange::Initial(results));
        let id = this.observers.lock().add_collection(observer);
        this.outbox.lock().queue.push_back(initial);
        drop(guard);

        debug!(store = this.config.identifier(), id, "registered collection observer");
        this.deliver();
        Ok(Self::token(this, id, active))
    }

    pub(crate) fn observe_object(
        this: &Arc<Self>,
        object: Object,
        key: ObjectKey,
        queue: Option<&Dispatcher>,
        callback: ObjectCallback<Object>,
    ) -> Result<NotificationToken> {
        let guard = this.data.lock();
        if guard.borrow().closed {
            return Err(Error::StoreClosed);
        }
        let active = Arc::new(AtomicBool::new(true));
        let id = this.observers.lock().add_object(ObjectObserver {
            object,
            key,
            queue: queue.cloned(),
            callback: Arc::from(callback),
            active: active.clone(),
        });
        drop(guard);

        debug!(store = this.config.identifier(), id, key, "registered object observer");
        Ok(Self::token(this, id, active))
    }

    fn observe_store(
        this: &Arc<Self>,
        handle: Arc<HandleState>,
        callback: StoreCallback<Store>,
    ) -> Result<NotificationToken> {
        let guard = this.data.lock();
        if guard.borrow().closed {
            return Err(Error::StoreClosed);
        }
        let active = Arc::new(AtomicBool::new(true));
        let id = this.observers.lock().add_store(StoreObserver {
            handle,
            callback: Arc::from(callback),
            active: active.clone(),
        });
        drop(guard);

        debug!(store = this.config.identifier(), id, "registered store observer");
        Ok(Self::token(this, id, active))
    }

    fn token(this: &Arc<Self>, id: u64, active: Arc<AtomicBool>) -> NotificationToken {
        let store = Arc::downgrade(this);
        NotificationToken::new(move || {
            active.store(false, Ordering::Release);
            if let Some(shared) = store.upgrade() {
                shared.unregister(id);
            }
        })
    }

    fn unregister(&self, id: u64) {
        let removed = self.observers.lock().remove(id);
        if removed.is_some() {
            trace!(store = self.config.identifier(), id, "released observer");
        }
        drop(removed);
    }

    /// Returns the number of live observer registrations.
    pub(crate) fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Delivers queued notices unless another caller is already doing so.
    pub(crate) fn deliver(&self) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        let _drain = DrainGuard(&self.outbox);
        loop {
            let next = {
                let mut outbox = self.outbox.lock();
                let next = outbox.queue.pop_front();
                if next.is_none() {
                    // Cleared under the lock so a concurrent commit never
                    // leaves its notices behind
                    outbox.draining = false;
                }
                next
            };
            match next {
                Some(notice) => notice.dispatch(),
                None => return,
            }
        }
    }
}

/// Clears the draining flag when a callback panics.
struct DrainGuard<'a>(&'a Mutex<Outbox>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}

/// A handle to a notifying in-memory store.
#[derive(Clone)]
pub struct Store {
    shared: Arc<StoreShared>,
    handle: Arc<HandleState>,
}

impl Store {
    /// Opens a standalone store that is not tracked by any environment.
    pub fn open(config: StoreConfig) -> Self {
        debug!(store = config.identifier(), "opened standalone store");
        Self::from_shared(StoreShared::new(config))
    }

    /// Creates a new handle using the configured autorefresh default.
    pub(crate) fn from_shared(shared: Arc<StoreShared>) -> Self {
        let autorefresh = shared.config().is_autorefresh();
        Self::with_handle(shared, Arc::new(HandleState::new(autorefresh)))
    }

    pub(crate) fn with_handle(shared: Arc<StoreShared>, handle: Arc<HandleState>) -> Self {
        Self { shared, handle }
    }

    pub(crate) fn shared(&self) -> &Arc<StoreShared> {
        &self.shared
    }

    /// Returns another handle to the same store with its own autorefresh
    /// setting.
    pub fn new_handle(&self) -> Store {
        Self::from_shared(self.shared.clone())
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        self.shared.config()
    }

    /// Returns true if both handles refer to the same store.
    pub fn same_store(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Returns true if both values are the same handle.
    pub fn same_handle(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }

    /// Returns whether this handle advances on its own after other handles
    /// commit.
    pub fn autorefresh(&self) -> bool {
        self.handle.is_autorefresh()
    }

    /// Changes the autorefresh setting of this handle.
    pub fn set_autorefresh(&self, enabled: bool) {
        self.handle.autorefresh.store(enabled, Ordering::Release);
    }

    /// Advances this handle to the latest version and notifies its store
    /// observers with `DidChange`.
    pub fn refresh(&self) {
        let guard = self.shared.data.lock();
        if guard.borrow().closed {
            return;
        }
        {
            let observers = self.shared.observers.lock();
            let mut outbox = self.shared.outbox.lock();
            observers.collect_refresh(&self.shared, &self.handle, &mut outbox.queue);
        }
        drop(guard);
        self.shared.deliver();
    }

    /// Returns true while a write transaction is open.
    pub fn is_in_write_transaction(&self) -> bool {
        self.shared.read(|data| data.in_write)
    }

    /// Returns true once the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Returns the number of live observer registrations.
    pub fn observer_count(&self) -> usize {
        self.shared.observer_count()
    }

    /// Returns a live query over every object of `object_type`.
    pub fn objects(&self, object_type: &str) -> Result<Results> {
        self.shared.read(|data| data.table(object_type).map(|_| ()))?;
        Ok(Results::new(self.clone(), object_type))
    }

    /// Returns the object of `object_type` whose primary key is `key`.
    pub fn object_for_primary_key(
        &self,
        object_type: &str,
        key: impl Into<Value>,
    ) -> Result<Option<Object>> {
        let key = key.into();
        let found = self.shared.read(|data| {
            data.table(object_type)
                .map(|table| table.lookup(&key))
        })?;
        Ok(found.map(|k| Object::managed(&self.shared, object_type, k)))
    }

    /// Runs `f` inside a write transaction.
    ///
    /// The transaction commits when `f` returns `Ok`; observers are notified
    /// after the commit completes. When `f` returns `Err` every change made
    /// by `f` is rolled back and the error is returned.
    pub fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> Result<R>,
    {
        let guard = self.shared.data.lock();
        {
            let mut data = guard.borrow_mut();
            if data.closed {
                return Err(Error::StoreClosed);
            }
            if data.in_write {
                return Err(Error::AlreadyInWriteTransaction);
            }
            data.in_write = true;
        }

        let mut transaction = WriteTransaction::new(self, &guard);
        let outcome = f(&mut transaction);
        let journal = transaction.finish();

        let mut data = guard.borrow_mut();
        data.in_write = false;
        let outcome = match outcome {
            Ok(_) if data.closed => Err(Error::StoreClosed),
            other => other,
        };
        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                journal.rollback(&mut data);
                debug!(store = self.config().identifier(), error = %err, "rolled back write transaction");
                return Err(err);
            }
        };

        let diff = journal.commit();
        let retired = {
            let mut observers = self.shared.observers.lock();
            let mut outbox = self.shared.outbox.lock();
            observers.collect_commit(&self.shared, &data, &diff, &self.handle, &mut outbox.queue)
        };
        debug!(
            store = self.config().identifier(),
            inserted = diff.inserted().len(),
            deleted = diff.deleted().len(),
            "committed write transaction"
        );
        drop(data);
        drop(guard);
        drop(retired);

        self.shared.deliver();
        Ok(value)
    }

    /// Closes the store.
    ///
    /// Every collection and object observer receives a `StoreClosed` error
    /// and all registrations are released. Later writes and registrations
    /// fail with `StoreClosed`.
    pub fn close(&self) {
        let guard = self.shared.data.lock();
        {
            let mut data = guard.borrow_mut();
            if data.closed {
                return;
            }
            data.closed = true;
        }
        let retired: Vec<Registration> = {
            let mut observers = self.shared.observers.lock();
            let mut outbox = self.shared.outbox.lock();
            observers.close(&mut outbox.queue)
        };
        drop(guard);
        debug!(store = self.config().identifier(), observers = retired.len(), "closed store");
        drop(retired);
        self.shared.deliver();
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("identifier", &self.config().identifier())
            .field("autorefresh", &self.autorefresh())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StoreSource for Store {
    fn observe(&self, callback: StoreCallback<Self>) -> Result<NotificationToken> {
        StoreShared::observe_store(&self.shared, self.handle.clone(), callback)
    }
}

impl WriteStore for Store {
    type Object = Object;

    fn write_with(
        &self,
        f: &mut dyn FnMut(&mut dyn StoreWriter<Object>) -> Result<()>,
    ) -> Result<()> {
        self.write(|transaction| f(transaction))
    }
}
