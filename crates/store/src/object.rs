//! Object handles.
//!
//! An [`Object`] starts detached, holding its own property values. Adding it
//! to a store binds the handle to a stored record; from then on reads go
//! through the store and writes require a write transaction.

use crate::store::{Store, StoreShared};
use crate::table::{ObjectKey, Properties};
use core::fmt;
use eddy_core::{
    Dispatcher, Error, NotificationToken, ObjectCallback, ObjectSource, Result, StoreObject, Value,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

enum Binding {
    Detached(Properties),
    Attached {
        store: Weak<StoreShared>,
        key: ObjectKey,
    },
}

struct ObjectCell {
    object_type: String,
    binding: Mutex<Binding>,
}

/// Handle to a detached or stored object.
///
/// Cloning produces another handle to the same object. Two handles compare
/// equal when they are clones of each other or refer to the same stored
/// record.
#[derive(Clone)]
pub struct Object {
    cell: Arc<ObjectCell>,
}

impl Object {
    /// Creates a detached object of `object_type` with no properties.
    pub fn new(object_type: impl Into<String>) -> Self {
        Self::detached(object_type, Properties::new())
    }

    /// Creates a detached object with the given property values.
    pub fn detached(object_type: impl Into<String>, values: Properties) -> Self {
        Self {
            cell: Arc::new(ObjectCell {
                object_type: object_type.into(),
                binding: Mutex::new(Binding::Detached(values)),
            }),
        }
    }

    /// Sets a property on a detached object, builder style.
    ///
    /// Has no effect once the object is stored.
    pub fn with(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Binding::Detached(values) = &mut *self.cell.binding.lock() {
            values.insert(property.into(), value.into());
        }
        self
    }

    pub(crate) fn managed(store: &Arc<StoreShared>, object_type: &str, key: ObjectKey) -> Self {
        Self {
            cell: Arc::new(ObjectCell {
                object_type: object_type.to_string(),
                binding: Mutex::new(Binding::Attached {
                    store: Arc::downgrade(store),
                    key,
                }),
            }),
        }
    }

    /// Returns the object type name.
    #[inline]
    pub fn object_type(&self) -> &str {
        &self.cell.object_type
    }

    /// Returns the stored key, or `None` while detached.
    pub fn key(&self) -> Option<ObjectKey> {
        match &*self.cell.binding.lock() {
            Binding::Detached(_) => None,
            Binding::Attached { key, .. } => Some(*key),
        }
    }

    /// Reads one property.
    pub fn get(&self, property: &str) -> Option<Value> {
        self.read(|values| values.get(property).cloned()).flatten()
    }

    /// Returns a snapshot of every property. Empty once invalidated.
    pub fn values(&self) -> Properties {
        self.read(Properties::clone).unwrap_or_default()
    }

    /// Sets a property on a detached object.
    ///
    /// Stored objects are modified with
    /// [`WriteTransaction::set`](crate::WriteTransaction::set).
    pub fn set(&self, property: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        match &mut *self.cell.binding.lock() {
            Binding::Detached(values) => {
                values.insert(property.into(), value.into());
                Ok(())
            }
            Binding::Attached { .. } => Err(Error::invalid_operation(
                "stored objects can only be modified inside a write transaction",
            )),
        }
    }

    /// Returns true if the object is bound to a live record.
    pub fn is_managed(&self) -> bool {
        self.live().is_ok()
    }

    /// Returns true if the object was stored and its record is gone.
    pub fn is_invalidated(&self) -> bool {
        matches!(self.live(), Err(Error::ObjectInvalidated))
    }

    /// Returns a handle to the owning store, or `None` if the object is
    /// detached or invalidated.
    pub fn store(&self) -> Option<Store> {
        self.live().ok().map(|(shared, _)| Store::from_shared(shared))
    }

    /// Resolves the owning store and key.
    pub(crate) fn live(&self) -> Result<(Arc<StoreShared>, ObjectKey)> {
        let (store, key) = self.attachment().ok_or(Error::ObjectNotManaged)?;
        let shared = store.upgrade().ok_or(Error::ObjectInvalidated)?;
        let exists = shared.read(|data| data.record(&self.cell.object_type, key).is_some());
        if exists {
            Ok((shared, key))
        } else {
            Err(Error::ObjectInvalidated)
        }
    }

    pub(crate) fn attachment(&self) -> Option<(Weak<StoreShared>, ObjectKey)> {
        match &*self.cell.binding.lock() {
            Binding::Detached(_) => None,
            Binding::Attached { store, key } => Some((store.clone(), *key)),
        }
    }

    /// Returns the values of a detached object.
    pub(crate) fn detached_values(&self) -> Option<Properties> {
        match &*self.cell.binding.lock() {
            Binding::Detached(values) => Some(values.clone()),
            Binding::Attached { .. } => None,
        }
    }

    /// Binds the handle to a stored record.
    pub(crate) fn attach(&self, store: &Arc<StoreShared>, key: ObjectKey) {
        *self.cell.binding.lock() = Binding::Attached {
            store: Arc::downgrade(store),
            key,
        };
    }

    /// Returns the handle to the detached state.
    pub(crate) fn detach(&self, values: Properties) {
        *self.cell.binding.lock() = Binding::Detached(values);
    }

    fn read<R>(&self, f: impl FnOnce(&Properties) -> R) -> Option<R> {
        // The binding lock is released before the store is read
        let (store, key) = match &*self.cell.binding.lock() {
            Binding::Detached(values) => return Some(f(values)),
            Binding::Attached { store, key } => (store.clone(), *key),
        };
        let shared = store.upgrade()?;
        shared.read(|data| data.record(&self.cell.object_type, key).map(f))
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.cell, &other.cell) {
            return true;
        }
        match (self.attachment(), other.attachment()) {
            (Some((a, ka)), Some((b, kb))) => ka == kb && Weak::ptr_eq(&a, &b),
            _ => false,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.cell.object_type)
            .field("key", &self.key())
            .field("values", &self.values())
            .finish()
    }
}

impl ObjectSource for Object {
    fn observe(
        &self,
        queue: Option<&Dispatcher>,
        callback: ObjectCallback<Self>,
    ) -> Result<NotificationToken> {
        let (shared, key) = self.live()?;
        StoreShared::observe_object(&shared, self.clone(), key, queue, callback)
    }
}

impl StoreObject for Object {
    type Store = Store;

    fn owner(&self) -> Option<Store> {
        self.store()
    }
}
