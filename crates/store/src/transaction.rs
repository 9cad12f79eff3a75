//! Write transactions.

use crate::journal::Journal;
use crate::object::Object;
use crate::store::Store;
use crate::table::{ObjectKey, StoreData};
use core::cell::RefCell;
use eddy_core::{Error, Result, StoreWriter, UpdatePolicy, Value};
use std::sync::Arc;
use tracing::trace;

/// An open write transaction, handed to the closure passed to
/// [`Store::write`].
///
/// Every mutation is journaled so that the transaction can be rolled back.
pub struct WriteTransaction<'a> {
    store: &'a Store,
    data: &'a RefCell<StoreData>,
    journal: Journal,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(store: &'a Store, data: &'a RefCell<StoreData>) -> Self {
        Self {
            store,
            data,
            journal: Journal::new(),
        }
    }

    pub(crate) fn finish(self) -> Journal {
        self.journal
    }

    /// Returns the store being written.
    pub fn store(&self) -> &Store {
        self.store
    }

    /// Adds `object` to the store.
    ///
    /// Adding an object already stored in this store does nothing. When the
    /// object's primary key matches an existing record, `policy` decides
    /// whether the add fails or overwrites; on overwrite the handle is bound
    /// to the existing record.
    pub fn add(&mut self, object: &Object, policy: UpdatePolicy) -> Result<()> {
        if object.attachment().is_some() {
            let (shared, _) = object.live()?;
            return if Arc::ptr_eq(&shared, self.store.shared()) {
                Ok(())
            } else {
                Err(Error::OwnedByOtherStore)
            };
        }
        let values = object.detached_values().ok_or(Error::ObjectInvalidated)?;
        let object_type = object.object_type();

        let mut data = self.data.borrow_mut();
        let (primary_key, existing) = {
            let table = data.table(object_type)?;
            let primary_key = table.primary_key_of(&values)?;
            let existing = primary_key.as_ref().and_then(|pk| table.lookup(pk));
            (primary_key, existing)
        };

        let key = match (existing, primary_key) {
            (Some(key), Some(pk)) => {
                if policy == UpdatePolicy::FailOnCollision {
                    return Err(Error::primary_key_collision(object_type, pk));
                }
                let table = data.table_mut(object_type)?;
                let pk_property = table.schema().primary_key_property().map(str::to_string);
                for (property, value) in &values {
                    if pk_property.as_deref() == Some(property.as_str()) {
                        continue;
                    }
                    if policy == UpdatePolicy::OverwriteModified
                        && table.get(key).and_then(|r| r.get(property)) == Some(value)
                    {
                        continue;
                    }
                    let old = table.set(key, property, value.clone())?;
                    self.journal
                        .record_update(object_type, key, property, old, value.clone());
                }
                if policy == UpdatePolicy::OverwriteAll {
                    // Properties the incoming object lacks are cleared
                    let stale: Vec<String> = table
                        .get(key)
                        .map(|record| {
                            record
                                .iter()
                                .filter(|(property, value)| {
                                    pk_property.as_deref() != Some(property.as_str())
                                        && !values.contains_key(property.as_str())
                                        && !value.is_null()
                                })
                                .map(|(property, _)| property.clone())
                                .collect()
                        })
                        .unwrap_or_default();
                    for property in stale {
                        let old = table.set(key, &property, Value::Null)?;
                        self.journal
                            .record_update(object_type, key, &property, old, Value::Null);
                    }
                }
                trace!(object_type, key, ?policy, "overwrote existing object");
                key
            }
            _ => {
                let key = data.allocate_key();
                data.table_mut(object_type)?.insert(key, values.clone())?;
                self.journal.record_insert(object_type, key);
                trace!(object_type, key, "inserted object");
                key
            }
        };
        drop(data);

        object.attach(self.store.shared(), key);
        self.journal.record_attach(object.clone(), values);
        Ok(())
    }

    /// Adds every object in order. Stops at the first failure.
    pub fn add_all<'o, I>(&mut self, objects: I, policy: UpdatePolicy) -> Result<()>
    where
        I: IntoIterator<Item = &'o Object>,
    {
        for object in objects {
            self.add(object, policy)?;
        }
        Ok(())
    }

    /// Writes one property of a stored object.
    pub fn set(
        &mut self,
        object: &Object,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let key = self.owned_key(object)?;
        let value = value.into();
        let object_type = object.object_type();
        let old = self
            .data
            .borrow_mut()
            .table_mut(object_type)?
            .set(key, property, value.clone())?;
        self.journal
            .record_update(object_type, key, property, old, value);
        Ok(())
    }

    /// Deletes a stored object.
    pub fn delete(&mut self, object: &Object) -> Result<()> {
        let key = self.owned_key(object)?;
        self.remove(object.object_type(), key)
    }

    /// Deletes every object in order. Stops at the first failure.
    pub fn delete_all<'o, I>(&mut self, objects: I) -> Result<()>
    where
        I: IntoIterator<Item = &'o Object>,
    {
        for object in objects {
            self.delete(object)?;
        }
        Ok(())
    }

    /// Deletes every object of `object_type`.
    pub fn delete_all_of(&mut self, object_type: &str) -> Result<()> {
        let keys = self.data.borrow().table(object_type)?.keys();
        for key in keys {
            self.remove(object_type, key)?;
        }
        Ok(())
    }

    /// Deletes every object in the store.
    pub fn delete_everything(&mut self) -> Result<()> {
        let object_types = self.data.borrow().object_types();
        for object_type in object_types {
            self.delete_all_of(&object_type)?;
        }
        Ok(())
    }

    fn remove(&mut self, object_type: &str, key: ObjectKey) -> Result<()> {
        let values = self
            .data
            .borrow_mut()
            .table_mut(object_type)?
            .remove(key)
            .ok_or(Error::ObjectInvalidated)?;
        self.journal.record_delete(object_type, key, values);
        trace!(object_type, key, "deleted object");
        Ok(())
    }

    /// Resolves the key of an object stored in this store.
    fn owned_key(&self, object: &Object) -> Result<ObjectKey> {
        let (store, key) = object.attachment().ok_or(Error::ObjectNotManaged)?;
        if !std::ptr::eq(store.as_ptr(), Arc::as_ptr(self.store.shared())) {
            return match store.upgrade() {
                Some(_) => Err(Error::OwnedByOtherStore),
                None => Err(Error::ObjectInvalidated),
            };
        }
        let exists = self.data.borrow().record(object.object_type(), key).is_some();
        if exists {
            Ok(key)
        } else {
            Err(Error::ObjectInvalidated)
        }
    }
}

impl StoreWriter<Object> for WriteTransaction<'_> {
    fn add(&mut self, object: &Object, policy: UpdatePolicy) -> Result<()> {
        WriteTransaction::add(self, object, policy)
    }

    fn delete(&mut self, object: &Object) -> Result<()> {
        WriteTransaction::delete(self, object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ObjectSchema, StoreConfig};

    fn test_store(identifier: &str) -> Store {
        Store::open(
            StoreConfig::in_memory(identifier)
                .with_object_type(ObjectSchema::new("Task").primary_key("id"))
                .with_object_type(ObjectSchema::new("Log")),
        )
    }

    fn task(id: i64, name: &str) -> Object {
        Object::new("Task").with("id", id).with("name", name)
    }

    #[test]
    fn test_add_collision_fails() {
        let store = test_store("collision");
        store
            .write(|tx| tx.add(&task(1, "a"), UpdatePolicy::FailOnCollision))
            .unwrap();

        let err = store
            .write(|tx| tx.add(&task(1, "b"), UpdatePolicy::FailOnCollision))
            .unwrap_err();
        assert!(matches!(err, Error::PrimaryKeyCollision { .. }));
        assert_eq!(store.objects("Task").unwrap().len(), 1);
    }

    #[test]
    fn test_add_overwrite_binds_existing() {
        let store = test_store("overwrite");
        let first = task(1, "a");
        store
            .write(|tx| tx.add(&first, UpdatePolicy::FailOnCollision))
            .unwrap();

        let second = task(1, "b");
        store
            .write(|tx| tx.add(&second, UpdatePolicy::OverwriteAll))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.get("name"), Some(Value::from("b")));
        assert_eq!(store.objects("Task").unwrap().len(), 1);
    }

    #[test]
    fn test_overwrite_all_clears_missing_properties() {
        let store = test_store("overwrite-all");
        let first = task(1, "a").with("note", "keep?");
        store
            .write(|tx| tx.add(&first, UpdatePolicy::FailOnCollision))
            .unwrap();

        store
            .write(|tx| tx.add(&task(1, "b"), UpdatePolicy::OverwriteModified))
            .unwrap();
        assert_eq!(first.get("note"), Some(Value::from("keep?")));

        let replacement = Object::new("Task").with("id", 1).with("note", "new");
        store
            .write(|tx| tx.add(&replacement, UpdatePolicy::OverwriteAll))
            .unwrap();
        assert_eq!(first.get("name"), Some(Value::Null));
        assert_eq!(first.get("note"), Some(Value::from("new")));
        assert_eq!(first.get("id"), Some(Value::from(1i64)));

        // Rollback restores the cleared property
        let err = store
            .write(|tx| {
                tx.add(&Object::new("Task").with("id", 1), UpdatePolicy::OverwriteAll)?;
                Err::<(), _>(Error::Unknown)
            })
            .unwrap_err();
        assert_eq!(err, Error::Unknown);
        assert_eq!(first.get("note"), Some(Value::from("new")));
    }

    #[test]
    fn test_add_without_primary_key_always_inserts() {
        let store = test_store("no-pk");
        store
            .write(|tx| {
                tx.add(&Object::new("Log").with("line", "x"), UpdatePolicy::OverwriteAll)?;
                tx.add(&Object::new("Log").with("line", "x"), UpdatePolicy::OverwriteAll)
            })
            .unwrap();
        assert_eq!(store.objects("Log").unwrap().len(), 2);
    }

    #[test]
    fn test_add_twice_is_noop() {
        let store = test_store("twice");
        let object = task(1, "a");
        store
            .write(|tx| {
                tx.add(&object, UpdatePolicy::FailOnCollision)?;
                tx.add(&object, UpdatePolicy::FailOnCollision)
            })
            .unwrap();
        assert_eq!(store.objects("Task").unwrap().len(), 1);
    }

    #[test]
    fn test_add_owned_by_other_store() {
        let a = test_store("a");
        let b = test_store("b");
        let object = task(1, "a");
        a.write(|tx| tx.add(&object, UpdatePolicy::FailOnCollision))
            .unwrap();

        let err = b
            .write(|tx| tx.add(&object, UpdatePolicy::OverwriteAll))
            .unwrap_err();
        assert_eq!(err, Error::OwnedByOtherStore);
    }

    #[test]
    fn test_add_unknown_type_and_missing_key() {
        let store = test_store("errors");
        let err = store
            .write(|tx| tx.add(&Object::new("Nope"), UpdatePolicy::FailOnCollision))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownObjectType { .. }));

        let err = store
            .write(|tx| tx.add(&Object::new("Task"), UpdatePolicy::FailOnCollision))
            .unwrap_err();
        assert!(matches!(err, Error::MissingPrimaryKey { .. }));
    }

    #[test]
    fn test_set_and_delete() {
        let store = test_store("set-delete");
        let object = task(1, "a");
        store
            .write(|tx| tx.add(&object, UpdatePolicy::FailOnCollision))
            .unwrap();

        store.write(|tx| tx.set(&object, "name", "b")).unwrap();
        assert_eq!(object.get("name"), Some(Value::from("b")));

        store.write(|tx| tx.delete(&object)).unwrap();
        assert!(object.is_invalidated());
        assert!(object.store().is_none());

        let err = store.write(|tx| tx.delete(&object)).unwrap_err();
        assert_eq!(err, Error::ObjectInvalidated);
    }

    #[test]
    fn test_delete_detached_fails() {
        let store = test_store("detached");
        let err = store.write(|tx| tx.delete(&task(1, "a"))).unwrap_err();
        assert_eq!(err, Error::ObjectNotManaged);
    }

    #[test]
    fn test_delete_all_of_type() {
        let store = test_store("delete-all");
        store
            .write(|tx| {
                tx.add_all(&[task(1, "a"), task(2, "b")], UpdatePolicy::FailOnCollision)?;
                tx.add(&Object::new("Log"), UpdatePolicy::FailOnCollision)
            })
            .unwrap();

        store.write(|tx| tx.delete_all_of("Task")).unwrap();
        assert_eq!(store.objects("Task").unwrap().len(), 0);
        assert_eq!(store.objects("Log").unwrap().len(), 1);

        store.write(|tx| tx.delete_everything()).unwrap();
        assert_eq!(store.objects("Log").unwrap().len(), 0);
    }

    #[test]
    fn test_rollback_restores_deleted() {
        let store = test_store("rollback");
        let object = task(1, "a");
        store
            .write(|tx| tx.add(&object, UpdatePolicy::FailOnCollision))
            .unwrap();

        let _ = store.write(|tx| {
            tx.set(&object, "name", "z")?;
            tx.delete(&object)?;
            Err::<(), _>(Error::Unknown)
        });

        assert!(object.is_managed());
        assert_eq!(object.get("name"), Some(Value::from("a")));
    }
}
