//! Journal for tracking changes within a write transaction.
//!
//! The journal keeps an ordered list of entries used to undo the transaction
//! and a coalesced [`ChangeDiff`] used to build notifications on commit.

use crate::object::Object;
use crate::table::{ObjectKey, Properties, StoreData};
use eddy_core::{PropertyChange, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// A single journal entry representing a change.
pub(crate) enum JournalEntry {
    /// An object was inserted.
    Insert { object_type: String, key: ObjectKey },
    /// A property was written.
    Update {
        object_type: String,
        key: ObjectKey,
        property: String,
        old: Option<Value>,
    },
    /// An object was deleted.
    Delete {
        object_type: String,
        key: ObjectKey,
        values: Properties,
    },
    /// A detached handle was bound to a stored object.
    Attach { object: Object, values: Properties },
}

/// Net effect of a transaction, keyed by object.
#[derive(Clone, Debug, Default)]
pub struct ChangeDiff {
    /// Objects created during the transaction.
    inserted: BTreeSet<ObjectKey>,
    /// Pre-existing objects whose properties changed.
    modified: BTreeMap<ObjectKey, Vec<PropertyChange>>,
    /// Pre-existing objects that were deleted.
    deleted: BTreeSet<ObjectKey>,
}

impl ChangeDiff {
    /// Records an insertion.
    pub fn add(&mut self, key: ObjectKey) {
        self.inserted.insert(key);
    }

    /// Records a property write.
    pub fn modify(&mut self, key: ObjectKey, property: &str, old: Option<Value>, new: Value) {
        // Writes to an object created in this transaction are part of the insert
        if self.inserted.contains(&key) {
            return;
        }
        let changes = self.modified.entry(key).or_default();
        match changes.iter_mut().find(|c| c.name == property) {
            // Keep the first old value
            Some(change) => change.new_value = Some(new),
            None => changes.push(PropertyChange::new(property, old, Some(new))),
        }
    }

    /// Records a deletion.
    pub fn delete(&mut self, key: ObjectKey) {
        if self.inserted.remove(&key) {
            return;
        }
        self.modified.remove(&key);
        self.deleted.insert(key);
    }

    /// Returns inserted keys.
    pub fn inserted(&self) -> &BTreeSet<ObjectKey> {
        &self.inserted
    }

    /// Returns deleted keys.
    pub fn deleted(&self) -> &BTreeSet<ObjectKey> {
        &self.deleted
    }

    /// Returns the property changes of `key`, if it was modified.
    pub fn changes(&self, key: ObjectKey) -> Option<&[PropertyChange]> {
        self.modified.get(&key).map(Vec::as_slice)
    }

    /// Returns true if `key` was modified.
    #[inline]
    pub fn is_modified(&self, key: ObjectKey) -> bool {
        self.modified.contains_key(&key)
    }

    /// Returns true if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Journal for tracking changes within a transaction.
#[derive(Default)]
pub(crate) struct Journal {
    entries: Vec<JournalEntry>,
    diff: ChangeDiff,
}

impl Journal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_insert(&mut self, object_type: &str, key: ObjectKey) {
        self.diff.add(key);
        self.entries.push(JournalEntry::Insert {
            object_type: object_type.to_string(),
            key,
        });
    }

    pub(crate) fn record_update(
        &mut self,
        object_type: &str,
        key: ObjectKey,
        property: &str,
        old: Option<Value>,
        new: Value,
    ) {
        self.diff.modify(key, property, old.clone(), new);
        self.entries.push(JournalEntry::Update {
            object_type: object_type.to_string(),
            key,
            property: property.to_string(),
            old,
        });
    }

    pub(crate) fn record_delete(&mut self, object_type: &str, key: ObjectKey, values: Properties) {
        self.diff.delete(key);
        self.entries.push(JournalEntry::Delete {
            object_type: object_type.to_string(),
            key,
            values,
        });
    }

    pub(crate) fn record_attach(&mut self, object: Object, values: Properties) {
        self.entries.push(JournalEntry::Attach { object, values });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the journal, returning the net diff.
    pub(crate) fn commit(self) -> ChangeDiff {
        self.diff
    }

    /// Undoes every entry in reverse order.
    pub(crate) fn rollback(self, data: &mut StoreData) {
        trace!(entries = self.entries.len(), "rolling back journal");
        for entry in self.entries.into_iter().rev() {
            match entry {
                JournalEntry::Insert { object_type, key } => {
                    if let Ok(table) = data.table_mut(&object_type) {
                        table.remove(key);
                    }
                }
                JournalEntry::Update {
                    object_type,
                    key,
                    property,
                    old,
                } => {
                    if let Ok(table) = data.table_mut(&object_type) {
                        table.restore(key, &property, old);
                    }
                }
                JournalEntry::Delete {
                    object_type,
                    key,
                    values,
                } => {
                    if let Ok(table) = data.table_mut(&object_type) {
                        // The record was valid when deleted, so it fits again
                        let _ = table.insert(key, values);
                    }
                }
                JournalEntry::Attach { object, values } => object.detach(values),
            }
        }
    }
}
