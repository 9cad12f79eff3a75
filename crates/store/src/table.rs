//! Record tables backing an in-memory store.

use crate::config::{ObjectSchema, StoreConfig};
use eddy_core::{Error, Result, Value};
use hashbrown::HashMap;
use std::collections::BTreeMap;

/// Stable identity of a stored object. Keys are never reused within a store
/// and grow in insertion order.
pub type ObjectKey = u64;

/// Property values of one object.
pub type Properties = BTreeMap<String, Value>;

/// Records of one object type.
pub(crate) struct Table {
    schema: ObjectSchema,
    /// Key → properties, ordered by insertion.
    records: BTreeMap<ObjectKey, Properties>,
    /// Primary key value → key.
    primary_index: HashMap<Value, ObjectKey>,
}

impl Table {
    pub(crate) fn new(schema: ObjectSchema) -> Self {
        Self {
            schema,
            records: BTreeMap::new(),
            primary_index: HashMap::new(),
        }
    }

    #[inline]
    pub(crate) fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn get(&self, key: ObjectKey) -> Option<&Properties> {
        self.records.get(&key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ObjectKey, &Properties)> {
        self.records.iter().map(|(k, v)| (*k, v))
    }

    /// Finds the record whose primary key equals `value`.
    pub(crate) fn lookup(&self, value: &Value) -> Option<ObjectKey> {
        self.primary_index.get(value).copied()
    }

    /// Extracts the primary key of `values`. Returns `None` for types without
    /// a primary key.
    pub(crate) fn primary_key_of(&self, values: &Properties) -> Result<Option<Value>> {
        let Some(property) = self.schema.primary_key_property() else {
            return Ok(None);
        };
        match values.get(property) {
            Some(value) if value.is_valid_key() => Ok(Some(value.clone())),
            _ => Err(Error::missing_primary_key(self.schema.name(), property)),
        }
    }

    pub(crate) fn insert(&mut self, key: ObjectKey, values: Properties) -> Result<()> {
        if let Some(pk) = self.primary_key_of(&values)? {
            if self.primary_index.contains_key(&pk) {
                return Err(Error::primary_key_collision(self.schema.name(), pk));
            }
            self.primary_index.insert(pk, key);
        }
        self.records.insert(key, values);
        Ok(())
    }

    /// Writes one property and returns its previous value.
    pub(crate) fn set(
        &mut self,
        key: ObjectKey,
        property: &str,
        value: Value,
    ) -> Result<Option<Value>> {
        let record = self.records.get_mut(&key).ok_or(Error::ObjectInvalidated)?;
        if self.schema.primary_key_property() == Some(property)
            && record.get(property) != Some(&value)
        {
            return Err(Error::invalid_operation(format!(
                "primary key of {} cannot be changed",
                self.schema.name()
            )));
        }
        Ok(record.insert(property.to_string(), value))
    }

    /// Restores a property to `previous`, removing it when `None`.
    pub(crate) fn restore(&mut self, key: ObjectKey, property: &str, previous: Option<Value>) {
        if let Some(record) = self.records.get_mut(&key) {
            match previous {
                Some(value) => record.insert(property.to_string(), value),
                None => record.remove(property),
            };
        }
    }

    pub(crate) fn remove(&mut self, key: ObjectKey) -> Option<Properties> {
        let values = self.records.remove(&key)?;
        if let Ok(Some(pk)) = self.primary_key_of(&values) {
            self.primary_index.remove(&pk);
        }
        Some(values)
    }

    /// Returns every key in insertion order.
    pub(crate) fn keys(&self) -> Vec<ObjectKey> {
        self.records.keys().copied().collect()
    }
}

/// All tables of a store plus transaction bookkeeping.
pub(crate) struct StoreData {
    tables: HashMap<String, Table>,
    next_key: ObjectKey,
    pub(crate) in_write: bool,
    pub(crate) closed: bool,
}

impl StoreData {
    pub(crate) fn new(config: &StoreConfig) -> Self {
        let tables = config
            .schemas()
            .map(|schema| (schema.name().to_string(), Table::new(schema.clone())))
            .collect();
        Self {
            tables,
            next_key: 1,
            in_write: false,
            closed: false,
        }
    }

    pub(crate) fn table(&self, object_type: &str) -> Result<&Table> {
        self.tables
            .get(object_type)
            .ok_or_else(|| Error::unknown_object_type(object_type))
    }

    pub(crate) fn table_mut(&mut self, object_type: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(object_type)
            .ok_or_else(|| Error::unknown_object_type(object_type))
    }

    pub(crate) fn record(&self, object_type: &str, key: ObjectKey) -> Option<&Properties> {
        self.tables.get(object_type).and_then(|t| t.get(key))
    }

    pub(crate) fn object_types(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub(crate) fn allocate_key(&mut self) -> ObjectKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }
}
