//! Store configuration and object schemas.

use hashbrown::HashMap;

/// Schema of one object type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSchema {
    /// Type name.
    name: String,
    /// Primary key property, if the type has one.
    primary_key: Option<String>,
}

impl ObjectSchema {
    /// Creates a schema for a type without a primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
        }
    }

    /// Sets the primary key property.
    pub fn primary_key(mut self, property: impl Into<String>) -> Self {
        self.primary_key = Some(property.into());
        self
    }

    /// Returns the type name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the primary key property.
    #[inline]
    pub fn primary_key_property(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }
}

/// Configuration used to open a store.
///
/// Two configurations with the same identifier resolve to the same store
/// within one [`Environment`](crate::Environment).
#[derive(Clone, Debug)]
pub struct StoreConfig {
    identifier: String,
    schemas: HashMap<String, ObjectSchema>,
    autorefresh: bool,
}

impl StoreConfig {
    /// Creates a configuration for an in-memory store.
    pub fn in_memory(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            schemas: HashMap::new(),
            autorefresh: true,
        }
    }

    /// Registers an object type.
    pub fn with_object_type(mut self, schema: ObjectSchema) -> Self {
        self.schemas.insert(schema.name().to_string(), schema);
        self
    }

    /// Sets whether handles opened from this configuration advance to the
    /// latest version on their own after another handle commits.
    pub fn autorefresh(mut self, enabled: bool) -> Self {
        self.autorefresh = enabled;
        self
    }

    /// Returns the store identifier.
    #[inline]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the default autorefresh setting for new handles.
    #[inline]
    pub fn is_autorefresh(&self) -> bool {
        self.autorefresh
    }

    /// Returns the schema of `object_type`.
    pub fn schema(&self, object_type: &str) -> Option<&ObjectSchema> {
        self.schemas.get(object_type)
    }

    /// Returns all registered schemas.
    pub fn schemas(&self) -> impl Iterator<Item = &ObjectSchema> {
        self.schemas.values()
    }

    /// Returns true if both configurations declare the same object types.
    pub fn same_schema(&self, other: &StoreConfig) -> bool {
        self.schemas == other.schemas
    }
}
