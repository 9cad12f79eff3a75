//! Error types for Eddy.

use crate::value::Value;
use thiserror::Error;

/// Result type alias for Eddy operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for store, observation and write-sink operations.
///
/// Observation streams treat every error as terminal. Write sinks hand
/// errors to their error handler and keep running.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// The observed object was removed from its store.
    #[error("Observed object was deleted")]
    ObjectDeleted,
    /// The owning store of an object could not be resolved.
    #[error("Unknown error: could not resolve an owning store")]
    Unknown,
    /// The store has been closed.
    #[error("Store is closed")]
    StoreClosed,
    /// An object with the same primary key already exists.
    #[error("Primary key collision in {object_type}: {key:?}")]
    PrimaryKeyCollision { object_type: String, key: Value },
    /// The object type is not part of the store schema.
    #[error("Unknown object type: {name}")]
    UnknownObjectType { name: String },
    /// The primary key property is missing or not a valid key.
    #[error("Missing primary key {property} on {object_type}")]
    MissingPrimaryKey { object_type: String, property: String },
    /// The object handle refers to a deleted object or a dropped store.
    #[error("Object has been invalidated")]
    ObjectInvalidated,
    /// The operation requires an object managed by a store.
    #[error("Object is not managed by a store")]
    ObjectNotManaged,
    /// The object is managed by a different store.
    #[error("Object is already managed by another store")]
    OwnedByOtherStore,
    /// A write transaction is already open on this store.
    #[error("Store is already in a write transaction")]
    AlreadyInWriteTransaction,
    /// A store was reopened with a conflicting schema.
    #[error("Schema mismatch for store {identifier}")]
    SchemaMismatch { identifier: String },
    /// Invalid operation.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a primary key collision error.
    pub fn primary_key_collision(object_type: impl Into<String>, key: Value) -> Self {
        Error::PrimaryKeyCollision {
            object_type: object_type.into(),
            key,
        }
    }

    /// Creates an unknown object type error.
    pub fn unknown_object_type(name: impl Into<String>) -> Self {
        Error::UnknownObjectType { name: name.into() }
    }

    /// Creates a missing primary key error.
    pub fn missing_primary_key(object_type: impl Into<String>, property: impl Into<String>) -> Self {
        Error::MissingPrimaryKey {
            object_type: object_type.into(),
            property: property.into(),
        }
    }

    /// Creates a schema mismatch error.
    pub fn schema_mismatch(identifier: impl Into<String>) -> Self {
        Error::SchemaMismatch {
            identifier: identifier.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error ends an object observation because its
    /// subject disappeared.
    pub fn is_object_deleted(&self) -> bool {
        matches!(self, Error::ObjectDeleted)
    }
}
