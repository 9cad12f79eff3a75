//! Eddy Core - Core types and store interfaces for Eddy.
//!
//! This crate provides the vocabulary shared by notifying stores and the
//! reactive bridge built on top of them:
//!
//! - `Value`: Property values stored on objects
//! - `Changeset`: Positional diff between two states of a collection
//! - `CollectionChange` / `ObjectChange` / `StoreNotification`: What a store reports
//! - `NotificationToken`: Keeps a callback registration alive
//! - `Dispatcher`: Target queue for notification delivery
//! - `source`: Traits a store implements (`CollectionSource`, `WriteStore`, ...)
//! - `Error`: Error types shared by every crate
//!
//! # Example
//!
//! ```rust
//! use eddy_core::Changeset;
//!
//! let old = [1u64, 2, 3];
//! let new = [1u64, 3, 4];
//! let changes = Changeset::compute(&old, &new, |_| false);
//!
//! assert_eq!(changes.deleted, vec![1]);
//! assert_eq!(changes.inserted, vec![2]);
//! assert_eq!(changes.apply(&old, &new), new.to_vec());
//! ```

mod change;
mod dispatch;
mod error;
pub mod source;
mod token;
mod value;

pub use change::{
    Changeset, CollectionChange, ObjectChange, PropertyChange, StoreNotification, UpdatePolicy,
};
pub use dispatch::{Dispatcher, Task};
pub use error::{Error, Result};
pub use source::{
    CollectionCallback, CollectionSource, ObjectCallback, ObjectSource, StoreCallback,
    StoreObject, StoreProvider, StoreSource, StoreWriter, WriteStore,
};
pub use token::NotificationToken;
pub use value::Value;
