//! Eddy Store - An in-memory notifying object store.
//!
//! This crate provides a store that implements the `eddy-core` source
//! traits:
//!
//! - `Store`: Handle with scoped write transactions and store notifications
//! - `Object`: Detached or stored object handle
//! - `Results`: Live, filterable and sortable query over one object type
//! - `Environment`: Opens stores by configuration and shares open ones
//!
//! # Example
//!
//! ```rust
//! use eddy_core::UpdatePolicy;
//! use eddy_store::{Object, ObjectSchema, Store, StoreConfig};
//!
//! let store = Store::open(
//!     StoreConfig::in_memory("example")
//!         .with_object_type(ObjectSchema::new("Task").primary_key("id")),
//! );
//!
//! let task = Object::new("Task").with("id", 1).with("name", "write docs");
//! store
//!     .write(|tx| tx.add(&task, UpdatePolicy::FailOnCollision))
//!     .unwrap();
//!
//! assert!(task.is_managed());
//! assert_eq!(store.objects("Task").unwrap().len(), 1);
//! ```

mod config;
mod environment;
mod journal;
mod notify;
mod object;
mod results;
mod store;
mod table;
mod transaction;

pub use config::{ObjectSchema, StoreConfig};
pub use environment::{ConfiguredStore, Environment};
pub use journal::ChangeDiff;
pub use object::Object;
pub use results::{Predicate, Results};
pub use store::Store;
pub use table::{ObjectKey, Properties};
pub use transaction::WriteTransaction;
