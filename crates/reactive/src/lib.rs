//! Eddy Reactive - Demand-driven publishers over Eddy store notifications.
//!
//! This crate turns the callback registrations of a notifying store into
//! publishers, and offers subscribers that write received values back into
//! a store.
//!
//! # Core Concepts
//!
//! - `Publisher` / `Subscriber` / `Subscription`: The demand-driven protocol
//! - `ObservableBridge`: Lazily registers a store callback per subscriber
//! - `observe_*`: Publishers over collections, objects and stores
//! - `PublisherExt`: `map`, `filter`, `skip`, `take` and closure sinks
//! - `WriteExt`: Sinks that add or delete received objects
//!
//! Registration happens on a subscriber's first non-zero demand. Dropping
//! or cancelling the returned [`Cancellable`] releases it.
//!
//! # Example
//!
//! ```rust
//! use eddy_core::UpdatePolicy;
//! use eddy_reactive::{observe_array, ObserveOptions, PublisherExt};
//! use eddy_store::{Object, ObjectSchema, Store, StoreConfig};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! let store = Store::open(
//!     StoreConfig::in_memory("example")
//!         .with_object_type(ObjectSchema::new("Task").primary_key("id")),
//! );
//! let tasks = store.objects("Task").unwrap();
//!
//! let counts = Arc::new(Mutex::new(Vec::new()));
//! let sink = counts.clone();
//! let _cancellable = observe_array(&tasks, ObserveOptions::new())
//!     .map(|objects: Vec<Object>| objects.len())
//!     .sink_values(move |count| sink.lock().push(count));
//!
//! let task = Object::new("Task").with("id", 1);
//! store
//!     .write(|tx| tx.add(&task, UpdatePolicy::FailOnCollision))
//!     .unwrap();
//!
//! assert_eq!(*counts.lock(), vec![0, 1]);
//! ```

mod bridge;
mod observe;
mod operators;
mod publisher;
mod relay;
mod sink;
mod subject;
mod write;

pub use bridge::{ObservableBridge, Register};
pub use observe::{
    observe_array, observe_array_with_changeset, observe_changeset, observe_collection,
    observe_object, observe_property_changes, observe_store, ObserveOptions,
};
pub use operators::{BoxPublisher, Filter, Map, PublisherExt, Skip, Take};
pub use publisher::{
    Cancellable, Completion, Demand, Publisher, Subscriber, Subscription, SubscriptionHandle,
};
pub use relay::Emitter;
pub use subject::{Just, PassthroughSubject, SubscriptionId};
pub use write::{ErrorHandler, StoreBinding, WriteExt};
