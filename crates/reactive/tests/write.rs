//! Integration tests for store-writing subscribers.

use eddy_core::{Error, PropertyChange, StoreNotification, UpdatePolicy};
use eddy_reactive::{
    observe_property_changes, observe_store, Cancellable, ErrorHandler, PassthroughSubject,
    PublisherExt, StoreBinding, WriteExt,
};
use eddy_store::{Environment, Object, ObjectSchema, Store, StoreConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

fn config(identifier: &str) -> StoreConfig {
    StoreConfig::in_memory(identifier)
        .with_object_type(ObjectSchema::new("Message").primary_key("id"))
}

fn message(id: i64, name: &str) -> Object {
    Object::new("Message").with("id", id).with("name", name)
}

fn ids(store: &Store) -> Vec<i64> {
    let mut ids: Vec<i64> = store
        .objects("Message")
        .unwrap()
        .to_vec()
        .iter()
        .filter_map(|o| o.get("id").and_then(|v| v.as_i64()))
        .collect();
    ids.sort_unstable();
    ids
}

fn name_for(store: &Store, id: i64) -> Option<String> {
    store
        .object_for_primary_key("Message", id)
        .unwrap()
        .and_then(|o| o.get("name"))
        .and_then(|v| v.as_str().map(str::to_string))
}

fn error_log() -> (Arc<Mutex<Vec<Error>>>, ErrorHandler) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors_clone = errors.clone();
    let handler: ErrorHandler = Arc::new(move |err: Error| errors_clone.lock().push(err));
    (errors, handler)
}

/// Counts the `DidChange` notifications `store` reports.
fn commits(store: &Store) -> (Arc<Mutex<usize>>, Cancellable) {
    let count = Arc::new(Mutex::new(0));
    let count_clone = count.clone();
    let cancellable = observe_store(store)
        .filter(|(_, n): &(Store, StoreNotification)| *n == StoreNotification::DidChange)
        .sink_values(move |_| *count_clone.lock() += 1);
    (count, cancellable)
}

#[test]
fn test_add_with_update_policy() {
    let store = Store::open(config("add"));
    let subject = PassthroughSubject::<Object>::new();
    let _cancellable =
        subject.add_to_store(StoreBinding::Store(store.clone()), UpdatePolicy::OverwriteAll, None);

    subject.send(message(1, "one"));
    subject.send(message(2, "two"));
    assert_eq!(ids(&store), vec![1, 2]);

    subject.send(message(1, "updated"));
    subject.send(message(3, "three"));
    assert_eq!(ids(&store), vec![1, 2, 3]);
    assert_eq!(name_for(&store, 1).as_deref(), Some("updated"));
}

#[test]
fn test_add_failure_is_reported_and_stream_continues() {
    let store = Store::open(config("add-collision"));
    let (errors, handler) = error_log();
    let subject = PassthroughSubject::<Object>::new();
    let _cancellable = subject.add_to_store(
        StoreBinding::Store(store.clone()),
        UpdatePolicy::FailOnCollision,
        Some(handler),
    );

    subject.send(message(1, "one"));
    subject.send(message(1, "again"));
    subject.send(message(2, "two"));

    assert_eq!(ids(&store), vec![1, 2]);
    assert_eq!(name_for(&store, 1).as_deref(), Some("one"));
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], Error::PrimaryKeyCollision { .. }));
}

#[test]
fn test_add_all_in_one_transaction() {
    let store = Store::open(config("add-all"));
    let (errors, handler) = error_log();
    let subject = PassthroughSubject::<Vec<Object>>::new();
    let _cancellable = subject.add_all_to_store(
        StoreBinding::Store(store.clone()),
        UpdatePolicy::FailOnCollision,
        Some(handler),
    );

    subject.send(vec![message(1, "one"), message(2, "two")]);
    assert_eq!(ids(&store), vec![1, 2]);

    // The collision rolls back the whole sequence
    subject.send(vec![message(3, "three"), message(1, "again")]);
    assert_eq!(ids(&store), vec![1, 2]);
    assert_eq!(errors.lock().len(), 1);
}

#[test]
fn test_add_through_provider() {
    let environment = Arc::new(Environment::new(config("default")));
    let store = environment.open(&config("provided")).unwrap();
    let subject = PassthroughSubject::<Object>::new();
    let _cancellable = subject.add_to_store(
        StoreBinding::provider(environment.provider(config("provided"))),
        UpdatePolicy::FailOnCollision,
        None,
    );

    subject.send(message(1, "one"));
    assert_eq!(ids(&store), vec![1]);
}

#[test]
fn test_overwrite_policies_drive_property_changes() {
    let store = Store::open(config("overwrite-properties"));
    let stored = message(1, "first").with("body", "hello");
    store
        .write(|tx| tx.add(&stored, UpdatePolicy::FailOnCollision))
        .unwrap();

    let changes = Arc::new(Mutex::new(Vec::new()));
    let changes_clone = changes.clone();
    let _observer = observe_property_changes(&stored)
        .map(|change: PropertyChange| {
            let value = change
                .new_value
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            format!("{}:{}", change.name, value)
        })
        .sink_values(move |change| changes_clone.lock().push(change));

    let modified = PassthroughSubject::<Object>::new();
    let _modified = modified.add_to_store(
        StoreBinding::Store(store.clone()),
        UpdatePolicy::OverwriteModified,
        None,
    );
    modified.send(message(1, "second").with("body", "hello"));
    assert_eq!(*changes.lock(), vec!["name:second"]);

    let all = PassthroughSubject::<Object>::new();
    let _all = all.add_to_store(
        StoreBinding::Store(store.clone()),
        UpdatePolicy::OverwriteAll,
        None,
    );
    all.send(message(1, "second").with("body", "hello"));
    let mut overwritten = changes.lock()[1..].to_vec();
    overwritten.sort();
    assert_eq!(overwritten, vec!["body:hello", "name:second"]);
}

#[test]
fn test_delete_uses_owning_store() {
    let store = Store::open(config("delete"));
    let first = message(1, "one");
    let second = message(2, "two");
    store
        .write(|tx| tx.add_all([&first, &second], UpdatePolicy::FailOnCollision))
        .unwrap();

    let (errors, handler) = error_log();
    let subject = PassthroughSubject::<Object>::new();
    let _cancellable = subject.delete_from_store(None, Some(handler));

    subject.send(first.clone());
    assert_eq!(ids(&store), vec![2]);
    assert!(first.is_invalidated());

    let (commits, _observer) = commits(&store);
    subject.send(message(3, "detached"));
    subject.send(first.clone());
    assert_eq!(*errors.lock(), vec![Error::Unknown, Error::Unknown]);
    assert_eq!(ids(&store), vec![2]);
    assert_eq!(*commits.lock(), 0);
}

#[test]
fn test_delete_with_binding() {
    let store = Store::open(config("delete-bound"));
    let first = message(1, "one");
    store
        .write(|tx| tx.add(&first, UpdatePolicy::FailOnCollision))
        .unwrap();

    let subject = PassthroughSubject::<Object>::new();
    let _cancellable = subject.delete_from_store(Some(StoreBinding::Store(store.clone())), None);
    subject.send(first);
    assert!(ids(&store).is_empty());
}

#[test]
fn test_delete_all_sequences() {
    let store = Store::open(config("delete-all"));
    let objects: Vec<Object> = (1..=3).map(|id| message(id, "x")).collect();
    store
        .write(|tx| tx.add_all(&objects, UpdatePolicy::FailOnCollision))
        .unwrap();

    let (errors, handler) = error_log();
    let subject = PassthroughSubject::<Vec<Object>>::new();
    let _cancellable = subject.delete_all_from_store(None, Some(handler));

    let (commits, _observer) = commits(&store);
    subject.send(objects[..2].to_vec());
    assert_eq!(ids(&store), vec![3]);
    assert_eq!(*commits.lock(), 1);

    // Neither an empty sequence nor removed objects open a transaction
    subject.send(Vec::new());
    subject.send(objects[..2].to_vec());
    assert_eq!(*errors.lock(), vec![Error::Unknown, Error::Unknown]);
    assert_eq!(ids(&store), vec![3]);
    assert_eq!(*commits.lock(), 1);
}

#[test]
fn test_adds_from_many_threads() {
    let store = Store::open(config("threads"));
    let subject = PassthroughSubject::<Object>::new();
    let _cancellable = subject.add_to_store(
        StoreBinding::Store(store.clone()),
        UpdatePolicy::FailOnCollision,
        None,
    );

    let senders: Vec<_> = (0..4)
        .map(|t| {
            let subject = subject.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    subject.send(message(t * 10 + i, "threaded"));
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    assert_eq!(ids(&store), (0..40).collect::<Vec<i64>>());
}

#[test]
fn test_cancelled_sink_stops_writing() {
    let store = Store::open(config("cancelled"));
    let subject = PassthroughSubject::<Object>::new();
    let cancellable = subject.add_to_store(
        StoreBinding::Store(store.clone()),
        UpdatePolicy::FailOnCollision,
        None,
    );

    subject.send(message(1, "one"));
    cancellable.cancel();
    subject.send(message(2, "two"));

    assert_eq!(ids(&store), vec![1]);
    assert_eq!(subject.subscriber_count(), 0);
}
