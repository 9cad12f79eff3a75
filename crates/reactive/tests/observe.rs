//! Integration tests for publishers over an in-memory store.

use eddy_core::{Changeset, Dispatcher, Error, PropertyChange, StoreNotification, UpdatePolicy};
use eddy_reactive::{
    observe_array, observe_array_with_changeset, observe_changeset, observe_collection,
    observe_object, observe_property_changes, observe_store, Cancellable, Completion,
    ObserveOptions, Publisher, PublisherExt,
};
use eddy_store::{Object, ObjectSchema, Results, Store, StoreConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

fn open_store(identifier: &str) -> Store {
    Store::open(
        StoreConfig::in_memory(identifier)
            .with_object_type(ObjectSchema::new("Message").primary_key("id")),
    )
}

fn message(id: i64, name: &str) -> Object {
    Object::new("Message").with("id", id).with("name", name)
}

fn add(store: &Store, object: &Object) {
    store
        .write(|tx| tx.add(object, UpdatePolicy::FailOnCollision))
        .unwrap();
}

struct Recorded<T> {
    values: Arc<Mutex<Vec<T>>>,
    completion: Arc<Mutex<Option<Completion>>>,
    cancellable: Cancellable,
}

impl<T: Clone> Recorded<T> {
    fn values(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    fn completion(&self) -> Option<Completion> {
        self.completion.lock().clone()
    }
}

fn record<P: Publisher>(publisher: &P) -> Recorded<P::Output> {
    let values = Arc::new(Mutex::new(Vec::new()));
    let completion = Arc::new(Mutex::new(None));
    let values_clone = values.clone();
    let completion_clone = completion.clone();
    let cancellable = publisher.sink(
        move |v| values_clone.lock().push(v),
        move |c| *completion_clone.lock() = Some(c),
    );
    Recorded {
        values,
        completion,
        cancellable,
    }
}

fn describe(results: &Results, changes: Option<&Changeset>) -> String {
    match changes {
        None => format!("count:{}", results.len()),
        Some(c) => format!(
            "count:{} inserted:{:?} deleted:{:?} updated:{:?}",
            results.len(),
            c.inserted,
            c.deleted,
            c.updated
        ),
    }
}

fn count(messages: &Results) -> impl Publisher<Output = usize> {
    observe_array(messages, ObserveOptions::new()).map(|v: Vec<Object>| v.len())
}

fn name_of(object: &Object) -> String {
    object
        .get("name")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[test]
fn test_collection_emits_on_every_change() {
    let store = open_store("collection");
    let messages = store.objects("Message").unwrap();
    let recorded = record(
        &observe_collection(&messages, ObserveOptions::new()).map(|r: Results| r.len()),
    );

    add(&store, &message(1, "first"));
    add(&store, &message(2, "second"));

    assert_eq!(recorded.values(), vec![0, 1, 2]);
    assert!(recorded.completion().is_none());
}

#[test]
fn test_changeset_descriptions() {
    let store = open_store("changeset");
    let messages = store.objects("Message").unwrap();
    let recorded = record(
        &observe_changeset(&messages, ObserveOptions::new())
            .map(|(results, changes): (Results, Option<Changeset>)| {
                describe(&results, changes.as_ref())
            }),
    );

    let first = message(1, "first");
    add(&store, &first);
    store.write(|tx| tx.delete(&first)).unwrap();

    assert_eq!(
        recorded.values(),
        vec![
            "count:0".to_string(),
            "count:1 inserted:[0] deleted:[] updated:[]".to_string(),
            "count:0 inserted:[] deleted:[0] updated:[]".to_string(),
        ]
    );
}

#[test]
fn test_array_with_changeset_reports_updates() {
    let store = open_store("array-changeset");
    let first = message(1, "first");
    add(&store, &first);
    let messages = store.objects("Message").unwrap();
    let recorded = record(&observe_array_with_changeset(
        &messages,
        ObserveOptions::new(),
    ));

    store.write(|tx| tx.set(&first, "name", "renamed")).unwrap();

    let values = recorded.values();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].1, None);
    assert_eq!(name_of(&values[1].0[0]), "renamed");
    assert_eq!(
        values[1].1,
        Some(Changeset::from_indices(vec![], vec![], vec![0]))
    );
}

#[test]
fn test_asynchronous_start_waits_for_store() {
    let store = open_store("async-start");
    add(&store, &message(1, "first"));
    let messages = store.objects("Message").unwrap();
    let options = ObserveOptions::new().synchronous_start(false);

    let recorded = record(&observe_array(&messages, options).map(|v: Vec<Object>| v.len()));
    assert!(recorded.values().is_empty());
    assert_eq!(store.observer_count(), 1);

    add(&store, &message(2, "second"));
    assert_eq!(recorded.values(), vec![2]);
}

#[test]
fn test_asynchronous_changeset_skips_store_snapshot() {
    let store = open_store("async-changeset");
    let messages = store.objects("Message").unwrap();
    let options = ObserveOptions::new().synchronous_start(false);
    let recorded = record(
        &observe_changeset(&messages, options)
            .map(|(results, changes): (Results, Option<Changeset>)| {
                describe(&results, changes.as_ref())
            }),
    );
    assert!(recorded.values().is_empty());

    add(&store, &message(1, "first"));
    assert_eq!(
        recorded.values(),
        vec!["count:1 inserted:[0] deleted:[] updated:[]".to_string()]
    );
}

#[test]
fn test_registration_is_lazy_and_released() {
    let store = open_store("lazy");
    let messages = store.objects("Message").unwrap();
    let publisher = observe_array(&messages, ObserveOptions::new());
    assert_eq!(store.observer_count(), 0);

    let first = record(&publisher);
    let second = record(&publisher);
    assert_eq!(store.observer_count(), 2);

    first.cancellable.cancel();
    assert_eq!(store.observer_count(), 1);
    drop(second);
    assert_eq!(store.observer_count(), 0);
}

#[test]
fn test_cancel_silences_stream() {
    let store = open_store("cancel");
    let messages = store.objects("Message").unwrap();
    let recorded = record(&count(&messages));

    add(&store, &message(1, "first"));
    recorded.cancellable.cancel();
    add(&store, &message(2, "second"));

    assert_eq!(*recorded.values.lock(), vec![0, 1]);
    assert!(recorded.completion.lock().is_none());
}

#[test]
fn test_delivery_on_queue() {
    let store = open_store("queue");
    let queue = Dispatcher::new("main");
    let messages = store.objects("Message").unwrap();
    let recorded = record(
        &observe_array(&messages, ObserveOptions::new().on_queue(queue.clone()))
            .map(|v: Vec<Object>| v.len()),
    );
    assert_eq!(recorded.values(), vec![0]);

    add(&store, &message(1, "first"));
    assert_eq!(recorded.values(), vec![0]);

    queue.run_pending();
    assert_eq!(recorded.values(), vec![0, 1]);
}

#[test]
fn test_writes_from_many_threads() {
    let store = open_store("threads");
    let messages = store.objects("Message").unwrap();
    let recorded = record(&count(&messages));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    add(&store, &message(t * 10 + i, "threaded"));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    // Lengths are read at delivery time, so only order and totals are fixed
    let values = recorded.values();
    assert_eq!(values.len(), 41);
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(values.last(), Some(&40));
}

#[test]
fn test_close_fails_collection_stream() {
    let store = open_store("close");
    let messages = store.objects("Message").unwrap();
    let recorded = record(&observe_array(&messages, ObserveOptions::new()));

    store.close();
    assert_eq!(
        recorded.completion(),
        Some(Completion::Failure(Error::StoreClosed))
    );
    assert_eq!(store.observer_count(), 0);

    let late = record(&observe_array(&messages, ObserveOptions::new()));
    assert!(late.values().is_empty());
    assert_eq!(late.completion(), Some(Completion::Failure(Error::StoreClosed)));
}

#[test]
fn test_object_changes_then_deletion() {
    let store = open_store("object");
    let object = message(1, "");
    add(&store, &object);

    let recorded = record(&observe_object(&object, true, None).map(|o: Object| name_of(&o)));
    store.write(|tx| tx.set(&object, "name", "test1")).unwrap();
    store.write(|tx| tx.set(&object, "name", "test2")).unwrap();
    assert_eq!(recorded.values(), vec!["", "test1", "test2"]);
    assert!(recorded.completion().is_none());

    store.write(|tx| tx.delete(&object)).unwrap();
    assert_eq!(
        recorded.completion(),
        Some(Completion::Failure(Error::ObjectDeleted))
    );
    assert_eq!(store.observer_count(), 0);
}

#[test]
fn test_object_filtered_by_properties() {
    let store = open_store("object-filter");
    let object = message(1, "").with("body", "");
    add(&store, &object);

    let recorded = record(
        &observe_object(&object, false, Some(vec!["name".to_string()]))
            .map(|o: Object| name_of(&o)),
    );
    store.write(|tx| tx.set(&object, "body", "ignored")).unwrap();
    store.write(|tx| tx.set(&object, "name", "seen")).unwrap();

    assert_eq!(recorded.values(), vec!["seen"]);
}

#[test]
fn test_unmanaged_object_fails() {
    let recorded = record(&observe_object(&message(1, ""), true, None));
    assert!(recorded.values().is_empty());
    assert_eq!(
        recorded.completion(),
        Some(Completion::Failure(Error::ObjectNotManaged))
    );
}

#[test]
fn test_property_changes() {
    let store = open_store("properties");
    let object = message(1, "");
    add(&store, &object);

    let recorded = record(&observe_property_changes(&object).map(|change: PropertyChange| {
        let value = change
            .new_value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        format!("{}:{}", change.name, value)
    }));
    store.write(|tx| tx.set(&object, "name", "test1")).unwrap();
    store.write(|tx| tx.set(&object, "name", "test2")).unwrap();
    store.write(|tx| tx.delete(&object)).unwrap();

    assert_eq!(recorded.values(), vec!["name:test1", "name:test2"]);
    assert_eq!(
        recorded.completion(),
        Some(Completion::Failure(Error::ObjectDeleted))
    );
}

#[test]
fn test_store_notifications() {
    let store = open_store("store");
    let other = store.new_handle();
    other.set_autorefresh(false);

    let mine = record(&observe_store(&store).map(|(_, n): (Store, StoreNotification)| n));
    let theirs = record(&observe_store(&other).map(|(_, n): (Store, StoreNotification)| n));
    assert!(mine.values().is_empty());

    add(&store, &message(1, "first"));
    other.refresh();

    assert_eq!(mine.values(), vec![StoreNotification::DidChange]);
    assert_eq!(
        theirs.values(),
        vec![StoreNotification::RefreshRequired, StoreNotification::DidChange]
    );
}

#[test]
fn test_take_releases_registration() {
    let store = open_store("take");
    let messages = store.objects("Message").unwrap();
    let recorded = record(&count(&messages).take(2));

    add(&store, &message(1, "first"));
    add(&store, &message(2, "second"));

    assert_eq!(recorded.values(), vec![0, 1]);
    assert_eq!(recorded.completion(), Some(Completion::Finished));
    assert_eq!(store.observer_count(), 0);
}
