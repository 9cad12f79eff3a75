//! Live queries over stored objects.

use crate::object::Object;
use crate::store::{Store, StoreShared};
use crate::table::{ObjectKey, Properties, StoreData};
use core::fmt;
use eddy_core::{
    CollectionCallback, CollectionSource, Dispatcher, NotificationToken, Result, Value,
};
use std::sync::Arc;

/// Predicate applied to an object's properties.
pub type Predicate = Arc<dyn Fn(&Properties) -> bool + Send + Sync>;

#[derive(Clone, Debug)]
struct SortDescriptor {
    property: String,
    ascending: bool,
}

/// A live, ordered view over the objects of one type.
///
/// Results are evaluated on every access, so they always reflect the latest
/// committed state. Without a sort descriptor objects are ordered by
/// insertion; ties in a sort are broken the same way.
#[derive(Clone)]
pub struct Results {
    store: Store,
    object_type: String,
    filter: Option<Predicate>,
    sort: Option<SortDescriptor>,
}

impl Results {
    pub(crate) fn new(store: Store, object_type: &str) -> Self {
        Self {
            store,
            object_type: object_type.to_string(),
            filter: None,
            sort: None,
        }
    }

    /// Returns the object type.
    #[inline]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Returns the store this query runs against.
    #[inline]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Narrows the results to objects matching `predicate`, in addition to
    /// any existing filter.
    pub fn filter<F>(&self, predicate: F) -> Results
    where
        F: Fn(&Properties) -> bool + Send + Sync + 'static,
    {
        let filter: Predicate = match self.filter.clone() {
            Some(existing) => {
                Arc::new(move |values: &Properties| existing(values) && predicate(values))
            }
            None => Arc::new(predicate),
        };
        Results {
            filter: Some(filter),
            ..self.clone()
        }
    }

    /// Orders the results by `property`. Missing values sort as null.
    pub fn sorted(&self, property: impl Into<String>, ascending: bool) -> Results {
        Results {
            sort: Some(SortDescriptor {
                property: property.into(),
                ascending,
            }),
            ..self.clone()
        }
    }

    /// Evaluates the query against `data`.
    pub(crate) fn keys_in(&self, data: &StoreData) -> Vec<ObjectKey> {
        let Ok(table) = data.table(&self.object_type) else {
            return Vec::new();
        };
        let matching = table
            .iter()
            .filter(|(_, values)| self.filter.as_ref().map_or(true, |f| f(*values)));

        match &self.sort {
            None => matching.map(|(key, _)| key).collect(),
            Some(sort) => {
                let mut rows: Vec<(ObjectKey, Value)> = matching
                    .map(|(key, values)| {
                        let value = values.get(&sort.property).cloned().unwrap_or(Value::Null);
                        (key, value)
                    })
                    .collect();
                // Stable, so equal values keep insertion order
                if sort.ascending {
                    rows.sort_by(|a, b| a.1.cmp(&b.1));
                } else {
                    rows.sort_by(|a, b| b.1.cmp(&a.1));
                }
                rows.into_iter().map(|(key, _)| key).collect()
            }
        }
    }

    /// Returns the keys of the matching objects in order.
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.store.shared().read(|data| self.keys_in(data))
    }

    /// Returns the number of matching objects.
    pub fn len(&self) -> usize {
        if self.filter.is_none() {
            return self
                .store
                .shared()
                .read(|data| data.table(&self.object_type).map_or(0, |t| t.len()));
        }
        self.keys().len()
    }

    /// Returns true if no object matches.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the object at `index`.
    pub fn get(&self, index: usize) -> Option<Object> {
        self.keys().get(index).map(|key| self.object(*key))
    }

    /// Returns the first matching object.
    pub fn first(&self) -> Option<Object> {
        self.get(0)
    }

    /// Returns the last matching object.
    pub fn last(&self) -> Option<Object> {
        self.keys().last().map(|key| self.object(*key))
    }

    /// Returns the position of `object`, if it matches.
    pub fn index_of(&self, object: &Object) -> Option<usize> {
        let key = object.key()?;
        if !object
            .store()
            .map_or(false, |store| store.same_store(&self.store))
        {
            return None;
        }
        self.keys().iter().position(|k| *k == key)
    }

    /// Materializes the matching objects in order.
    pub fn to_vec(&self) -> Vec<Object> {
        self.keys().into_iter().map(|key| self.object(key)).collect()
    }

    fn object(&self, key: ObjectKey) -> Object {
        Object::managed(self.store.shared(), &self.object_type, key)
    }
}

impl fmt::Debug for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("object_type", &self.object_type)
            .field("filtered", &self.filter.is_some())
            .field("sort", &self.sort)
            .finish()
    }
}

impl CollectionSource for Results {
    type Element = Object;

    fn observe(
        &self,
        queue: Option<&Dispatcher>,
        callback: CollectionCallback<Self>,
    ) -> Result<NotificationToken> {
        StoreShared::observe_collection(self.store.shared(), self.clone(), queue, callback)
    }

    fn len(&self) -> usize {
        Results::len(self)
    }

    fn to_vec(&self) -> Vec<Object> {
        Results::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ObjectSchema, StoreConfig};
    use eddy_core::{Changeset, CollectionChange, UpdatePolicy};
    use parking_lot::Mutex;

    fn test_store() -> Store {
        Store::open(
            StoreConfig::in_memory("results")
                .with_object_type(ObjectSchema::new("Task").primary_key("id")),
        )
    }

    fn add(store: &Store, id: i64, rank: i64) -> Object {
        let object = Object::new("Task").with("id", id).with("rank", rank);
        store
            .write(|tx| tx.add(&object, UpdatePolicy::FailOnCollision))
            .unwrap();
        object
    }

    #[test]
    fn test_insertion_order() {
        let store = test_store();
        let a = add(&store, 3, 0);
        let b = add(&store, 1, 0);
        let results = store.objects("Task").unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.to_vec(), vec![a.clone(), b.clone()]);
        assert_eq!(results.first(), Some(a));
        assert_eq!(results.last(), Some(b.clone()));
        assert_eq!(results.index_of(&b), Some(1));
        assert_eq!(results.get(2), None);
    }

    #[test]
    fn test_filter_and_sort() {
        let store = test_store();
        add(&store, 1, 30);
        add(&store, 2, 10);
        add(&store, 3, 20);
        add(&store, 4, 10);

        let results = store
            .objects("Task")
            .unwrap()
            .filter(|v| v.get("rank").and_then(Value::as_i64).map_or(false, |r| r < 30))
            .sorted("rank", true);
        let ids: Vec<_> = results
            .to_vec()
            .iter()
            .map(|o| o.get("id").and_then(|v| v.as_i64()))
            .collect();
        assert_eq!(ids, vec![Some(2), Some(4), Some(3)]);

        let descending = store.objects("Task").unwrap().sorted("rank", false);
        let first = descending.first().unwrap();
        assert_eq!(first.get("id"), Some(Value::Int(1)));
    }

    #[test]
    fn test_observe_reports_initial_then_updates() {
        let store = test_store();
        let results = store.objects("Task").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_clone = log.clone();
        let _token = results
            .observe(
                None,
                Box::new(move |change| {
                    let entry = match change {
                        CollectionChange::Initial(r) => (r.len(), None),
                        CollectionChange::Update(r, cs) => (r.len(), Some(cs)),
                        CollectionChange::Error(_) => (usize::MAX, None),
                    };
                    log_clone.lock().push(entry);
                }),
            )
            .unwrap();

        let object = add(&store, 1, 0);
        store.write(|tx| tx.set(&object, "rank", 5)).unwrap();
        store.write(|tx| tx.delete(&object)).unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                (0, None),
                (1, Some(Changeset::from_indices(vec![], vec![0], vec![]))),
                (1, Some(Changeset::from_indices(vec![], vec![], vec![0]))),
                (0, Some(Changeset::from_indices(vec![0], vec![], vec![]))),
            ]
        );
    }

    #[test]
    fn test_observe_on_queue() {
        let store = test_store();
        let queue = Dispatcher::new("main");
        let count = Arc::new(Mutex::new(0));

        let count_clone = count.clone();
        let _token = store
            .objects("Task")
            .unwrap()
            .observe(Some(&queue), Box::new(move |_| *count_clone.lock() += 1))
            .unwrap();
        add(&store, 1, 0);

        assert_eq!(*count.lock(), 0);
        assert_eq!(queue.run_pending(), 2);
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn test_unrelated_write_is_silent() {
        let store = test_store();
        let results = store
            .objects("Task")
            .unwrap()
            .filter(|v| v.get("rank") == Some(&Value::Int(1)));
        let count = Arc::new(Mutex::new(0));

        let count_clone = count.clone();
        let _token = results
            .observe(None, Box::new(move |_| *count_clone.lock() += 1))
            .unwrap();
        add(&store, 1, 0);

        // Only the initial notification
        assert_eq!(*count.lock(), 1);
    }
}
