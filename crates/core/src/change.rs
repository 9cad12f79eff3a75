//! Change notifications delivered by notifying stores.
//!
//! A `Changeset` describes how an ordered collection moved from one state to
//! the next: `deleted` holds positions in the pre-change ordering, `inserted`
//! and `updated` hold positions in the post-change ordering.

use crate::error::Error;
use crate::value::Value;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};

/// Positional diff between two states of an ordered collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changeset {
    /// Indices (pre-change) of elements that were removed
    pub deleted: Vec<usize>,
    /// Indices (post-change) of elements that were added
    pub inserted: Vec<usize>,
    /// Indices (post-change) of elements whose contents were modified
    pub updated: Vec<usize>,
}

impl Changeset {
    /// Creates a new empty changeset.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a changeset from explicit index lists.
    pub fn from_indices(deleted: Vec<usize>, inserted: Vec<usize>, updated: Vec<usize>) -> Self {
        Self {
            deleted,
            inserted,
            updated,
        }
    }

    /// Computes the changeset between two orderings of element keys.
    ///
    /// Elements that changed relative position are reported as a deletion at
    /// their old index plus an insertion at their new index. Elements that
    /// kept their relative position are reported in `updated` when
    /// `modified` returns true for them.
    pub fn compute<K, F>(old: &[K], new: &[K], modified: F) -> Self
    where
        K: Copy + Eq + Hash,
        F: Fn(&K) -> bool,
    {
        let new_positions: HashMap<K, usize> =
            new.iter().enumerate().map(|(i, k)| (*k, i)).collect();

        // Elements present in both states, in old order, with their new index
        let common: Vec<(usize, usize)> = old
            .iter()
            .enumerate()
            .filter_map(|(i, k)| new_positions.get(k).map(|&j| (i, j)))
            .collect();
        let targets: Vec<usize> = common.iter().map(|&(_, j)| j).collect();

        let mut stable_old = HashSet::new();
        let mut stable_new = HashSet::new();
        for idx in longest_increasing_run(&targets) {
            let (i, j) = common[idx];
            stable_old.insert(i);
            stable_new.insert(j);
        }

        let deleted = (0..old.len()).filter(|i| !stable_old.contains(i)).collect();
        let mut inserted = Vec::new();
        let mut updated = Vec::new();
        for (j, key) in new.iter().enumerate() {
            if !stable_new.contains(&j) {
                inserted.push(j);
            } else if modified(key) {
                updated.push(j);
            }
        }

        Self {
            deleted,
            inserted,
            updated,
        }
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.inserted.is_empty() && self.updated.is_empty()
    }

    /// Returns the total number of changed positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.deleted.len() + self.inserted.len() + self.updated.len()
    }

    /// Applies the structural part of this changeset to `old`, taking
    /// inserted elements from `new`.
    pub fn apply<T: Clone>(&self, old: &[T], new: &[T]) -> Vec<T> {
        let deleted: HashSet<usize> = self.deleted.iter().copied().collect();
        let mut result: Vec<T> = old
            .iter()
            .enumerate()
            .filter(|(i, _)| !deleted.contains(i))
            .map(|(_, v)| v.clone())
            .collect();
        for &j in &self.inserted {
            if let Some(value) = new.get(j) {
                let at = j.min(result.len());
                result.insert(at, value.clone());
            }
        }
        result
    }
}

/// Returns indices into `seq` forming one longest strictly increasing
/// subsequence, in ascending order.
fn longest_increasing_run(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for i in 0..seq.len() {
        let pos = tails.partition_point(|&t| seq[t] < seq[i]);
        prev[i] = if pos > 0 { Some(tails[pos - 1]) } else { None };
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        run.push(i);
        cursor = prev[i];
    }
    run.reverse();
    run
}

/// A notification about an observed collection.
#[derive(Clone, Debug)]
pub enum CollectionChange<C> {
    /// The collection's state when observation started.
    Initial(C),
    /// The collection changed; the changeset describes how.
    Update(C, Changeset),
    /// Observation failed; no further notifications follow.
    Error(Error),
}

/// A single property modification on an observed object.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyChange {
    /// Name of the changed property
    pub name: String,
    /// Value before the change, if the property was set
    pub old_value: Option<Value>,
    /// Value after the change
    pub new_value: Option<Value>,
}

impl PropertyChange {
    /// Creates a new property change.
    pub fn new(name: impl Into<String>, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            old_value,
            new_value,
        }
    }
}

/// A notification about an observed object.
#[derive(Clone, Debug)]
pub enum ObjectChange<O> {
    /// One or more properties of the object changed.
    Changed(O, Vec<PropertyChange>),
    /// The object was deleted from its store.
    Deleted,
    /// Observation failed; no further notifications follow.
    Error(Error),
}

/// Kind of store-level notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreNotification {
    /// The store changed, after a refresh or the end of a write transaction.
    DidChange,
    /// Another handle committed while this handle does not auto-refresh.
    RefreshRequired,
}

/// What happens when an added object collides with an existing object of
/// the same primary key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UpdatePolicy {
    /// Fail the write transaction.
    #[default]
    FailOnCollision,
    /// Replace every property of the existing object.
    OverwriteAll,
    /// Replace only the properties whose values differ.
    OverwriteModified,
}
