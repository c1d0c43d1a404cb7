use std::collections::HashMap;
use std::collections::hash_map::Iter;

use crate::file_object::FileObject;
use crate::partition_key::PartitionKey;

/// Immutable point-in-time view of every record known to the state store,
/// tagged with the log position it was captured at. Superseded by later
/// snapshots, never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    offset: u64,
    states: HashMap<PartitionKey, FileObject>,
}

impl StateSnapshot {
    pub fn new(offset: u64, states: HashMap<PartitionKey, FileObject>) -> Self {
        Self { offset, states }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Log position this snapshot reflects; `0` when nothing was ever written.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.states.contains_key(key)
    }

    pub fn get(&self, key: &PartitionKey) -> Option<&FileObject> {
        self.states.get(key)
    }

    pub fn iter(&self) -> Iter<'_, PartitionKey, FileObject> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl<'a> IntoIterator for &'a StateSnapshot {
    type Item = (&'a PartitionKey, &'a FileObject);
    type IntoIter = Iter<'a, PartitionKey, FileObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.iter()
    }
}
