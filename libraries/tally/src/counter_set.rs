//! # CounterSet
//! The in-memory copy of a user's counters that the UI renders from.
//! It is mutated optimistically, before the remote store confirms anything.

use indexmap::IndexMap;

use crate::data_model::{Counter, CounterId, default_counters};

/// Counters keyed by id, iterated in the order ids were first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CounterSet {
    counters: IndexMap<CounterId, i64>,
}

impl CounterSet {
    pub fn defaults() -> Self {
        Self::from_counters(default_counters())
    }

    /// Builds a set from a list. If an id repeats, the first occurrence wins.
    pub fn from_counters(counters: impl IntoIterator<Item = Counter>) -> Self {
        let mut set = IndexMap::new();
        for Counter { id, value } in counters {
            if set.contains_key(&id) {
                log::warn!("Duplicate counter id {id} ignored");
                continue;
            }
            set.insert(id, value);
        }
        Self { counters: set }
    }

    pub fn get(&self, id: &CounterId) -> Option<i64> {
        self.counters.get(id).copied()
    }

    /// Adds `delta` to the counter, creating it at 0 first if it is missing.
    /// There is no floor, so values may go negative. Values stop at the `i64` bounds
    /// rather than wrapping, the same as Firestore's increment transform.
    pub fn apply_delta(&mut self, id: &CounterId, delta: i64) -> i64 {
        let value = self.counters.entry(id.clone()).or_insert(0);
        *value = value.saturating_add(delta);
        *value
    }

    pub fn remove(&mut self, id: &CounterId) -> Option<i64> {
        self.counters.shift_remove(id)
    }

    /// Sets every value to zero, keeping the ids.
    pub fn reset_values(&mut self) {
        self.counters.values_mut().for_each(|value| *value = 0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CounterId, i64)> {
        self.counters.iter().map(|(id, value)| (id, *value))
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Counter> {
        self.iter()
            .map(|(id, value)| Counter::new(id.clone(), value))
            .collect()
    }
}
