//! Multimap: key to set-of-values mapping.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A mapping from a key to an unordered set of associated values.
///
/// Duplicate (key, value) pairs collapse; a key with no remaining values is
/// removed from the map entirely.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Eq + Hash, V: Serialize + Eq + Hash",
    deserialize = "K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de> + Eq + Hash"
))]
pub struct Multimap<K, V> {
    entries: HashMap<K, HashSet<V>>,
    /// Total (key, value) pairs, kept in step with `entries`.
    total: usize,
}

impl<K: Eq + Hash, V: Eq + Hash> Multimap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            total: 0,
        }
    }

    /// Associate a value with a key. Returns false if the pair was already
    /// present.
    pub fn put(&mut self, key: K, value: V) -> bool {
        let inserted = self.entries.entry(key).or_default().insert(value);
        if inserted {
            self.total += 1;
        }
        inserted
    }

    /// Remove a single (key, value) pair. Returns whether it was present.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let removed = match self.entries.get_mut(key) {
            Some(values) => values.remove(value),
            None => false,
        };
        if removed {
            self.total -= 1;
            if self.entries.get(key).is_some_and(|v| v.is_empty()) {
                self.entries.remove(key);
            }
        }
        removed
    }

    /// Remove every value associated with a key, returning them.
    pub fn remove_all(&mut self, key: &K) -> Vec<V> {
        match self.entries.remove(key) {
            Some(values) => {
                self.total -= values.len();
                values.into_iter().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&HashSet<V>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn contains_entry(&self, key: &K, value: &V) -> bool {
        self.entries.get(key).is_some_and(|v| v.contains(value))
    }

    /// Total number of (key, value) pairs.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Iterate over every (key, value) pair.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k, v)))
    }
}

impl<K: Eq + Hash + Clone, V: Eq + Hash + Clone> Multimap<K, V> {
    /// Add several values under one key.
    pub fn put_all_key<I: IntoIterator<Item = V>>(&mut self, key: K, values: I) -> bool {
        let mut changed = false;
        for value in values {
            changed |= self.put(key.clone(), value);
        }
        changed
    }

    /// Merge every pair from another multimap into this one.
    pub fn put_all(&mut self, other: &Multimap<K, V>) -> bool {
        let mut changed = false;
        for (key, value) in other.iter() {
            changed |= self.put(key.clone(), value.clone());
        }
        changed
    }

    /// Every (key, value) pair as an owned vector.
    pub fn to_entries(&self) -> Vec<(K, V)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K: Eq + Hash, V: Eq + Hash> Default for Multimap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V: Eq + Hash> PartialEq for Multimap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq + Hash, V: Eq + Hash> Eq for Multimap<K, V> {}

impl<K: Eq + Hash, V: Eq + Hash> FromIterator<(K, V)> for Multimap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Multimap::new();
        for (key, value) in iter {
            map.put(key, value);
        }
        map
    }
}
