//! Occurrence-counted bag (multiset).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// A bag of elements where each element has a non-negative occurrence count,
/// order-independent.
///
/// A count of exactly zero is equivalent to absence; entries never persist
/// with a zero count.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "E: Serialize + Eq + Hash",
    deserialize = "E: Deserialize<'de> + Eq + Hash"
))]
pub struct Bag<E> {
    counts: HashMap<E, usize>,
    /// Total occurrences across all elements, kept in step with `counts`.
    total: usize,
}

impl<E: Eq + Hash> Bag<E> {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            total: 0,
        }
    }

    /// Add one occurrence of an element. Always succeeds.
    pub fn add(&mut self, element: E) -> bool {
        self.add_n(element, 1);
        true
    }

    /// Add `n` occurrences of an element, returning the count before the add.
    pub fn add_n(&mut self, element: E, n: usize) -> usize {
        let entry = self.counts.entry(element).or_insert(0);
        let prior = *entry;
        *entry += n;
        self.total += n;
        if *entry == 0 {
            // n was 0 and the element was absent; do not keep a zero entry.
            self.counts.retain(|_, c| *c > 0);
        }
        prior
    }

    /// Remove one occurrence. Returns whether the element was present.
    pub fn remove(&mut self, element: &E) -> bool {
        self.remove_n(element, 1) > 0
    }

    /// Remove up to `n` occurrences, returning the count before the removal.
    pub fn remove_n(&mut self, element: &E, n: usize) -> usize {
        match self.counts.get_mut(element) {
            Some(count) => {
                let prior = *count;
                let removed = n.min(prior);
                *count -= removed;
                self.total -= removed;
                if *count == 0 {
                    self.counts.remove(element);
                }
                prior
            }
            None => 0,
        }
    }

    /// Remove every occurrence of an element, returning how many there were.
    pub fn remove_all_occurrences(&mut self, element: &E) -> usize {
        match self.counts.remove(element) {
            Some(count) => {
                self.total -= count;
                count
            }
            None => 0,
        }
    }

    /// Set the occurrence count of an element, returning the prior count.
    pub fn set_count(&mut self, element: E, n: usize) -> usize {
        let prior = self.count(&element);
        if n > prior {
            self.add_n(element, n - prior);
        } else if n < prior {
            self.remove_n(&element, prior - n);
        }
        prior
    }

    pub fn count(&self, element: &E) -> usize {
        self.counts.get(element).copied().unwrap_or(0)
    }

    pub fn contains(&self, element: &E) -> bool {
        self.counts.contains_key(element)
    }

    /// Total number of occurrences (not distinct elements).
    pub fn len(&self) -> usize {
        self.total
    }

    /// Number of distinct elements.
    pub fn distinct_len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.total = 0;
    }

    /// Iterate over distinct elements with their counts.
    pub fn counted(&self) -> impl Iterator<Item = (&E, usize)> {
        self.counts.iter().map(|(e, c)| (e, *c))
    }

    /// Iterate over every occurrence (elements repeat per their count).
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.counts
            .iter()
            .flat_map(|(e, c)| std::iter::repeat(e).take(*c))
    }
}

impl<E: Eq + Hash + Clone> Bag<E> {
    /// Every occurrence as an owned vector (elements repeat per their count).
    pub fn to_vec(&self) -> Vec<E> {
        self.iter().cloned().collect()
    }
}

impl<E: Eq + Hash> Default for Bag<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Eq + Hash> PartialEq for Bag<E> {
    fn eq(&self, other: &Self) -> bool {
        self.counts == other.counts
    }
}

impl<E: Eq + Hash> Eq for Bag<E> {}

impl<E: Eq + Hash> FromIterator<E> for Bag<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut bag = Bag::new();
        for element in iter {
            bag.add(element);
        }
        bag
    }
}

impl<E: Eq + Hash> Extend<E> for Bag<E> {
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        for element in iter {
            self.add(element);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_count() {
        let mut bag = Bag::new();
        bag.add("banana");
        bag.add_n("car", 2);
        bag.add("moon");

        assert_eq!(bag.count(&"banana"), 1);
        assert_eq!(bag.count(&"car"), 2);
        assert_eq!(bag.count(&"moon"), 1);
        assert_eq!(bag.count(&"dog"), 0);
        assert_eq!(bag.len(), 4);
        assert_eq!(bag.distinct_len(), 3);
    }

    #[test]
    fn test_remove_clamps_to_zero() {
        let mut bag = Bag::new();
        bag.add_n("x", 2);

        // Removing more than present drops to absence, not negative.
        assert_eq!(bag.remove_n(&"x", 5), 2);
        assert_eq!(bag.count(&"x"), 0);
        assert!(!bag.contains(&"x"));
        assert_eq!(bag.len(), 0);
    }

    #[test]
    fn test_zero_count_is_absence() {
        let mut bag = Bag::new();
        bag.add_n("x", 0);
        assert!(!bag.contains(&"x"));
        assert!(bag.is_empty());

        bag.add("x");
        bag.remove(&"x");
        assert!(!bag.contains(&"x"));
        assert_eq!(bag.distinct_len(), 0);
    }

    #[test]
    fn test_set_count() {
        let mut bag = Bag::new();
        assert_eq!(bag.set_count("a", 3), 0);
        assert_eq!(bag.count(&"a"), 3);
        assert_eq!(bag.set_count("a", 1), 3);
        assert_eq!(bag.count(&"a"), 1);
        assert_eq!(bag.set_count("a", 0), 1);
        assert!(!bag.contains(&"a"));
    }

    #[test]
    fn test_iter_repeats_occurrences() {
        let mut bag = Bag::new();
        bag.add_n("a", 3);
        let mut items = bag.to_vec();
        items.sort();
        assert_eq!(items, vec!["a", "a", "a"]);
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let left: Bag<&str> = ["a", "b", "a"].into_iter().collect();
        let right: Bag<&str> = ["b", "a", "a"].into_iter().collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_serde_roundtrip() {
        let bag: Bag<String> = ["a".to_string(), "a".to_string(), "b".to_string()]
            .into_iter()
            .collect();
        let encoded = serde_json::to_string(&bag).unwrap();
        let decoded: Bag<String> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(bag, decoded);
        assert_eq!(decoded.len(), 3);
    }
}
