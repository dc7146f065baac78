//! Multimap proxy.
//!
//! Key to value-bag proxy with no backing-store pass-through: contents are
//! always fully cached in the delegate and every mutator marks the field
//! dirty unconditionally after applying. Entries are plain values, not
//! managed relationships, so there is no relation notification and no
//! operation queue. The detach/attach reconciliation is shared with the bag
//! proxy.

use crate::containers::Multimap;
use crate::error::Result;
use crate::proxy::ManagedContainer;
use crate::reconcile;
use crate::session::{ElementPorter, OwnerRef};
use crate::types::{DetachState, FieldIndex, OwnerId};
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

struct Inner<K, V> {
    owner: Option<OwnerRef>,
    delegate: Multimap<K, V>,
}

/// A multimap-shaped proxy for one field on one owning object.
pub struct MultimapProxy<K, V> {
    field: FieldIndex,
    key_porter: Arc<dyn ElementPorter<K>>,
    value_porter: Arc<dyn ElementPorter<V>>,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Clone + Eq + Hash, V: Clone + Eq + Hash> MultimapProxy<K, V> {
    /// Create a proxy bound to one owner and field, with an empty delegate.
    pub fn new(
        owner: OwnerRef,
        key_porter: Arc<dyn ElementPorter<K>>,
        value_porter: Arc<dyn ElementPorter<V>>,
    ) -> Self {
        let field = owner.field;
        Self {
            field,
            key_porter,
            value_porter,
            inner: Mutex::new(Inner {
                owner: Some(owner),
                delegate: Multimap::new(),
            }),
        }
    }

    /// Initialize from an existing raw container value (copy-in; never
    /// aliases the caller's map).
    pub fn initialize_from(&self, value: &Multimap<K, V>) {
        self.inner.lock().delegate = value.clone();
    }

    pub fn field(&self) -> FieldIndex {
        self.field
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.inner.lock().owner.as_ref().map(|o| o.owner)
    }

    pub(crate) fn key_porter(&self) -> Arc<dyn ElementPorter<K>> {
        self.key_porter.clone()
    }

    pub(crate) fn value_porter(&self) -> Arc<dyn ElementPorter<V>> {
        self.value_porter.clone()
    }

    // --- Accessors ---

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().delegate.contains_key(key)
    }

    pub fn contains_entry(&self, key: &K, value: &V) -> bool {
        self.inner.lock().delegate.contains_entry(key, value)
    }

    /// Values currently associated with a key.
    pub fn get(&self, key: &K) -> Vec<V> {
        self.inner
            .lock()
            .delegate
            .get(key)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().delegate.keys().cloned().collect()
    }

    /// Total number of (key, value) pairs.
    pub fn len(&self) -> usize {
        self.inner.lock().delegate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().delegate.is_empty()
    }

    /// Every (key, value) pair as an owned vector.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner.lock().delegate.to_entries()
    }

    /// A plain disconnected multimap of the current contents; the
    /// substitution shape for crossing a process boundary.
    pub fn snapshot(&self) -> Multimap<K, V> {
        self.inner.lock().delegate.clone()
    }

    // --- Mutators (apply to delegate, then dirty unconditionally) ---

    /// Associate a value with a key. Returns false if the pair was already
    /// present.
    pub fn put(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.delegate.put(key, value);
        Self::mark_dirty_locked(&inner);
        changed
    }

    /// Merge every pair from another multimap.
    pub fn put_all(&self, other: &Multimap<K, V>) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.delegate.put_all(other);
        Self::mark_dirty_locked(&inner);
        changed
    }

    /// Add several values under one key.
    pub fn put_all_key<I: IntoIterator<Item = V>>(&self, key: K, values: I) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.delegate.put_all_key(key, values);
        Self::mark_dirty_locked(&inner);
        changed
    }

    /// Remove a single (key, value) pair.
    pub fn remove(&self, key: &K, value: &V) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.delegate.remove(key, value);
        Self::mark_dirty_locked(&inner);
        removed
    }

    /// Remove every value associated with a key, returning them.
    pub fn remove_all(&self, key: &K) -> Vec<V> {
        let mut inner = self.inner.lock();
        let removed = inner.delegate.remove_all(key);
        Self::mark_dirty_locked(&inner);
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.delegate.clear();
        Self::mark_dirty_locked(&inner);
    }

    fn mark_dirty_locked(inner: &Inner<K, V>) {
        if let Some(owner) = &inner.owner {
            owner.mark_dirty();
        }
    }
}

impl<K: Clone + Eq + Hash, V: Clone + Eq + Hash> ManagedContainer for MultimapProxy<K, V> {
    type Snapshot = Multimap<K, V>;

    fn load(&self) -> Result<()> {
        // Always fully cached.
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn mark_dirty(&self) {
        Self::mark_dirty_locked(&self.inner.lock());
    }

    fn unset_owner(&self) {
        let mut inner = self.inner.lock();
        if let Some(owner) = inner.owner.take() {
            debug!(field = %owner.field, owner = %owner.owner, "proxy torn down");
        }
    }

    fn detach(&self, state: &mut DetachState) -> Result<Multimap<K, V>> {
        Ok(reconcile::detach_multimap(self, state))
    }

    fn attach(&self, snapshot: &Multimap<K, V>) -> Result<()> {
        reconcile::attach_multimap(self, snapshot);
        Ok(())
    }
}
