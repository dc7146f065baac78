//! Collaborator interfaces consumed by the proxies.
//!
//! The proxy layer has no I/O surface of its own; its boundary is this set of
//! in-process traits. The surrounding persistence context implements them and
//! owns their lifetimes. The proxy only ever issues well-formed calls against
//! them and never assumes exclusive access.

use crate::error::{ProxyError, Result};
use crate::types::{DetachState, ElementId, FieldIndex, OwnerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Durable point of truth for one multi-valued field, scoped per owner.
///
/// `known_size` is the caller's cached element count, passed so the store can
/// skip a size query; `None` signals "unknown, caller not caching".
pub trait CollectionBacking<E> {
    fn contains(&self, owner: OwnerId, element: &E) -> Result<bool>;

    fn size(&self, owner: OwnerId) -> Result<usize>;

    /// All current occurrences for the owner, duplicates included.
    fn iter(&self, owner: OwnerId) -> Result<Vec<E>>;

    fn add(&self, owner: OwnerId, element: &E, known_size: Option<usize>) -> Result<bool>;

    fn add_all(&self, owner: OwnerId, elements: &[E], known_size: Option<usize>) -> Result<bool>;

    fn remove(
        &self,
        owner: OwnerId,
        element: &E,
        known_size: Option<usize>,
        allow_cascade: bool,
    ) -> Result<bool>;

    fn remove_all(&self, owner: OwnerId, elements: &[E], known_size: Option<usize>)
        -> Result<bool>;

    fn clear(&self, owner: OwnerId) -> Result<()>;
}

/// Marks a specific field of a specific owner as modified, so the owning
/// transaction re-writes it at commit.
pub trait DirtyNotifier {
    fn mark_dirty(&self, owner: OwnerId, field: FieldIndex);
}

/// Informs a bidirectional-relationship tracker when an element is logically
/// added to or removed from the field.
pub trait RelationNotifier<E> {
    fn relation_added(&self, field: FieldIndex, element: &E);

    fn relation_removed(&self, field: FieldIndex, element: &E);
}

/// Converts elements between their live managed form and detached copies.
///
/// Plain value elements use the defaults: not managed, copied as-is. A porter
/// for persisted elements overrides the identity and traversal hooks; its own
/// traversal policy bounds the detach recursion depth.
pub trait ElementPorter<T: Clone> {
    /// Whether this element is a managed persisted object.
    fn is_managed(&self, _element: &T) -> bool {
        false
    }

    /// Whether a managed element can be detached at all.
    fn is_detachable(&self, _element: &T) -> bool {
        false
    }

    /// Whether this element represents an absent ("null") value.
    fn is_null(&self, _element: &T) -> bool {
        false
    }

    /// Persistent identity of a managed element, if it has one.
    fn identity(&self, _element: &T) -> Option<ElementId> {
        None
    }

    /// Produce a detached copy of an element.
    fn detach(&self, element: &T, _state: &mut DetachState) -> T {
        element.clone()
    }

    /// Resolve a detached element to its live managed counterpart.
    fn attach(&self, _owner: OwnerId, element: &T, _without_identity: bool) -> T {
        element.clone()
    }
}

/// Identity porter for plain value elements: nothing is managed, detach and
/// attach are clones.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughPorter;

impl<T: Clone> ElementPorter<T> for PassthroughPorter {}

/// Back-reference from a proxy to the object instance holding the field.
///
/// A proxy with no `OwnerRef` is detached: dirty marking and relation calls
/// become no-ops, not errors.
#[derive(Clone)]
pub struct OwnerRef {
    pub owner: OwnerId,
    pub field: FieldIndex,
    pub dirty: Arc<dyn DirtyNotifier>,
}

impl OwnerRef {
    pub fn new(owner: OwnerId, field: FieldIndex, dirty: Arc<dyn DirtyNotifier>) -> Self {
        Self {
            owner,
            field,
            dirty,
        }
    }

    pub fn mark_dirty(&self) {
        self.dirty.mark_dirty(self.owner, self.field);
    }
}

impl std::fmt::Debug for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerRef")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .finish()
    }
}

/// In-memory [`CollectionBacking`] keyed by owner.
///
/// Serves as the durable side for transient fields and as the reference
/// implementation in tests.
pub struct MemoryBacking<E> {
    rows: Mutex<HashMap<OwnerId, Vec<E>>>,
}

impl<E: Clone + PartialEq> MemoryBacking<E> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-load contents for an owner, replacing anything already stored.
    pub fn seed(&self, owner: OwnerId, elements: Vec<E>) {
        self.rows.lock().insert(owner, elements);
    }

    /// Current contents for an owner (duplicates included).
    pub fn contents(&self, owner: OwnerId) -> Vec<E> {
        self.rows.lock().get(&owner).cloned().unwrap_or_default()
    }
}

impl<E: Clone + PartialEq> Default for MemoryBacking<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + PartialEq> CollectionBacking<E> for MemoryBacking<E> {
    fn contains(&self, owner: OwnerId, element: &E) -> Result<bool> {
        Ok(self
            .rows
            .lock()
            .get(&owner)
            .is_some_and(|row| row.contains(element)))
    }

    fn size(&self, owner: OwnerId) -> Result<usize> {
        Ok(self.rows.lock().get(&owner).map_or(0, |row| row.len()))
    }

    fn iter(&self, owner: OwnerId) -> Result<Vec<E>> {
        Ok(self.contents(owner))
    }

    fn add(&self, owner: OwnerId, element: &E, _known_size: Option<usize>) -> Result<bool> {
        self.rows
            .lock()
            .entry(owner)
            .or_default()
            .push(element.clone());
        Ok(true)
    }

    fn add_all(&self, owner: OwnerId, elements: &[E], _known_size: Option<usize>) -> Result<bool> {
        if elements.is_empty() {
            return Ok(false);
        }
        self.rows
            .lock()
            .entry(owner)
            .or_default()
            .extend(elements.iter().cloned());
        Ok(true)
    }

    fn remove(
        &self,
        owner: OwnerId,
        element: &E,
        _known_size: Option<usize>,
        _allow_cascade: bool,
    ) -> Result<bool> {
        let mut rows = self.rows.lock();
        let row = match rows.get_mut(&owner) {
            Some(row) => row,
            None => return Ok(false),
        };
        match row.iter().position(|e| e == element) {
            Some(index) => {
                row.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_all(
        &self,
        owner: OwnerId,
        elements: &[E],
        known_size: Option<usize>,
    ) -> Result<bool> {
        let mut removed = false;
        for element in elements {
            removed |= self.remove(owner, element, known_size, true)?;
        }
        Ok(removed)
    }

    fn clear(&self, owner: OwnerId) -> Result<()> {
        self.rows.lock().remove(&owner);
        Ok(())
    }
}

/// Convenience constructor for a backing failure.
pub fn backing_error(message: impl Into<String>) -> ProxyError {
    ProxyError::Backing(message.into())
}
