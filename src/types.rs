//! Core types for the proxy layer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Opaque identity of the object instance that owns a proxied field.
///
/// The proxy never inspects the owner; it only tags collaborator calls with
/// this identity so the surrounding persistence context can route them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable index of a field on its owner.
///
/// Dirty marking and relation notification identify the field by index, not
/// by name, so renames in the owning model never invalidate a live proxy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldIndex(pub u32);

impl fmt::Debug for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldIndex({})", self.0)
    }
}

impl fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistent identity of a managed element, as reported by the
/// [`crate::session::ElementPorter`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.0)
    }
}

/// Configuration flags for a proxy, fixed at construction.
#[derive(Clone, Copy, Debug)]
pub struct ProxyConfig {
    /// Whether a null element/value is a valid member.
    pub allow_nulls: bool,

    /// Whether to maintain and consult the in-memory delegate at all, versus
    /// going direct to the backing store on every call.
    pub use_cache: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            allow_nulls: false,
            use_cache: true,
        }
    }
}

/// State threaded through a detach traversal.
///
/// Tracks which managed elements were already detached so a porter with a
/// recursive traversal policy can bound its depth and break cycles.
#[derive(Debug, Default)]
pub struct DetachState {
    seen: HashSet<ElementId>,
}

impl DetachState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an element was visited. Returns false if it was already
    /// seen during this traversal.
    pub fn mark_seen(&mut self, id: ElementId) -> bool {
        self.seen.insert(id)
    }

    pub fn was_seen(&self, id: ElementId) -> bool {
        self.seen.contains(&id)
    }
}
