//! Backed collection proxies.
//!
//! A proxy makes one multi-valued field on a managed object behave like an
//! ordinary in-memory container while staying synchronized with the field's
//! backing store and the owning transaction's dirty machinery. The closed set
//! of variants is [`BagProxy`] (multiset, cached or direct) and
//! [`MultimapProxy`] (key to value-bag, always cached).

mod bag;
mod multimap;

pub use bag::BagProxy;
pub use multimap::MultimapProxy;

use crate::error::Result;
use crate::types::DetachState;

/// Capability shared by every proxy variant.
pub trait ManagedContainer {
    /// The disconnected plain-container shape this proxy detaches to.
    type Snapshot;

    /// Force a full load from the backing store, if this variant lazily
    /// caches. No-op once loaded, or when there is nothing to load from.
    fn load(&self) -> Result<()>;

    /// Whether the in-memory delegate holds the authoritative contents.
    fn is_loaded(&self) -> bool;

    /// Mark the proxied field dirty on its owner. No-op when detached.
    fn mark_dirty(&self);

    /// Tear down the owner back-reference, leaving the proxy inert: further
    /// mutations still apply to the delegate but touch no store, queue,
    /// dirty, or relation state.
    fn unset_owner(&self);

    /// Produce a disconnected snapshot sharing no mutable state with the
    /// live proxy.
    fn detach(&self, state: &mut DetachState) -> Result<Self::Snapshot>;

    /// Reconcile a disconnected snapshot back into this live proxy so its
    /// contents end up exactly equal to the snapshot's resolved entries,
    /// with the minimum number of underlying mutations.
    fn attach(&self, snapshot: &Self::Snapshot) -> Result<()>;
}
