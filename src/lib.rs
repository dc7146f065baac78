//! # Fieldbag
//!
//! Transactional collection proxies for a persisted object graph: a
//! multi-valued field (a bag of elements, or a multimap of keys to value
//! bags) behaves like an ordinary in-memory container while staying
//! synchronized with its durable backing store and the dirty/commit
//! machinery of the owning persistence context.
//!
//! ## Core Concepts
//!
//! - **Proxies**: [`BagProxy`] and [`MultimapProxy`], each bound to one
//!   field on one owning object
//! - **Delegate**: the proxy's exclusively-owned in-memory container,
//!   lazily populated from the backing store when caching
//! - **Deferred operations**: mutation intents captured as [`QueuedOp`]
//!   records and flushed by the persistence context at commit
//! - **Detach/Attach**: converting a live proxy to a disconnected snapshot
//!   and reconciling a snapshot back with minimal mutations
//!
//! ## Example
//!
//! ```
//! use fieldbag::{
//!     BagProxy, MemoryBacking, OwnerRef, PassthroughPorter, ProxyConfig,
//!     DirtyNotifier, FieldIndex, OwnerId,
//! };
//! use std::sync::Arc;
//!
//! struct NoopDirty;
//! impl DirtyNotifier for NoopDirty {
//!     fn mark_dirty(&self, _owner: OwnerId, _field: FieldIndex) {}
//! }
//!
//! let store = Arc::new(MemoryBacking::new());
//! let owner = OwnerRef::new(OwnerId(1), FieldIndex(0), Arc::new(NoopDirty));
//! let bag = BagProxy::new(owner, ProxyConfig::default(), Arc::new(PassthroughPorter))
//!     .with_backing(store);
//!
//! bag.add("banana").unwrap();
//! bag.add_n("car", 2).unwrap();
//! assert_eq!(bag.count(&"car").unwrap(), 2);
//! assert_eq!(bag.len().unwrap(), 3);
//! ```

pub mod containers;
pub mod error;
pub mod proxy;
pub mod queue;
pub mod reconcile;
pub mod session;
pub mod types;

// Re-exports
pub use containers::{Bag, Multimap};
pub use error::{ProxyError, Result};
pub use proxy::{BagProxy, ManagedContainer, MultimapProxy};
pub use queue::{DeferredQueue, OperationQueue, QueuedOp};
pub use session::{
    backing_error, CollectionBacking, DirtyNotifier, ElementPorter, MemoryBacking, OwnerRef,
    PassthroughPorter, RelationNotifier,
};
pub use types::{DetachState, ElementId, FieldIndex, OwnerId, ProxyConfig};
