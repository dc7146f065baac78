//! Backed multiset proxy.
//!
//! The proxy operates in two modes. In **cached** mode it keeps an internal
//! delegate bag, populating it from the backing store on first need and
//! serving reads from it thereafter. In **direct** mode every read consults
//! the backing store and the delegate is not trusted for reads.
//!
//! Mutators follow one ordering: null check, cache load, relation
//! notification, store dispatch (queued capture or immediate call), dirty
//! mark, delegate mutation last. The dirty mark deliberately comes after the
//! store dispatch so pre-write hooks on the owner observe a completed write
//! attempt. An immediate store failure is logged and downgraded to a boolean
//! outcome; the delegate is still mutated so in-transaction readers observe
//! the caller's intent.

use crate::containers::Bag;
use crate::error::{ProxyError, Result};
use crate::proxy::ManagedContainer;
use crate::queue::{OperationQueue, QueuedOp};
use crate::reconcile;
use crate::session::{CollectionBacking, ElementPorter, OwnerRef, RelationNotifier};
use crate::types::{DetachState, FieldIndex, OwnerId, ProxyConfig};
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

struct Inner<E> {
    owner: Option<OwnerRef>,
    store: Option<Arc<dyn CollectionBacking<E>>>,
    queue: Option<Arc<dyn OperationQueue<E>>>,
    relations: Option<Arc<dyn RelationNotifier<E>>>,
    delegate: Bag<E>,
    loaded: bool,
}

/// A multiset-shaped proxy for one field on one owning object.
pub struct BagProxy<E> {
    config: ProxyConfig,
    field: FieldIndex,
    porter: Arc<dyn ElementPorter<E>>,
    inner: Mutex<Inner<E>>,
}

impl<E: Clone + Eq + Hash> BagProxy<E> {
    /// Create a proxy bound to one owner and field, with an empty, unloaded
    /// delegate.
    pub fn new(owner: OwnerRef, config: ProxyConfig, porter: Arc<dyn ElementPorter<E>>) -> Self {
        let field = owner.field;
        Self {
            config,
            field,
            porter,
            inner: Mutex::new(Inner {
                owner: Some(owner),
                store: None,
                queue: None,
                relations: None,
                delegate: Bag::new(),
                loaded: false,
            }),
        }
    }

    /// Attach a backing store handle. Decided once at construction time;
    /// absent for non-persistent or serialized-in-place fields.
    pub fn with_backing(self, store: Arc<dyn CollectionBacking<E>>) -> Self {
        self.inner.lock().store = Some(store);
        self
    }

    /// Attach the operation queue consulted for deferred-mode dispatch.
    pub fn with_queue(self, queue: Arc<dyn OperationQueue<E>>) -> Self {
        self.inner.lock().queue = Some(queue);
        self
    }

    /// Attach a bidirectional-relationship notifier.
    pub fn with_relations(self, relations: Arc<dyn RelationNotifier<E>>) -> Self {
        self.inner.lock().relations = Some(relations);
        self
    }

    /// Initialize from an existing raw container value (copy-in; never
    /// aliases the caller's bag). Marks the cache as loaded.
    pub fn initialize_from(&self, value: &Bag<E>) {
        let mut inner = self.inner.lock();
        inner.delegate = value.clone();
        inner.loaded = true;
    }

    pub fn field(&self) -> FieldIndex {
        self.field
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.inner.lock().owner.as_ref().map(|o| o.owner)
    }

    pub(crate) fn porter(&self) -> Arc<dyn ElementPorter<E>> {
        self.porter.clone()
    }

    // --- Accessors ---

    /// Whether at least one occurrence of the element is present.
    ///
    /// A point query: when the cache is not yet loaded this asks the store
    /// directly rather than forcing a full load.
    pub fn contains(&self, element: &E) -> Result<bool> {
        let inner = self.inner.lock();
        if self.config.use_cache && inner.loaded {
            return Ok(inner.delegate.contains(element));
        }
        if let (Some(owner), Some(store)) = (&inner.owner, &inner.store) {
            return store.contains(owner.owner, element);
        }
        Ok(inner.delegate.contains(element))
    }

    /// Whether every listed element is present at least once.
    pub fn contains_all(&self, elements: &[E]) -> Result<bool> {
        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
            return Ok(elements.iter().all(|e| inner.delegate.contains(e)));
        }
        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            let stored = store.iter(owner.owner)?;
            return Ok(elements.iter().all(|e| stored.contains(e)));
        }
        Ok(elements.iter().all(|e| inner.delegate.contains(e)))
    }

    /// Occurrence count of an element.
    pub fn count(&self, element: &E) -> Result<usize> {
        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
            return Ok(inner.delegate.count(element));
        }
        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            let stored = store.iter(owner.owner)?;
            return Ok(stored.iter().filter(|e| *e == element).count());
        }
        Ok(inner.delegate.count(element))
    }

    /// Total number of occurrences.
    pub fn len(&self) -> Result<usize> {
        let inner = self.inner.lock();
        if self.config.use_cache && inner.loaded {
            return Ok(inner.delegate.len());
        }
        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            return store.size(owner.owner);
        }
        Ok(inner.delegate.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Every occurrence as an owned vector (elements repeat per count).
    pub fn elements(&self) -> Result<Vec<E>> {
        Ok(self.snapshot()?.to_vec())
    }

    /// A plain disconnected bag of the current authoritative contents.
    ///
    /// Forces a full load when caching; reads the store directly otherwise.
    /// This is the substitution shape for crossing a process boundary.
    pub fn snapshot(&self) -> Result<Bag<E>> {
        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
            return Ok(inner.delegate.clone());
        }
        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            return Ok(store.iter(owner.owner)?.into_iter().collect());
        }
        Ok(inner.delegate.clone())
    }

    /// Whether this proxy's resolved contents equal another's. Forces a full
    /// load on both sides; a partial cache is never compared.
    pub fn content_eq(&self, other: &BagProxy<E>) -> Result<bool> {
        Ok(self.snapshot()? == other.snapshot()?)
    }

    // --- Mutators ---

    /// Add one occurrence of an element.
    ///
    /// Returns whether the authoritative side reports success: the backing
    /// store's answer when one is present, the delegate's otherwise.
    pub fn add(&self, element: E) -> Result<bool> {
        self.check_null(&element)?;

        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
        }

        if let (Some(owner), Some(relations)) = (inner.owner.clone(), inner.relations.clone()) {
            relations.relation_added(owner.field, &element);
        }

        let has_store = inner.store.is_some();
        let mut backing_success = true;
        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            if self.deferred(&inner) {
                self.enqueue(
                    &inner,
                    QueuedOp::Add {
                        owner: owner.owner,
                        store,
                        element: element.clone(),
                    },
                );
            } else {
                let known = self.known_size(&inner);
                match store.add(owner.owner, &element, known) {
                    Ok(ok) => backing_success = ok,
                    Err(e) => {
                        warn!(field = %owner.field, op = "add", error = %e,
                            "backing store write failed; keeping in-memory change");
                        backing_success = false;
                    }
                }
            }
        }

        // Dirty only after the store dispatch so pre-write hooks on the
        // owner run against a completed addition attempt.
        if let Some(owner) = &inner.owner {
            owner.mark_dirty();
        }

        let delegate_success = inner.delegate.add(element);
        Ok(if has_store {
            backing_success
        } else {
            delegate_success
        })
    }

    /// Add `n` occurrences of an element, returning the count before the add.
    ///
    /// `n < 0` fails with [`ProxyError::NegativeCount`] and changes nothing.
    pub fn add_n(&self, element: E, n: i64) -> Result<usize> {
        if n < 0 {
            return Err(ProxyError::NegativeCount(n));
        }
        self.check_null(&element)?;
        let n = n as usize;

        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
        }
        if n == 0 {
            return Ok(inner.delegate.count(&element));
        }

        if let (Some(owner), Some(relations)) = (inner.owner.clone(), inner.relations.clone()) {
            relations.relation_added(owner.field, &element);
        }

        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            if self.deferred(&inner) {
                for _ in 0..n {
                    self.enqueue(
                        &inner,
                        QueuedOp::Add {
                            owner: owner.owner,
                            store: store.clone(),
                            element: element.clone(),
                        },
                    );
                }
            } else {
                let known = self.known_size(&inner);
                let batch = vec![element.clone(); n];
                if let Err(e) = store.add_all(owner.owner, &batch, known) {
                    warn!(field = %owner.field, op = "add_n", error = %e,
                        "backing store write failed; keeping in-memory change");
                }
            }
        }

        if let Some(owner) = &inner.owner {
            owner.mark_dirty();
        }

        Ok(inner.delegate.add_n(element, n))
    }

    /// Add every element from an iterator.
    pub fn add_all<I: IntoIterator<Item = E>>(&self, elements: I) -> Result<bool> {
        let elements: Vec<E> = elements.into_iter().collect();
        for element in &elements {
            self.check_null(element)?;
        }
        if elements.is_empty() {
            return Ok(false);
        }

        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
        }

        if let (Some(owner), Some(relations)) = (inner.owner.clone(), inner.relations.clone()) {
            for element in &elements {
                relations.relation_added(owner.field, element);
            }
        }

        let has_store = inner.store.is_some();
        let mut backing_success = true;
        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            if self.deferred(&inner) {
                for element in &elements {
                    self.enqueue(
                        &inner,
                        QueuedOp::Add {
                            owner: owner.owner,
                            store: store.clone(),
                            element: element.clone(),
                        },
                    );
                }
            } else {
                let known = self.known_size(&inner);
                match store.add_all(owner.owner, &elements, known) {
                    Ok(ok) => backing_success = ok,
                    Err(e) => {
                        warn!(field = %owner.field, op = "add_all", error = %e,
                            "backing store write failed; keeping in-memory change");
                        backing_success = false;
                    }
                }
            }
        }

        if let Some(owner) = &inner.owner {
            owner.mark_dirty();
        }

        for element in elements {
            inner.delegate.add(element);
        }
        Ok(if has_store { backing_success } else { true })
    }

    /// Remove one occurrence of an element, cascading deletes where the
    /// store supports them.
    pub fn remove(&self, element: &E) -> Result<bool> {
        self.remove_cascade(element, true)
    }

    /// Remove one occurrence, choosing whether a cascade delete is allowed.
    pub fn remove_cascade(&self, element: &E, allow_cascade: bool) -> Result<bool> {
        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
        }

        // Queued removal is deferred without re-checking later, so prior
        // containment must be decided now.
        let contained = self.contained_locked(&inner, element)?;

        if let (Some(owner), Some(relations)) = (inner.owner.clone(), inner.relations.clone()) {
            relations.relation_removed(owner.field, element);
        }

        let has_store = inner.store.is_some();
        let mut backing_success = true;
        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            if self.deferred(&inner) {
                backing_success = contained;
                if contained {
                    self.enqueue(
                        &inner,
                        QueuedOp::Remove {
                            owner: owner.owner,
                            store,
                            element: element.clone(),
                            cascade: allow_cascade,
                        },
                    );
                }
            } else {
                let known = self.known_size(&inner);
                match store.remove(owner.owner, element, known, allow_cascade) {
                    Ok(ok) => backing_success = ok,
                    Err(e) => {
                        warn!(field = %owner.field, op = "remove", error = %e,
                            "backing store write failed; keeping in-memory change");
                        backing_success = false;
                    }
                }
            }
        }

        if let Some(owner) = &inner.owner {
            owner.mark_dirty();
        }

        let delegate_success = inner.delegate.remove(element);
        Ok(if has_store {
            backing_success
        } else {
            delegate_success
        })
    }

    /// Remove up to `n` occurrences, returning the count before the removal.
    ///
    /// `n < 0` fails with [`ProxyError::NegativeCount`] and changes nothing.
    pub fn remove_n(&self, element: &E, n: i64) -> Result<usize> {
        if n < 0 {
            return Err(ProxyError::NegativeCount(n));
        }
        let n = n as usize;

        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
        }
        let prior = inner.delegate.count(element);
        if n == 0 {
            return Ok(prior);
        }
        let to_remove = n.min(prior);

        if let (Some(owner), Some(relations)) = (inner.owner.clone(), inner.relations.clone()) {
            relations.relation_removed(owner.field, element);
        }

        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            if self.deferred(&inner) {
                for _ in 0..to_remove {
                    self.enqueue(
                        &inner,
                        QueuedOp::Remove {
                            owner: owner.owner,
                            store: store.clone(),
                            element: element.clone(),
                            cascade: true,
                        },
                    );
                }
            } else if to_remove > 0 {
                let known = self.known_size(&inner);
                let batch = vec![element.clone(); to_remove];
                if let Err(e) = store.remove_all(owner.owner, &batch, known) {
                    warn!(field = %owner.field, op = "remove_n", error = %e,
                        "backing store write failed; keeping in-memory change");
                }
            }
        }

        if let Some(owner) = &inner.owner {
            owner.mark_dirty();
        }

        inner.delegate.remove_n(element, n);
        Ok(prior)
    }

    /// Remove every occurrence of each listed element.
    ///
    /// In queued mode this reports success if *any* element was contained
    /// and therefore queued, not all of them.
    pub fn remove_all(&self, elements: &[E]) -> Result<bool> {
        let mut inner = self.inner.lock();
        if self.config.use_cache {
            self.load_locked(&mut inner)?;
        }

        if let (Some(owner), Some(relations)) = (inner.owner.clone(), inner.relations.clone()) {
            for element in elements {
                relations.relation_removed(owner.field, element);
            }
        }

        let has_store = inner.store.is_some();
        let mut backing_success = true;
        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            if self.deferred(&inner) {
                backing_success = false;
                for element in elements {
                    if self.contained_locked(&inner, element)? {
                        backing_success = true;
                        self.enqueue(
                            &inner,
                            QueuedOp::Remove {
                                owner: owner.owner,
                                store: store.clone(),
                                element: element.clone(),
                                cascade: true,
                            },
                        );
                    }
                }
            } else {
                let known = self.known_size(&inner);
                match store.remove_all(owner.owner, elements, known) {
                    Ok(ok) => backing_success = ok,
                    Err(e) => {
                        warn!(field = %owner.field, op = "remove_all", error = %e,
                            "backing store write failed; keeping in-memory change");
                        backing_success = false;
                    }
                }
            }
        }

        if let Some(owner) = &inner.owner {
            owner.mark_dirty();
        }

        let mut delegate_changed = false;
        for element in elements {
            delegate_changed |= inner.delegate.remove_all_occurrences(element) > 0;
        }
        Ok(if has_store {
            backing_success
        } else {
            delegate_changed
        })
    }

    /// Set the occurrence count of an element, returning the prior count.
    ///
    /// Computes the delta versus the current count and dispatches to
    /// [`BagProxy::add_n`] or [`BagProxy::remove_n`].
    pub fn set_count(&self, element: E, n: i64) -> Result<usize> {
        if n < 0 {
            return Err(ProxyError::NegativeCount(n));
        }
        let n = n as usize;

        let prior = self.count(&element)?;
        if n > prior {
            self.add_n(element, (n - prior) as i64)?;
        } else if n < prior {
            self.remove_n(&element, (prior - n) as i64)?;
        }
        Ok(prior)
    }

    /// Remove every element not in the keep list, returning whether anything
    /// was removed. Removals run through the owner-aware remove path so
    /// relationship and dirty semantics are preserved.
    pub fn retain(&self, keep: &[E]) -> Result<bool> {
        let victims: Vec<(E, usize)> = self
            .snapshot()?
            .counted()
            .filter(|(e, _)| !keep.contains(e))
            .map(|(e, n)| (e.clone(), n))
            .collect();

        let mut modified = false;
        for (element, count) in victims {
            self.remove_n(&element, count as i64)?;
            modified = true;
        }
        Ok(modified)
    }

    /// Clear the field's contents everywhere.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        // Clear marks dirty before the store dispatch: there is no per-write
        // hook sequencing to preserve for a wholesale clear.
        if let Some(owner) = &inner.owner {
            owner.mark_dirty();
        }

        if let (Some(owner), Some(store)) = (inner.owner.clone(), inner.store.clone()) {
            if self.deferred(&inner) {
                self.enqueue(
                    &inner,
                    QueuedOp::Clear {
                        owner: owner.owner,
                        store,
                    },
                );
            } else if let Err(e) = store.clear(owner.owner) {
                warn!(field = %owner.field, op = "clear", error = %e,
                    "backing store write failed; keeping in-memory change");
            }
        }

        inner.delegate.clear();
        Ok(())
    }

    // --- Internal helpers ---

    fn check_null(&self, element: &E) -> Result<()> {
        if !self.config.allow_nulls && self.porter.is_null(element) {
            return Err(ProxyError::NullNotAllowed(self.field.0));
        }
        Ok(())
    }

    fn deferred(&self, inner: &Inner<E>) -> bool {
        inner.queue.as_ref().is_some_and(|q| q.is_deferred())
    }

    fn enqueue(&self, inner: &Inner<E>, op: QueuedOp<E>) {
        if let Some(queue) = &inner.queue {
            queue.enqueue(op);
        }
    }

    fn known_size(&self, inner: &Inner<E>) -> Option<usize> {
        if self.config.use_cache {
            Some(inner.delegate.len())
        } else {
            None
        }
    }

    /// Authoritative containment check under the lock, for queued-removal
    /// gating.
    fn contained_locked(&self, inner: &Inner<E>, element: &E) -> Result<bool> {
        if self.config.use_cache {
            return Ok(inner.delegate.contains(element));
        }
        if let (Some(owner), Some(store)) = (&inner.owner, &inner.store) {
            return store.contains(owner.owner, element);
        }
        Ok(inner.delegate.contains(element))
    }

    /// Populate the delegate from the backing store on first need.
    ///
    /// Unloaded to loaded happens at most once per proxy instance; there is
    /// no reverse transition.
    fn load_locked(&self, inner: &mut Inner<E>) -> Result<()> {
        if inner.loaded {
            return Ok(());
        }
        let (owner, store) = match (inner.owner.clone(), inner.store.clone()) {
            (Some(owner), Some(store)) => (owner, store),
            _ => return Ok(()),
        };
        debug!(field = %owner.field, owner = %owner.owner, "loading field contents from backing store");
        let stored = store.iter(owner.owner)?;
        inner.delegate.clear();
        for element in stored {
            inner.delegate.add(element);
        }
        inner.loaded = true;
        Ok(())
    }
}

impl<E: Clone + Eq + Hash> ManagedContainer for BagProxy<E> {
    type Snapshot = Bag<E>;

    fn load(&self) -> Result<()> {
        if self.config.use_cache {
            self.load_locked(&mut self.inner.lock())?;
        }
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        if self.config.use_cache {
            self.inner.lock().loaded
        } else {
            false
        }
    }

    fn mark_dirty(&self) {
        if let Some(owner) = &self.inner.lock().owner {
            owner.mark_dirty();
        }
    }

    fn unset_owner(&self) {
        let mut inner = self.inner.lock();
        if let Some(owner) = inner.owner.take() {
            debug!(field = %owner.field, owner = %owner.owner, "proxy torn down");
        }
        inner.store = None;
        inner.queue = None;
        inner.relations = None;
    }

    fn detach(&self, state: &mut DetachState) -> Result<Bag<E>> {
        reconcile::detach_bag(self, state)
    }

    fn attach(&self, snapshot: &Bag<E>) -> Result<()> {
        reconcile::attach_bag(self, snapshot)
    }
}
