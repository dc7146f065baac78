//! Detach/attach reconciliation, shared by both proxy kinds.
//!
//! Detachment produces an independent plain container whose managed entries
//! are replaced by porter-detached copies. Attachment reconciles such a
//! snapshot back into a live proxy in two passes: a deletion pass removes
//! keys/elements no longer present, then an upsert pass inserts missing
//! entries and overwrites changed values. The live proxy ends up exactly
//! equal to the resolved snapshot with the minimum number of underlying
//! mutations, never a wholesale clear-and-refill.
//!
//! Both passes run through the proxy's own mutators, so store dispatch,
//! dirty marking, and relation notification fire per reconciling mutation.

use crate::containers::{Bag, Multimap};
use crate::error::Result;
use crate::proxy::{BagProxy, MultimapProxy};
use crate::session::ElementPorter;
use crate::types::{DetachState, OwnerId};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// One reconciling mutation against the live container.
#[derive(Debug, PartialEq)]
enum Step<K, V> {
    /// Key present live but absent from the attached snapshot.
    Remove(K),
    /// Key absent live.
    Insert(K, V),
    /// Key present on both sides with a differing value.
    Replace(K, V),
}

/// Compute the delete-then-upsert plan turning `live` into `attached`.
///
/// Keys are matched by `Eq`; value equivalence is caller-supplied so the bag
/// (occurrence counts) and the multimap (value sets with identity-aware
/// comparison) share the algorithm.
fn plan<K, V, F>(live: Vec<(K, V)>, attached: Vec<(K, V)>, same_value: F) -> Vec<Step<K, V>>
where
    K: Eq + Hash + Clone,
    V: Clone,
    F: Fn(&V, &V) -> bool,
{
    let live: HashMap<K, V> = live.into_iter().collect();
    let attached: HashMap<K, V> = attached.into_iter().collect();
    let mut steps = Vec::new();

    // Deletion pass.
    for key in live.keys() {
        if !attached.contains_key(key) {
            steps.push(Step::Remove(key.clone()));
        }
    }

    // Upsert pass.
    for (key, value) in &attached {
        match live.get(key) {
            None => steps.push(Step::Insert(key.clone(), value.clone())),
            Some(current) if !same_value(current, value) => {
                steps.push(Step::Replace(key.clone(), value.clone()))
            }
            Some(_) => {}
        }
    }

    steps
}

fn resolve<T: Clone>(
    porter: &dyn ElementPorter<T>,
    owner: Option<OwnerId>,
    entry: &T,
) -> T {
    match owner {
        Some(owner) if porter.is_managed(entry) && porter.is_detachable(entry) => {
            let without_identity = porter.identity(entry).is_none();
            porter.attach(owner, entry, without_identity)
        }
        _ => entry.clone(),
    }
}

fn detach_entry<T: Clone>(porter: &dyn ElementPorter<T>, state: &mut DetachState, entry: &T) -> T {
    if porter.is_managed(entry) {
        porter.detach(entry, state)
    } else {
        entry.clone()
    }
}

// --- Bag ---

/// Produce a disconnected snapshot of a bag proxy's contents.
pub fn detach_bag<E: Clone + Eq + Hash>(
    proxy: &BagProxy<E>,
    state: &mut DetachState,
) -> Result<Bag<E>> {
    let porter = proxy.porter();
    let mut detached = Bag::new();
    for (element, count) in proxy.snapshot()?.counted() {
        detached.add_n(detach_entry(porter.as_ref(), state, element), count);
    }
    Ok(detached)
}

/// Reconcile a disconnected snapshot back into a live bag proxy.
pub fn attach_bag<E: Clone + Eq + Hash>(proxy: &BagProxy<E>, detached: &Bag<E>) -> Result<()> {
    let porter = proxy.porter();
    let owner = proxy.owner_id();

    // Resolve snapshot entries to their live counterparts. Two detached
    // copies that attach to the same live element merge their counts.
    let mut attached = Bag::new();
    for (element, count) in detached.counted() {
        attached.add_n(resolve(porter.as_ref(), owner, element), count);
    }

    let live = proxy.snapshot()?;
    let live_entries: Vec<(E, usize)> = live.counted().map(|(e, n)| (e.clone(), n)).collect();
    let attached_entries: Vec<(E, usize)> =
        attached.counted().map(|(e, n)| (e.clone(), n)).collect();

    for step in plan(live_entries, attached_entries, |a, b| a == b) {
        match step {
            Step::Remove(element) => {
                let count = live.count(&element);
                proxy.remove_n(&element, count as i64)?;
            }
            Step::Insert(element, count) => {
                proxy.add_n(element, count as i64)?;
            }
            Step::Replace(element, count) => {
                proxy.set_count(element, count as i64)?;
            }
        }
    }
    Ok(())
}

// --- Multimap ---

/// Produce a disconnected snapshot of a multimap proxy's contents.
pub fn detach_multimap<K, V>(proxy: &MultimapProxy<K, V>, state: &mut DetachState) -> Multimap<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    let key_porter = proxy.key_porter();
    let value_porter = proxy.value_porter();
    let mut detached = Multimap::new();
    for (key, value) in proxy.snapshot().iter() {
        detached.put(
            detach_entry(key_porter.as_ref(), state, key),
            detach_entry(value_porter.as_ref(), state, value),
        );
    }
    detached
}

/// Reconcile a disconnected snapshot back into a live multimap proxy.
pub fn attach_multimap<K, V>(proxy: &MultimapProxy<K, V>, detached: &Multimap<K, V>)
where
    K: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    let key_porter = proxy.key_porter();
    let value_porter = proxy.value_porter();
    let owner = proxy.owner_id();

    let mut attached = Multimap::new();
    for (key, value) in detached.iter() {
        attached.put(
            resolve(key_porter.as_ref(), owner, key),
            resolve(value_porter.as_ref(), owner, value),
        );
    }

    let live = proxy.snapshot();
    let live_entries: Vec<(K, HashSet<V>)> = live
        .keys()
        .map(|k| (k.clone(), live.get(k).cloned().unwrap_or_default()))
        .collect();
    let attached_entries: Vec<(K, HashSet<V>)> = attached
        .keys()
        .map(|k| (k.clone(), attached.get(k).cloned().unwrap_or_default()))
        .collect();

    let same_values =
        |a: &HashSet<V>, b: &HashSet<V>| sets_equivalent(a, b, value_porter.as_ref());

    for step in plan(live_entries, attached_entries, same_values) {
        match step {
            Step::Remove(key) => {
                proxy.remove_all(&key);
            }
            Step::Insert(key, values) => {
                proxy.put_all_key(key, values);
            }
            Step::Replace(key, values) => {
                // Overwrite on mismatch: the attached value set wins.
                proxy.remove_all(&key);
                proxy.put_all_key(key, values);
            }
        }
    }
}

/// Element-wise value-set comparison: managed values with identities compare
/// by persistent identity, everything else by equality.
fn sets_equivalent<V: Clone + Eq + Hash>(
    a: &HashSet<V>,
    b: &HashSet<V>,
    porter: &dyn ElementPorter<V>,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .all(|v| b.iter().any(|w| values_equivalent(v, w, porter)))
}

fn values_equivalent<V: Clone + Eq>(v: &V, w: &V, porter: &dyn ElementPorter<V>) -> bool {
    if porter.is_managed(v) && porter.is_managed(w) {
        if let (Some(a), Some(b)) = (porter.identity(v), porter.identity(w)) {
            return a == b;
        }
    }
    v == w
}
