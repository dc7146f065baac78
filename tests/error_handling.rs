//! Failure-path tests: invalid arguments, null elements, and store faults.

use fieldbag::{
    backing_error, BagProxy, CollectionBacking, DirtyNotifier, ElementPorter, FieldIndex,
    MemoryBacking, OwnerId, OwnerRef, PassthroughPorter, ProxyConfig, ProxyError, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const OWNER: OwnerId = OwnerId(9);
const FIELD: FieldIndex = FieldIndex(2);

#[derive(Default)]
struct CountingDirty {
    marks: AtomicUsize,
}

impl DirtyNotifier for CountingDirty {
    fn mark_dirty(&self, _owner: OwnerId, _field: FieldIndex) {
        self.marks.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store whose write operations fail while reads keep working.
struct FlakyStore {
    delegate: MemoryBacking<String>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            delegate: MemoryBacking::new(),
        }
    }
}

impl CollectionBacking<String> for FlakyStore {
    fn contains(&self, owner: OwnerId, element: &String) -> Result<bool> {
        self.delegate.contains(owner, element)
    }

    fn size(&self, owner: OwnerId) -> Result<usize> {
        self.delegate.size(owner)
    }

    fn iter(&self, owner: OwnerId) -> Result<Vec<String>> {
        self.delegate.iter(owner)
    }

    fn add(&self, _owner: OwnerId, _element: &String, _known_size: Option<usize>) -> Result<bool> {
        Err(backing_error("write rejected"))
    }

    fn add_all(
        &self,
        _owner: OwnerId,
        _elements: &[String],
        _known_size: Option<usize>,
    ) -> Result<bool> {
        Err(backing_error("write rejected"))
    }

    fn remove(
        &self,
        _owner: OwnerId,
        _element: &String,
        _known_size: Option<usize>,
        _allow_cascade: bool,
    ) -> Result<bool> {
        Err(backing_error("write rejected"))
    }

    fn remove_all(
        &self,
        _owner: OwnerId,
        _elements: &[String],
        _known_size: Option<usize>,
    ) -> Result<bool> {
        Err(backing_error("write rejected"))
    }

    fn clear(&self, _owner: OwnerId) -> Result<()> {
        Err(backing_error("write rejected"))
    }
}

/// Store whose reads fail, for load-path propagation tests.
struct UnreadableStore;

impl CollectionBacking<String> for UnreadableStore {
    fn contains(&self, _owner: OwnerId, _element: &String) -> Result<bool> {
        Err(backing_error("read rejected"))
    }

    fn size(&self, _owner: OwnerId) -> Result<usize> {
        Err(backing_error("read rejected"))
    }

    fn iter(&self, _owner: OwnerId) -> Result<Vec<String>> {
        Err(backing_error("read rejected"))
    }

    fn add(&self, _owner: OwnerId, _element: &String, _known_size: Option<usize>) -> Result<bool> {
        Ok(true)
    }

    fn add_all(
        &self,
        _owner: OwnerId,
        _elements: &[String],
        _known_size: Option<usize>,
    ) -> Result<bool> {
        Ok(true)
    }

    fn remove(
        &self,
        _owner: OwnerId,
        _element: &String,
        _known_size: Option<usize>,
        _allow_cascade: bool,
    ) -> Result<bool> {
        Ok(true)
    }

    fn remove_all(
        &self,
        _owner: OwnerId,
        _elements: &[String],
        _known_size: Option<usize>,
    ) -> Result<bool> {
        Ok(true)
    }

    fn clear(&self, _owner: OwnerId) -> Result<()> {
        Ok(())
    }
}

/// Treats the empty string as an absent element.
struct EmptyIsNull;

impl ElementPorter<String> for EmptyIsNull {
    fn is_null(&self, element: &String) -> bool {
        element.is_empty()
    }
}

fn proxy_with(config: ProxyConfig, porter: Arc<dyn ElementPorter<String>>) -> BagProxy<String> {
    let dirty = Arc::new(CountingDirty::default());
    BagProxy::new(OwnerRef::new(OWNER, FIELD, dirty), config, porter)
}

fn s(value: &str) -> String {
    value.to_string()
}

#[test]
fn test_negative_count_rejected() {
    let bag = proxy_with(ProxyConfig::default(), Arc::new(PassthroughPorter));
    bag.add(s("e")).unwrap();

    assert!(matches!(
        bag.add_n(s("e"), -1),
        Err(ProxyError::NegativeCount(-1))
    ));
    assert!(matches!(
        bag.remove_n(&s("e"), -3),
        Err(ProxyError::NegativeCount(-3))
    ));
    assert!(matches!(
        bag.set_count(s("e"), -2),
        Err(ProxyError::NegativeCount(-2))
    ));

    // The rejected calls changed nothing.
    assert_eq!(bag.count(&s("e")).unwrap(), 1);
}

#[test]
fn test_null_element_rejected_by_default() {
    let dirty = Arc::new(CountingDirty::default());
    let bag = BagProxy::new(
        OwnerRef::new(OWNER, FIELD, dirty.clone()),
        ProxyConfig::default(),
        Arc::new(EmptyIsNull),
    );

    let err = bag.add(s("")).unwrap_err();
    assert!(matches!(err, ProxyError::NullNotAllowed(n) if n == FIELD.0));
    assert!(bag.is_empty().unwrap());
    assert_eq!(dirty.marks.load(Ordering::SeqCst), 0);
}

#[test]
fn test_null_element_accepted_when_configured() {
    let config = ProxyConfig {
        allow_nulls: true,
        ..ProxyConfig::default()
    };
    let bag = proxy_with(config, Arc::new(EmptyIsNull));

    assert!(bag.add(s("")).unwrap());
    assert!(bag.contains(&s("")).unwrap());
}

#[test]
fn test_store_write_failure_degrades_to_false() {
    let bag = proxy_with(ProxyConfig::default(), Arc::new(PassthroughPorter))
        .with_backing(Arc::new(FlakyStore::new()));

    // The write is reported unsuccessful but the in-memory view advances
    // and the call does not error.
    assert!(!bag.add(s("e")).unwrap());
    assert!(bag.contains(&s("e")).unwrap());

    assert!(!bag.remove(&s("e")).unwrap());
    assert!(!bag.contains(&s("e")).unwrap());
}

#[test]
fn test_clear_survives_store_failure() {
    let bag = proxy_with(ProxyConfig::default(), Arc::new(PassthroughPorter))
        .with_backing(Arc::new(FlakyStore::new()));

    bag.add(s("a")).unwrap();
    bag.clear().unwrap();
    assert!(bag.is_empty().unwrap());
}

#[test]
fn test_store_read_failure_propagates() {
    let bag = proxy_with(ProxyConfig::default(), Arc::new(PassthroughPorter))
        .with_backing(Arc::new(UnreadableStore));

    assert!(matches!(bag.len(), Err(ProxyError::Backing(_))));
    assert!(matches!(bag.contains(&s("e")), Err(ProxyError::Backing(_))));
}
