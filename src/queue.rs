//! Deferred mutation queue.
//!
//! In queued-update mode a proxy does not touch the backing store
//! synchronously; it captures each mutation intent as an ordered operation
//! record. The surrounding persistence context drains and executes the queue
//! at flush/commit time. This is message-passing: each record carries the
//! owner, the store handle, and the payload it needs to run later.

use crate::error::Result;
use crate::session::CollectionBacking;
use crate::types::OwnerId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A captured mutation intent, executable at flush time.
pub enum QueuedOp<E> {
    /// Add one occurrence of an element.
    Add {
        owner: OwnerId,
        store: Arc<dyn CollectionBacking<E>>,
        element: E,
    },
    /// Remove one occurrence of an element.
    Remove {
        owner: OwnerId,
        store: Arc<dyn CollectionBacking<E>>,
        element: E,
        cascade: bool,
    },
    /// Clear the field's contents.
    Clear {
        owner: OwnerId,
        store: Arc<dyn CollectionBacking<E>>,
    },
}

impl<E> QueuedOp<E> {
    pub fn owner(&self) -> OwnerId {
        match self {
            QueuedOp::Add { owner, .. }
            | QueuedOp::Remove { owner, .. }
            | QueuedOp::Clear { owner, .. } => *owner,
        }
    }

    /// Execute the captured intent against its store handle.
    ///
    /// Queued capture never re-checks state, so removal records are only
    /// enqueued for elements known contained at capture time.
    pub fn execute(&self) -> Result<bool> {
        match self {
            QueuedOp::Add {
                owner,
                store,
                element,
            } => store.add(*owner, element, None),
            QueuedOp::Remove {
                owner,
                store,
                element,
                cascade,
            } => store.remove(*owner, element, None, *cascade),
            QueuedOp::Clear { owner, store } => {
                store.clear(*owner)?;
                Ok(true)
            }
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for QueuedOp<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuedOp::Add { owner, element, .. } => f
                .debug_struct("Add")
                .field("owner", owner)
                .field("element", element)
                .finish(),
            QueuedOp::Remove {
                owner,
                element,
                cascade,
                ..
            } => f
                .debug_struct("Remove")
                .field("owner", owner)
                .field("element", element)
                .field("cascade", cascade)
                .finish(),
            QueuedOp::Clear { owner, .. } => {
                f.debug_struct("Clear").field("owner", owner).finish()
            }
        }
    }
}

/// Sink for deferred operations, owned by the persistence context.
pub trait OperationQueue<E> {
    /// Whether deferred (queued) mutation mode is currently active.
    fn is_deferred(&self) -> bool;

    /// Append an operation record for execution at flush time.
    fn enqueue(&self, op: QueuedOp<E>);
}

/// Reference [`OperationQueue`] implementation: an ordered list with a
/// toggleable deferred-mode flag.
pub struct DeferredQueue<E> {
    deferred: AtomicBool,
    ops: Mutex<Vec<QueuedOp<E>>>,
}

impl<E> DeferredQueue<E> {
    pub fn new() -> Self {
        Self {
            deferred: AtomicBool::new(false),
            ops: Mutex::new(Vec::new()),
        }
    }

    /// Switch queued-update mode on or off.
    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.store(deferred, Ordering::SeqCst);
    }

    /// Number of captured operations awaiting flush.
    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// Take the captured operations in capture order, leaving the queue empty.
    pub fn drain(&self) -> Vec<QueuedOp<E>> {
        std::mem::take(&mut *self.ops.lock())
    }

    /// Drain and execute every captured operation in order.
    ///
    /// Returns how many operations reported an effect. Stops at the first
    /// store error; operations already executed are not rolled back.
    pub fn flush(&self) -> Result<usize> {
        let mut applied = 0;
        for op in self.drain() {
            if op.execute()? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

impl<E> Default for DeferredQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> OperationQueue<E> for DeferredQueue<E> {
    fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }

    fn enqueue(&self, op: QueuedOp<E>) {
        self.ops.lock().push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryBacking;

    #[test]
    fn test_queue_preserves_capture_order() {
        let store: Arc<MemoryBacking<&str>> = Arc::new(MemoryBacking::new());
        let queue = DeferredQueue::new();
        let owner = OwnerId(1);

        queue.enqueue(QueuedOp::Add {
            owner,
            store: store.clone(),
            element: "a",
        });
        queue.enqueue(QueuedOp::Remove {
            owner,
            store: store.clone(),
            element: "a",
            cascade: true,
        });

        let ops = queue.drain();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], QueuedOp::Add { .. }));
        assert!(matches!(ops[1], QueuedOp::Remove { .. }));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_applies_to_store() {
        let store: Arc<MemoryBacking<&str>> = Arc::new(MemoryBacking::new());
        let queue = DeferredQueue::new();
        let owner = OwnerId(7);

        queue.enqueue(QueuedOp::Add {
            owner,
            store: store.clone(),
            element: "x",
        });
        queue.enqueue(QueuedOp::Add {
            owner,
            store: store.clone(),
            element: "y",
        });
        queue.enqueue(QueuedOp::Remove {
            owner,
            store: store.clone(),
            element: "x",
            cascade: false,
        });

        let applied = queue.flush().unwrap();
        assert_eq!(applied, 3);
        assert_eq!(store.contents(owner), vec!["y"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_deferred_flag_toggles() {
        let queue: DeferredQueue<&str> = DeferredQueue::new();
        assert!(!queue.is_deferred());
        queue.set_deferred(true);
        assert!(queue.is_deferred());
        queue.set_deferred(false);
        assert!(!queue.is_deferred());
    }

    #[test]
    fn test_clear_op_empties_store() {
        let store: Arc<MemoryBacking<&str>> = Arc::new(MemoryBacking::new());
        let owner = OwnerId(3);
        store.seed(owner, vec!["a", "b"]);

        let op = QueuedOp::Clear {
            owner,
            store: store.clone(),
        };
        assert!(op.execute().unwrap());
        assert!(store.contents(owner).is_empty());
    }
}
