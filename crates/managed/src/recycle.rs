//! Release of managed-object instances.
//!
//! A [`RecycleHook`] is built as soon as an instance is known and is
//! consumed when the instance is released, so the cleanup runs at most
//! once whether the instance ends up back in a pool or dropped.

use std::sync::Arc;

use crate::pool::ManagedObjectPool;
use crate::source::ManagedObject;

/// What the cleanup decided for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleDecision {
    /// The instance is clean and may be reused.
    Reuse,
    /// The instance must not be reused.
    Discard,
}

/// Cleanup logic run on an instance before it is released.
pub trait Recycle<M>: Send + Sync {
    /// Clean up `instance`.
    fn recycle(&self, managed_object: &str, instance: &M) -> RecycleDecision;
}

/// How an instance left its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Returned to the pool.
    Pooled,
    /// Dropped.
    Discarded,
}

/// One-shot release of an instance.
///
/// Consumed by [`release`](Self::release); the type system guarantees the
/// hook fires at most once.
pub struct RecycleHook<M: ManagedObject> {
    managed_object: Arc<str>,
    cleanup: Option<Arc<dyn Recycle<M>>>,
    pool: Option<Arc<dyn ManagedObjectPool<M>>>,
}

impl<M: ManagedObject> RecycleHook<M> {
    /// Create a hook running `cleanup` and returning to `pool` when set.
    pub fn new(
        managed_object: Arc<str>,
        cleanup: Option<Arc<dyn Recycle<M>>>,
        pool: Option<Arc<dyn ManagedObjectPool<M>>>,
    ) -> Self {
        Self {
            managed_object,
            cleanup,
            pool,
        }
    }

    /// Run the cleanup and hand the instance back to the pool, or drop it.
    pub fn release(self, instance: Arc<M>) -> ReleaseOutcome {
        let decision = self
            .cleanup
            .as_ref()
            .map_or(RecycleDecision::Reuse, |cleanup| {
                cleanup.recycle(&self.managed_object, &instance)
            });

        let Some(pool) = self.pool else {
            return ReleaseOutcome::Discarded;
        };
        if decision == RecycleDecision::Discard {
            return ReleaseOutcome::Discarded;
        }

        match Arc::try_unwrap(instance) {
            Ok(instance) => {
                pool.return_instance(instance);
                ReleaseOutcome::Pooled
            }
            Err(_shared) => {
                tracing::warn!(
                    managed_object = %self.managed_object,
                    "Instance still shared at release, not returned to pool"
                );
                ReleaseOutcome::Discarded
            }
        }
    }
}

impl<M: ManagedObject> std::fmt::Debug for RecycleHook<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecycleHook")
            .field("managed_object", &self.managed_object)
            .field("cleanup", &self.cleanup.is_some())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::source::SourceCallback;
    use crate::testing::{CountingRecycle, TestObject};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct ReturnedPool {
        returned: Mutex<Vec<u32>>,
    }

    impl ManagedObjectPool<TestObject> for ReturnedPool {
        fn source(&self, _callback: SourceCallback<TestObject>) -> Result<(), BoxError> {
            Ok(())
        }

        fn return_instance(&self, instance: TestObject) {
            self.returned.lock().push(instance.id());
        }
    }

    fn name() -> Arc<str> {
        Arc::from("db")
    }

    #[test]
    fn unpooled_instance_is_discarded_after_cleanup() {
        let cleanup = Arc::new(CountingRecycle::new(RecycleDecision::Reuse));
        let hook = RecycleHook::new(
            name(),
            Some(Arc::clone(&cleanup) as Arc<dyn Recycle<TestObject>>),
            None,
        );

        let outcome = hook.release(Arc::new(TestObject::new(1)));

        assert_eq!(outcome, ReleaseOutcome::Discarded);
        assert_eq!(cleanup.count(), 1);
    }

    #[test]
    fn pooled_instance_goes_back_to_pool() {
        let pool = Arc::new(ReturnedPool::default());
        let hook = RecycleHook::new(
            name(),
            None,
            Some(Arc::clone(&pool) as Arc<dyn ManagedObjectPool<TestObject>>),
        );

        assert_eq!(hook.release(Arc::new(TestObject::new(4))), ReleaseOutcome::Pooled);
        assert_eq!(*pool.returned.lock(), vec![4]);
    }

    #[test]
    fn discard_decision_skips_pool() {
        let pool = Arc::new(ReturnedPool::default());
        let cleanup = Arc::new(CountingRecycle::new(RecycleDecision::Discard));
        let hook = RecycleHook::new(
            name(),
            Some(Arc::clone(&cleanup) as Arc<dyn Recycle<TestObject>>),
            Some(Arc::clone(&pool) as Arc<dyn ManagedObjectPool<TestObject>>),
        );

        assert_eq!(hook.release(Arc::new(TestObject::new(4))), ReleaseOutcome::Discarded);
        assert!(pool.returned.lock().is_empty());
        assert_eq!(cleanup.count(), 1);
    }

    #[test]
    fn shared_instance_is_not_pooled() {
        let pool = Arc::new(ReturnedPool::default());
        let hook = RecycleHook::new(
            name(),
            None,
            Some(Arc::clone(&pool) as Arc<dyn ManagedObjectPool<TestObject>>),
        );
        let instance = Arc::new(TestObject::new(9));
        let _still_used = Arc::clone(&instance);

        assert_eq!(hook.release(instance), ReleaseOutcome::Discarded);
        assert!(pool.returned.lock().is_empty());
    }
}
