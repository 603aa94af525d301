//! Reuse pool for managed-object instances.
//!
//! When a container is configured with a pool it asks the pool, not the raw
//! source, for instances and hands released instances back to it.
//! [`BoundedPool`] keeps a bounded set of idle instances in front of a
//! [`ManagedObjectSource`].

use std::sync::Arc;

use parking_lot::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{BoxError, Error, Result};
use crate::source::{ManagedObject, ManagedObjectSource, SourceCallback};

/// Pool shared by many containers.
///
/// Implementations must accept concurrent `source` and `return_instance`
/// calls.
pub trait ManagedObjectPool<M: ManagedObject>: Send + Sync {
    /// Source an instance; same contract as [`ManagedObjectSource::source`].
    fn source(&self, callback: SourceCallback<M>) -> std::result::Result<(), BoxError>;

    /// Take back an instance previously produced by this pool.
    fn return_instance(&self, instance: M);
}

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Configuration for [`BoundedPool`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Maximum number of idle instances kept for reuse
    pub max_idle: usize,
    /// Ask [`ManagedObject::is_reusable`] before keeping a returned instance
    pub validate_on_return: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 8,
            validate_on_return: true,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_idle == 0 {
            return Err(Error::configuration("max_idle must be greater than 0"));
        }
        Ok(())
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Requests forwarded to the underlying source.
    pub sourced: u64,
    /// Requests served from the idle set.
    pub reused: u64,
    /// Instances taken back into the idle set.
    pub returned: u64,
    /// Returned instances dropped instead of kept.
    pub discarded: u64,
    /// Current number of idle instances.
    pub idle: usize,
}

// ---------------------------------------------------------------------------
// BoundedPool
// ---------------------------------------------------------------------------

/// Pool keeping up to `max_idle` instances for reuse.
///
/// Idle instances are reused most-recently-returned first; when none is
/// idle the request is forwarded to the source.
pub struct BoundedPool<M: ManagedObject> {
    source: Arc<dyn ManagedObjectSource<M>>,
    config: PoolConfig,
    idle: Mutex<Vec<M>>,
    stats: Mutex<PoolStats>,
}

impl<M: ManagedObject> BoundedPool<M> {
    /// Create a pool in front of `source`.
    ///
    /// # Errors
    /// Returns error if `config` is invalid (e.g. max_idle == 0).
    pub fn new(source: Arc<dyn ManagedObjectSource<M>>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            idle: Mutex::new(Vec::with_capacity(config.max_idle)),
            config,
            stats: Mutex::new(PoolStats::default()),
        })
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut stats = self.stats.lock().clone();
        stats.idle = self.idle.lock().len();
        stats
    }

    /// Drop every idle instance. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<M> = self.idle.lock().drain(..).collect();
        drained.len()
    }
}

impl<M: ManagedObject> ManagedObjectPool<M> for BoundedPool<M> {
    fn source(&self, callback: SourceCallback<M>) -> std::result::Result<(), BoxError> {
        let idle = self.idle.lock().pop();
        match idle {
            Some(instance) => {
                self.stats.lock().reused += 1;
                callback.set_instance(instance);
                Ok(())
            }
            None => {
                self.stats.lock().sourced += 1;
                self.source.source(callback)
            }
        }
    }

    fn return_instance(&self, instance: M) {
        if self.config.validate_on_return && !instance.is_reusable() {
            self.stats.lock().discarded += 1;
            return;
        }

        let rejected = {
            let mut idle = self.idle.lock();
            if idle.len() < self.config.max_idle {
                idle.push(instance);
                None
            } else {
                Some(instance)
            }
        };

        let mut stats = self.stats.lock();
        if rejected.is_some() {
            stats.discarded += 1;
        } else {
            stats.returned += 1;
        }
    }
}

impl<M: ManagedObject> std::fmt::Debug for BoundedPool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
