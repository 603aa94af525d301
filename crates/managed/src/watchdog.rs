//! Periodic timeout checks for assets nobody is probing.
//!
//! A container only notices a stalled source when a caller asks whether it
//! is ready. The [`AssetManager`] closes that gap: the owning scope registers
//! every container as an [`Asset`], and the watchdog periodically lets each
//! one compare its in-flight start time against its timeout.

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::clock::Clock;

/// Something with a timeout the watchdog can check.
pub trait Asset: Send + Sync {
    /// Check whether the asset has stalled, latching a timeout failure if so.
    fn check_on_asset(&self, now: Instant);
}

/// Registry of assets checked by the watchdog.
///
/// Assets are held weakly; dropped assets are pruned on the next check.
pub struct AssetManager {
    clock: Arc<dyn Clock>,
    assets: Mutex<Vec<Weak<dyn Asset>>>,
}

impl AssetManager {
    /// Create an empty manager using `clock` for timeout comparison.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            assets: Mutex::new(Vec::new()),
        }
    }

    /// Register an asset.
    pub fn register(&self, asset: Weak<dyn Asset>) {
        self.assets.lock().push(asset);
    }

    /// Number of registered assets that are still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets
            .lock()
            .iter()
            .filter(|a| a.strong_count() > 0)
            .count()
    }

    /// Whether no live asset is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check every live asset once. Returns how many were checked.
    pub fn check(&self) -> usize {
        let live: Vec<Arc<dyn Asset>> = {
            let mut assets = self.assets.lock();
            assets.retain(|a| a.strong_count() > 0);
            assets.iter().filter_map(Weak::upgrade).collect()
        };

        let now = self.clock.now();
        for asset in &live {
            asset.check_on_asset(now);
        }
        live.len()
    }

    /// Spawn a task that calls [`check`](Self::check) every `period`.
    ///
    /// The task ends once the manager is dropped; abort the returned handle
    /// to stop it earlier.
    #[cfg(feature = "tokio")]
    pub fn spawn_watchdog(
        self: &Arc<Self>,
        period: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let checked = manager.check();
                tracing::trace!(checked, "Watchdog checked assets");
            }
        })
    }
}

impl std::fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetManager")
            .field("clock", &self.clock)
            .field("assets", &self.assets.lock().len())
            .finish()
    }
}
