//! Wait/activate queues used to suspend and resume callers without
//! blocking a thread.
//!
//! A caller that finds an asset not yet ready registers a [`Waiter`] on the
//! asset's [`AssetMonitor`] and returns "waiting" to its scheduler. When the
//! asset settles, the monitor activates (or fails) every registered waiter.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Failure;

/// A suspended unit of work the scheduler can resume.
///
/// Implementations are provided by the scheduler; activation must not block.
pub trait Waiter: Send + Sync {
    /// Resume the unit of work.
    fn activate(&self);

    /// Resume the unit of work with a forced failure.
    fn fail(&self, cause: Failure);
}

/// How a monitor settled for good.
#[derive(Debug, Clone)]
enum Settlement {
    Activated,
    Failed(Failure),
}

struct MonitorInner {
    waiters: Vec<Arc<dyn Waiter>>,
    settled: Option<Settlement>,
}

/// Per-asset queue of suspended callers.
///
/// Once activated or failed permanently the monitor is never reused:
/// further [`wait_on_asset`](Self::wait_on_asset) calls are refused.
pub struct AssetMonitor {
    label: &'static str,
    inner: Mutex<MonitorInner>,
}

impl AssetMonitor {
    /// Create an open monitor. `label` only shows up in logs.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            inner: Mutex::new(MonitorInner {
                waiters: Vec::new(),
                settled: None,
            }),
        }
    }

    /// Register `waiter` to be resumed when the asset settles.
    ///
    /// Registering the same waiter twice keeps a single entry. Returns
    /// `false` if the monitor already settled permanently and can no longer
    /// be waited on.
    pub fn wait_on_asset(&self, waiter: &Arc<dyn Waiter>) -> bool {
        let mut inner = self.inner.lock();
        if inner.settled.is_some() {
            return false;
        }
        if !inner.waiters.iter().any(|w| Arc::ptr_eq(w, waiter)) {
            inner.waiters.push(Arc::clone(waiter));
        }
        tracing::trace!(
            monitor = self.label,
            waiting = inner.waiters.len(),
            "Waiter registered"
        );
        true
    }

    /// Resume every current waiter but keep the monitor open.
    pub fn activate(&self) {
        let waiters = std::mem::take(&mut self.inner.lock().waiters);
        for waiter in waiters {
            waiter.activate();
        }
    }

    /// Resume every waiter and refuse any later wait.
    pub fn activate_permanently(&self) {
        let waiters = {
            let mut inner = self.inner.lock();
            if inner.settled.is_none() {
                inner.settled = Some(Settlement::Activated);
            }
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            waiter.activate();
        }
    }

    /// Fail every waiter with `cause` and refuse any later wait.
    ///
    /// A monitor that already settled keeps its first settlement.
    pub fn fail_permanently(&self, cause: &Failure) {
        let waiters = {
            let mut inner = self.inner.lock();
            if inner.settled.is_none() {
                inner.settled = Some(Settlement::Failed(Arc::clone(cause)));
            }
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            waiter.fail(Arc::clone(cause));
        }
    }

    /// Number of callers currently waiting.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Whether the monitor settled permanently.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.lock().settled.is_some()
    }

    /// The failure the monitor settled with, if it failed.
    #[must_use]
    pub fn failure(&self) -> Option<Failure> {
        match &self.inner.lock().settled {
            Some(Settlement::Failed(cause)) => Some(Arc::clone(cause)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AssetMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AssetMonitor")
            .field("label", &self.label)
            .field("waiting", &inner.waiters.len())
            .field("settled", &inner.settled)
            .finish()
    }
}
