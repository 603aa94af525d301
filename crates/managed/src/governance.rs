//! Governance registration bookkeeping.
//!
//! Governance is a revocable cross-cutting interceptor (e.g. a transaction)
//! applied to a managed object while the unit of work has it active. Each
//! governance that covers an instance is represented by an
//! [`ActiveGovernance`] token occupying one slot of the container; the
//! instance cannot be released while any slot is occupied.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Interception surface extracted from an instance for one governance.
pub type GovernanceSurface = Arc<dyn Any + Send + Sync>;

/// Governance state of the unit of work currently using a container.
pub trait GovernanceContainer: Send + Sync {
    /// Whether the governance at `index` is currently active.
    fn is_governance_active(&self, index: usize) -> bool;

    /// Register `surface` with the governance at `slot` and return the
    /// token that tracks the registration.
    fn create_active_governance(
        &self,
        surface: GovernanceSurface,
        owner: GovernanceOwner,
        slot: usize,
    ) -> ActiveGovernance;
}

/// Receives unregistration of an [`ActiveGovernance`].
pub trait GovernanceRegistrar: Send + Sync {
    /// Clear the slot held by `governance`.
    fn unregister_governance(&self, governance: &ActiveGovernance);
}

/// Back-reference from an [`ActiveGovernance`] to the container it covers.
#[derive(Clone)]
pub struct GovernanceOwner {
    managed_object: Arc<str>,
    registrar: Weak<dyn GovernanceRegistrar>,
}

impl GovernanceOwner {
    /// Create an owner handle for `managed_object`.
    pub fn new(managed_object: impl Into<Arc<str>>, registrar: Weak<dyn GovernanceRegistrar>) -> Self {
        Self {
            managed_object: managed_object.into(),
            registrar,
        }
    }

    /// Name of the governed managed object.
    #[must_use]
    pub fn managed_object(&self) -> &str {
        &self.managed_object
    }
}

impl std::fmt::Debug for GovernanceOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceOwner")
            .field("managed_object", &self.managed_object)
            .field("alive", &(self.registrar.strong_count() > 0))
            .finish()
    }
}

struct Registration {
    slot: usize,
    surface: GovernanceSurface,
    owner: GovernanceOwner,
    live: AtomicBool,
}

/// Registration of one governance over one managed-object instance.
///
/// Clones share the same registration.
#[derive(Clone)]
pub struct ActiveGovernance {
    inner: Arc<Registration>,
}

impl ActiveGovernance {
    /// Create a live registration for `slot`.
    #[must_use]
    pub fn new(surface: GovernanceSurface, owner: GovernanceOwner, slot: usize) -> Self {
        Self {
            inner: Arc::new(Registration {
                slot,
                surface,
                owner,
                live: AtomicBool::new(true),
            }),
        }
    }

    /// Slot index in the owning container.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.inner.slot
    }

    /// The interception surface registered with the governance.
    #[must_use]
    pub fn surface(&self) -> &GovernanceSurface {
        &self.inner.surface
    }

    /// Name of the governed managed object.
    #[must_use]
    pub fn managed_object(&self) -> &str {
        self.inner.owner.managed_object()
    }

    /// Whether the governance still covers the instance.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Mark the governance as finished without releasing the slot.
    ///
    /// The container clears the slot the next time it evaluates governance
    /// or unloads.
    pub fn deactivate(&self) {
        self.inner.live.store(false, Ordering::Release);
    }

    /// Finish the governance and release its slot in the container.
    ///
    /// Releasing a token that no longer occupies its slot is ignored by the
    /// container.
    pub fn release(&self) {
        self.deactivate();
        if let Some(registrar) = self.inner.owner.registrar.upgrade() {
            registrar.unregister_governance(self);
        }
    }

    /// Whether `other` is the same registration.
    #[must_use]
    pub fn same_registration(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ActiveGovernance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveGovernance")
            .field("managed_object", &self.managed_object())
            .field("slot", &self.slot())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Activity queued for the caller when a governance starts covering an
/// instance. The caller runs it as part of its unit of work.
#[derive(Debug, Clone)]
pub struct GovernanceActivity {
    /// Name of the governance.
    pub governance: String,
    /// The registration to govern.
    pub registration: ActiveGovernance,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingRegistrar {
        released: Mutex<Vec<usize>>,
    }

    impl GovernanceRegistrar for RecordingRegistrar {
        fn unregister_governance(&self, governance: &ActiveGovernance) {
            self.released.lock().push(governance.slot());
        }
    }

    fn owner(registrar: &Arc<RecordingRegistrar>) -> GovernanceOwner {
        let weak: Weak<dyn GovernanceRegistrar> =
            Arc::downgrade(registrar) as Weak<dyn GovernanceRegistrar>;
        GovernanceOwner::new("db", weak)
    }

    #[test]
    fn release_deactivates_and_unregisters() {
        let registrar = Arc::new(RecordingRegistrar::default());
        let governance = ActiveGovernance::new(Arc::new("tx"), owner(&registrar), 2);

        assert!(governance.is_active());
        governance.release();

        assert!(!governance.is_active());
        assert_eq!(*registrar.released.lock(), vec![2]);
    }

    #[test]
    fn deactivate_keeps_slot() {
        let registrar = Arc::new(RecordingRegistrar::default());
        let governance = ActiveGovernance::new(Arc::new("tx"), owner(&registrar), 0);

        governance.deactivate();

        assert!(!governance.is_active());
        assert!(registrar.released.lock().is_empty());
    }

    #[test]
    fn clones_share_registration() {
        let registrar = Arc::new(RecordingRegistrar::default());
        let governance = ActiveGovernance::new(Arc::new("tx"), owner(&registrar), 0);
        let clone = governance.clone();
        let other = ActiveGovernance::new(Arc::new("tx"), owner(&registrar), 0);

        assert!(governance.same_registration(&clone));
        assert!(!governance.same_registration(&other));

        clone.deactivate();
        assert!(!governance.is_active());
    }

    #[test]
    fn release_after_owner_dropped_is_harmless() {
        let registrar = Arc::new(RecordingRegistrar::default());
        let governance = ActiveGovernance::new(Arc::new("tx"), owner(&registrar), 0);
        drop(registrar);
        governance.release();
        assert!(!governance.is_active());
    }
}
