//! Test doubles for driving containers without a real scheduler.
//!
//! Shared by the unit tests of this crate, its integration tests, and
//! downstream crates that want to exercise their own managed objects.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::{BoxError, Failure};
use crate::governance::{
    ActiveGovernance, GovernanceContainer, GovernanceOwner, GovernanceSurface,
};
use crate::monitor::Waiter;
use crate::recycle::{Recycle, RecycleDecision};
use crate::source::{
    AsyncListener, ManagedObject, ManagedObjectSource, ObjectRegistry, SourceCallback,
};

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

// ---------------------------------------------------------------------------
// RecordingWaiter
// ---------------------------------------------------------------------------

/// Waiter that records how it was resumed.
#[derive(Debug, Default)]
pub struct RecordingWaiter {
    activations: AtomicUsize,
    failures: Mutex<Vec<Failure>>,
}

impl RecordingWaiter {
    /// Create a shared waiter.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// How many times the waiter was activated.
    #[must_use]
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    /// Failures the waiter was resumed with, in order.
    #[must_use]
    pub fn failures(&self) -> Vec<Failure> {
        self.failures.lock().clone()
    }
}

impl Waiter for RecordingWaiter {
    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn fail(&self, cause: Failure) {
        self.failures.lock().push(cause);
    }
}

// ---------------------------------------------------------------------------
// TestObject
// ---------------------------------------------------------------------------

/// What the container did to the instances sharing it.
#[derive(Debug, Default)]
pub struct Observations {
    bound_name: Mutex<Option<String>>,
    listener: Mutex<Option<AsyncListener>>,
    resolved: Mutex<Vec<(String, Option<u32>)>>,
}

impl Observations {
    /// Create an empty, shareable record.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The name the container bound, once delivered.
    #[must_use]
    pub fn bound_name(&self) -> Option<String> {
        self.bound_name.lock().clone()
    }

    /// The registered asynchronous-operation listener.
    #[must_use]
    pub fn listener(&self) -> Option<AsyncListener> {
        self.listener.lock().clone()
    }

    /// Dependencies resolved during coordination.
    #[must_use]
    pub fn resolved(&self) -> Vec<(String, Option<u32>)> {
        self.resolved.lock().clone()
    }
}

/// Managed object whose payload is its numeric id.
#[derive(Debug)]
pub struct TestObject {
    id: u32,
    reusable: AtomicBool,
    dependencies: Vec<String>,
    fail_coordination: bool,
    observed: Arc<Observations>,
}

impl TestObject {
    /// Create an instance with payload `id`.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            reusable: AtomicBool::new(true),
            dependencies: Vec::new(),
            fail_coordination: false,
            observed: Observations::new(),
        }
    }

    /// Look up `names` as `u32` payloads when coordinated.
    #[must_use]
    pub fn with_dependencies(mut self, names: &[&str]) -> Self {
        self.dependencies = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Fail the coordination hook.
    #[must_use]
    pub fn failing_coordination(mut self) -> Self {
        self.fail_coordination = true;
        self
    }

    /// Record hook calls in `observed` so they stay visible after the
    /// instance is handed over.
    #[must_use]
    pub fn with_observations(mut self, observed: Arc<Observations>) -> Self {
        self.observed = observed;
        self
    }

    /// The payload id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Control what [`ManagedObject::is_reusable`] reports.
    pub fn set_reusable(&self, reusable: bool) {
        self.reusable.store(reusable, Ordering::SeqCst);
    }

    /// Hook calls recorded so far.
    #[must_use]
    pub fn observations(&self) -> &Arc<Observations> {
        &self.observed
    }
}

impl ManagedObject for TestObject {
    type Object = u32;

    fn object(&self) -> Result<u32, BoxError> {
        Ok(self.id)
    }

    fn bind_name(&self, name: &str) {
        *self.observed.bound_name.lock() = Some(name.to_string());
    }

    fn register_async_listener(&self, listener: AsyncListener) {
        *self.observed.listener.lock() = Some(listener);
    }

    fn coordinate(&self, registry: &dyn ObjectRegistry) -> Result<(), BoxError> {
        if self.fail_coordination {
            return Err("dependency wiring rejected".into());
        }
        let mut resolved = self.observed.resolved.lock();
        for name in &self.dependencies {
            resolved.push((name.clone(), registry.get::<u32>(name)));
        }
        Ok(())
    }

    fn governance_surface(&self, governance: &str) -> Result<GovernanceSurface, BoxError> {
        Ok(Arc::new(format!("{governance}:{}", self.id)))
    }

    fn is_reusable(&self) -> bool {
        self.reusable.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

type Factory = Box<dyn Fn(u32) -> TestObject + Send + Sync>;

/// Source that delivers before returning. Ids count up from zero.
pub struct ImmediateSource {
    next_id: AtomicU32,
    sourced: AtomicUsize,
    factory: Option<Factory>,
}

impl ImmediateSource {
    /// Deliver plain [`TestObject`]s.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(0),
            sourced: AtomicUsize::new(0),
            factory: None,
        }
    }

    /// Build each delivered instance with `factory`.
    #[must_use]
    pub fn with_factory(factory: impl Fn(u32) -> TestObject + Send + Sync + 'static) -> Self {
        Self {
            factory: Some(Box::new(factory)),
            ..Self::new()
        }
    }

    /// How many instances were sourced.
    #[must_use]
    pub fn sourced(&self) -> usize {
        self.sourced.load(Ordering::SeqCst)
    }
}

impl Default for ImmediateSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagedObjectSource<TestObject> for ImmediateSource {
    fn source(&self, callback: SourceCallback<TestObject>) -> Result<(), BoxError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sourced.fetch_add(1, Ordering::SeqCst);
        let instance = match &self.factory {
            Some(factory) => factory(id),
            None => TestObject::new(id),
        };
        callback.set_instance(instance);
        Ok(())
    }
}

/// Source that parks requests until the test settles them.
pub struct DeferredSource<M> {
    pending: Mutex<VecDeque<SourceCallback<M>>>,
}

impl<M> DeferredSource<M> {
    /// Create a source with no pending requests.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of requests not yet settled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Deliver `instance` to the oldest pending request. Returns `false` if
    /// nothing was pending.
    pub fn deliver(&self, instance: M) -> bool {
        let callback = self.pending.lock().pop_front();
        match callback {
            Some(callback) => {
                callback.set_instance(instance);
                true
            }
            None => false,
        }
    }

    /// Fail the oldest pending request. Returns `false` if nothing was
    /// pending.
    pub fn fail(&self, cause: &str) -> bool {
        let callback = self.pending.lock().pop_front();
        match callback {
            Some(callback) => {
                callback.set_failure(cause.to_string());
                true
            }
            None => false,
        }
    }

    /// Keep a callback so a later, duplicate delivery can be simulated.
    #[must_use]
    pub fn peek(&self) -> Option<SourceCallback<M>> {
        self.pending.lock().front().cloned()
    }
}

impl<M> Default for DeferredSource<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ManagedObject> ManagedObjectSource<M> for DeferredSource<M> {
    fn source(&self, callback: SourceCallback<M>) -> Result<(), BoxError> {
        self.pending.lock().push_back(callback);
        Ok(())
    }
}

/// Source that fails every request.
#[derive(Debug, Clone)]
pub struct FailingSource {
    message: String,
    through_callback: bool,
}

impl FailingSource {
    /// Fail by returning an error from [`ManagedObjectSource::source`].
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            through_callback: false,
        }
    }

    /// Fail through [`SourceCallback::set_failure`] before returning.
    #[must_use]
    pub fn through_callback(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            through_callback: true,
        }
    }
}

impl<M: ManagedObject> ManagedObjectSource<M> for FailingSource {
    fn source(&self, callback: SourceCallback<M>) -> Result<(), BoxError> {
        if self.through_callback {
            callback.set_failure(self.message.clone());
            Ok(())
        } else {
            Err(self.message.clone().into())
        }
    }
}

// ---------------------------------------------------------------------------
// Governance and recycling
// ---------------------------------------------------------------------------

/// Governance state whose slots are switched on and off by the test.
#[derive(Debug)]
pub struct ToggleGovernance {
    active: Mutex<Vec<bool>>,
    registrations: Mutex<Vec<ActiveGovernance>>,
}

impl ToggleGovernance {
    /// Create `slots` governances, all active.
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            active: Mutex::new(vec![true; slots]),
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Switch the governance at `index` on or off.
    pub fn set_active(&self, index: usize, active: bool) {
        if let Some(slot) = self.active.lock().get_mut(index) {
            *slot = active;
        }
    }

    /// Every registration created so far.
    #[must_use]
    pub fn registrations(&self) -> Vec<ActiveGovernance> {
        self.registrations.lock().clone()
    }
}

impl GovernanceContainer for ToggleGovernance {
    fn is_governance_active(&self, index: usize) -> bool {
        self.active.lock().get(index).copied().unwrap_or(false)
    }

    fn create_active_governance(
        &self,
        surface: GovernanceSurface,
        owner: GovernanceOwner,
        slot: usize,
    ) -> ActiveGovernance {
        let registration = ActiveGovernance::new(surface, owner, slot);
        self.registrations.lock().push(registration.clone());
        registration
    }
}

/// Cleanup that counts how often it ran.
#[derive(Debug)]
pub struct CountingRecycle {
    decision: RecycleDecision,
    count: AtomicUsize,
}

impl CountingRecycle {
    /// Always answer `decision`.
    #[must_use]
    pub fn new(decision: RecycleDecision) -> Self {
        Self {
            decision,
            count: AtomicUsize::new(0),
        }
    }

    /// How many instances were cleaned up.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<M> Recycle<M> for CountingRecycle {
    fn recycle(&self, _managed_object: &str, _instance: &M) -> RecycleDecision {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}
