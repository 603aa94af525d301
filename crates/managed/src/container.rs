//! The managed-object container.
//!
//! A [`ManagedObjectContainer`] drives one externally-sourced instance
//! through `load → govern → coordinate → available → unload`. Callers never
//! block: an operation that cannot complete registers the caller's
//! [`Waiter`](crate::Waiter) on one of the container's monitors and returns
//! [`Readiness::Waiting`].
//!
//! Lifecycle operations serialize on the scope lock. The container's own
//! fields sit behind a separate mutex that is never held while calling out
//! to sources, pools, hooks, monitors or other containers.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::context::Context;
use crate::error::{BoxError, Error, Failure, Outcome, Readiness};
#[cfg(feature = "tokio")]
use crate::events::EventBus;
use crate::events::ContainerEvent;
use crate::governance::{
    ActiveGovernance, GovernanceActivity, GovernanceOwner, GovernanceRegistrar,
};
use crate::metadata::MetaData;
use crate::monitor::AssetMonitor;
use crate::recycle::RecycleHook;
use crate::scope::{Scope, ScopeLock, ScopedRegistry};
use crate::source::{
    AsyncListener, AsyncOperationListener, ManagedObject, ObjectUser, SourceCallback,
};
use crate::state::{Checkpoint, ContainerState, Transition};
use crate::watchdog::Asset;

/// Upper bound on forward steps taken by one readiness check.
const MAX_ADVANCE_STEPS: usize = 8;

// ---------------------------------------------------------------------------
// ObjectContainer
// ---------------------------------------------------------------------------

/// Type-erased view of a container, used by the scope to drive
/// dependencies and unload in bulk.
pub trait ObjectContainer: Send + Sync {
    /// Bound name of the managed object.
    fn name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> ContainerState;

    /// The latched failure, if any.
    fn failure(&self) -> Option<Failure>;

    /// See [`ManagedObjectContainer::load`].
    fn load(&self, ctx: &mut Context) -> Outcome;

    /// See [`ManagedObjectContainer::govern`].
    fn govern(&self, ctx: &mut Context) -> Outcome;

    /// See [`ManagedObjectContainer::coordinate`].
    fn coordinate(&self, ctx: &mut Context) -> Outcome;

    /// See [`ManagedObjectContainer::is_ready`].
    fn is_ready(&self, ctx: &mut Context) -> Outcome;

    /// See [`ManagedObjectContainer::unload`].
    fn unload(&self);

    /// The payload object, boxed for lookup by dependents.
    fn any_object(&self) -> Option<Arc<dyn Any + Send + Sync>>;
}

// ---------------------------------------------------------------------------
// ManagedObjectContainer
// ---------------------------------------------------------------------------

struct Inner<M: ManagedObject> {
    state: ContainerState,
    instance: Option<Arc<M>>,
    object: Option<M::Object>,
    failure: Option<Failure>,
    /// Start of the current sourcing request or asynchronous operation.
    in_flight_since: Option<Instant>,
    recycle: Option<RecycleHook<M>>,
    governances: Vec<Option<ActiveGovernance>>,
}

/// What a readiness probe found while holding the inner lock.
enum Probe {
    Ready,
    Wait { sourcing: bool },
    TimedOut(Error),
    Advance(ContainerState),
}

/// Lifecycle container for one managed object.
pub struct ManagedObjectContainer<M: ManagedObject> {
    this: Weak<Self>,
    metadata: Arc<MetaData<M>>,
    scope: Weak<Scope>,
    lock: Arc<ScopeLock>,
    clock: Arc<dyn Clock>,
    #[cfg(feature = "tokio")]
    events: Option<Arc<EventBus>>,
    /// Activated once the instance arrives.
    sourcing: AssetMonitor,
    /// Activated each time an asynchronous operation completes.
    operations: AssetMonitor,
    inner: Mutex<Inner<M>>,
}

impl<M: ManagedObject> ManagedObjectContainer<M> {
    pub(crate) fn new(metadata: Arc<MetaData<M>>, scope: &Arc<Scope>) -> Arc<Self> {
        let slots = metadata.config().governance.len();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            scope: Arc::downgrade(scope),
            lock: Arc::clone(scope.lock()),
            clock: Arc::clone(scope.clock()),
            #[cfg(feature = "tokio")]
            events: scope.events().cloned(),
            sourcing: AssetMonitor::new("sourcing"),
            operations: AssetMonitor::new("operations"),
            inner: Mutex::new(Inner {
                state: ContainerState::NotLoaded,
                instance: None,
                object: None,
                failure: None,
                in_flight_since: None,
                recycle: None,
                governances: vec![None; slots],
            }),
            metadata,
        })
    }

    /// Bound name of the managed object.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Metadata the container was bound with.
    #[must_use]
    pub fn metadata(&self) -> &Arc<MetaData<M>> {
        &self.metadata
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContainerState {
        self.inner.lock().state
    }

    /// The latched failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<Failure> {
        self.inner.lock().failure.clone()
    }

    /// Whether an instance has been delivered and not yet released.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.lock().instance.is_some()
    }

    /// The payload object. Only present while the state is
    /// [`ContainerState::ObjectAvailable`] and nothing failed.
    #[must_use]
    pub fn object(&self) -> Option<M::Object> {
        let inner = self.inner.lock();
        if inner.failure.is_some() || inner.state != ContainerState::ObjectAvailable {
            return None;
        }
        inner.object.clone()
    }

    /// The registration occupying governance `slot`.
    #[must_use]
    pub fn governance(&self, slot: usize) -> Option<ActiveGovernance> {
        self.inner.lock().governances.get(slot).cloned().flatten()
    }

    /// Number of callers waiting for the instance or for an asynchronous
    /// operation.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.sourcing.waiting() + self.operations.waiting()
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Ask the source (or pool) for an instance.
    ///
    /// Only the first call sources; later calls report whether the instance
    /// has arrived. The source may deliver before this returns, in which
    /// case the result is already [`Readiness::Ready`].
    pub fn load(&self, ctx: &mut Context) -> Outcome {
        let _scope = self.lock.lock();
        let begin = {
            let mut inner = self.inner.lock();
            self.ensure_usable(&inner)?;
            if inner.state == ContainerState::NotLoaded {
                self.transition(&mut inner, Transition::BeginLoad)?;
                inner.in_flight_since = Some(self.clock.now());
                true
            } else {
                false
            }
        };

        if begin {
            tracing::debug!(managed_object = %self.name(), job = %ctx.job(), "Sourcing instance");
            self.emit(|| ContainerEvent::Sourcing {
                managed_object: self.name().to_string(),
            });
            self.request_instance()?;
        }
        self.check_ready(ctx, Checkpoint::Loaded)
    }

    /// Evaluate governance for the caller.
    ///
    /// The first call moves a loaded container to `Governing` and waits for
    /// the instance to settle. Each call then registers every governance
    /// that is active for the caller and not yet covering the instance,
    /// queueing a [`GovernanceActivity`] on `ctx` for each. A slot whose
    /// registration has finished is cleared and registered again on the
    /// following call.
    pub fn govern(&self, ctx: &mut Context) -> Outcome {
        let _scope = self.lock.lock();
        let state = {
            let mut inner = self.inner.lock();
            self.ensure_usable(&inner)?;
            match inner.state {
                ContainerState::NotLoaded => {
                    return Err(self.invariant("governance requested before load"));
                }
                ContainerState::Loaded => {
                    self.transition(&mut inner, Transition::BeginGovern)?;
                    inner.state
                }
                state => state,
            }
        };

        if matches!(state, ContainerState::Loading | ContainerState::Governing)
            && self.check_ready(ctx, Checkpoint::Loaded)? == Readiness::Waiting
        {
            return Ok(Readiness::Waiting);
        }

        {
            let mut inner = self.inner.lock();
            self.ensure_usable(&inner)?;
            if inner.state == ContainerState::Loaded {
                self.transition(&mut inner, Transition::BeginGovern)?;
            }
            if inner.state == ContainerState::Governing {
                self.transition(&mut inner, Transition::Govern)?;
            }
            if !Checkpoint::Governed.reached_by(inner.state) {
                return Err(self.invariant(format!("governance evaluated while {}", inner.state)));
            }
        }

        self.evaluate_governance(ctx)?;
        Ok(Readiness::Ready)
    }

    /// Inject dependencies and expose the payload object.
    ///
    /// Coordinating managed objects first wait for every declared
    /// dependency to become available, then have their coordination hook
    /// run against those dependencies.
    pub fn coordinate(&self, ctx: &mut Context) -> Outcome {
        let _scope = self.lock.lock();
        let state = {
            let inner = self.inner.lock();
            self.ensure_usable(&inner)?;
            inner.state
        };

        match state {
            ContainerState::NotLoaded | ContainerState::Loaded | ContainerState::Governing => {
                return Err(self.invariant(format!("coordination requested while {state}")));
            }
            ContainerState::Loading => return self.check_ready(ctx, Checkpoint::Loaded),
            ContainerState::ObjectAvailable => return Ok(Readiness::Ready),
            ContainerState::UnloadWaitingGovernance | ContainerState::Unloading => {
                return Err(self.unloaded());
            }
            ContainerState::Governed | ContainerState::Coordinating => {}
        }

        if state == ContainerState::Governed {
            if self.metadata.config().coordinating {
                if self.dependencies_ready(ctx)? == Readiness::Waiting {
                    return Ok(Readiness::Waiting);
                }
                if self.check_ready(ctx, Checkpoint::Governed)? == Readiness::Waiting {
                    return Ok(Readiness::Waiting);
                }
                let instance = self.current_instance()?;
                self.run_coordination(&instance)?;
            }
            let mut inner = self.inner.lock();
            self.ensure_usable(&inner)?;
            if inner.state == ContainerState::Governed {
                self.transition(&mut inner, Transition::Coordinate)?;
            }
        }

        let instance = self.current_instance()?;
        let object = instance
            .object()
            .map_err(|cause| self.latch(Error::sourcing_failed(self.name(), cause)))?;
        let exposed = {
            let mut inner = self.inner.lock();
            self.ensure_usable(&inner)?;
            if inner.state == ContainerState::Coordinating {
                inner.object = Some(object);
                self.transition(&mut inner, Transition::ExposeObject)?;
                true
            } else {
                false
            }
        };

        if exposed {
            tracing::debug!(managed_object = %self.name(), job = %ctx.job(), "Object available");
            self.emit(|| ContainerEvent::Available {
                managed_object: self.name().to_string(),
            });
        }
        Ok(Readiness::Ready)
    }

    /// Whether the payload object is available, driving the container
    /// forward as far as it can go.
    pub fn is_ready(&self, ctx: &mut Context) -> Outcome {
        self.check_ready(ctx, Checkpoint::ObjectAvailable)
    }

    /// Drive the container until `required` is reached, or register the
    /// caller on the monitor it has to wait on.
    ///
    /// A latched failure is returned as is. A sourcing request or
    /// asynchronous operation in flight for longer than the configured
    /// timeout latches a timeout failure.
    pub fn check_ready(&self, ctx: &mut Context, required: Checkpoint) -> Outcome {
        let _scope = self.lock.lock();

        for _ in 0..MAX_ADVANCE_STEPS {
            match self.probe(required)? {
                Probe::Ready => return Ok(Readiness::Ready),
                Probe::TimedOut(error) => return Err(self.latch(error)),
                Probe::Wait { sourcing } => {
                    let monitor = if sourcing {
                        &self.sourcing
                    } else {
                        &self.operations
                    };
                    if !monitor.wait_on_asset(ctx.waiter()) {
                        return Err(self.invariant("monitor settled while the container is pending"));
                    }
                    tracing::trace!(
                        managed_object = %self.name(),
                        job = %ctx.job(),
                        sourcing,
                        "Waiting"
                    );
                    return Ok(Readiness::Waiting);
                }
                Probe::Advance(state) => {
                    let step = match state {
                        ContainerState::NotLoaded => self.load(ctx)?,
                        ContainerState::Loaded | ContainerState::Governing => self.govern(ctx)?,
                        ContainerState::Governed | ContainerState::Coordinating => {
                            self.coordinate(ctx)?
                        }
                        other => {
                            return Err(self.invariant(format!("cannot reach {required} from {other}")));
                        }
                    };
                    if step == Readiness::Waiting {
                        return Ok(Readiness::Waiting);
                    }
                    let after = self.inner.lock().state;
                    if after == state {
                        return Err(self.invariant(format!("no progress from {state}")));
                    }
                }
            }
        }
        Err(self.invariant(format!("{required} not reached after {MAX_ADVANCE_STEPS} steps")))
    }

    /// Deliver the sourced instance.
    ///
    /// Only the first delivery to a loading, non-failed container is kept.
    /// Any other delivery is released through the recycle hook without being
    /// exposed.
    pub fn set_resource_instance(&self, instance: M) {
        let _scope = self.lock.lock();
        let delivered = {
            let mut inner = self.inner.lock();
            let next = if inner.failure.is_none() && inner.instance.is_none() {
                inner.state.next(Transition::Deliver)
            } else {
                None
            };
            match next {
                Some(next) => {
                    tracing::trace!(
                        managed_object = %self.name(),
                        from = %inner.state,
                        to = %next,
                        "Transition"
                    );
                    let instance = Arc::new(instance);
                    inner.state = next;
                    inner.instance = Some(Arc::clone(&instance));
                    inner.recycle = Some(self.recycle_hook());
                    inner.in_flight_since = None;
                    Ok(instance)
                }
                None => Err(instance),
            }
        };
        let instance = match delivered {
            Ok(instance) => instance,
            Err(rejected) => {
                self.discard(rejected);
                return;
            }
        };

        instance.bind_name(self.name());
        if self.metadata.config().asynchronous {
            let listener: Weak<dyn AsyncOperationListener> = self.this.clone();
            instance.register_async_listener(AsyncListener::new(listener));
        }

        tracing::debug!(managed_object = %self.name(), "Instance loaded");
        self.sourcing.activate_permanently();
        self.emit(|| ContainerEvent::Loaded {
            managed_object: self.name().to_string(),
        });
    }

    /// Report that sourcing failed. The first failure is latched; later
    /// ones are ignored.
    pub fn set_failure(&self, cause: BoxError) {
        let _scope = self.lock.lock();
        self.latch(Error::sourcing_failed(self.name(), cause));
    }

    /// An asynchronous operation started on the instance.
    pub fn notify_async_operation_started(&self) {
        let _scope = self.lock.lock();
        let mut inner = self.inner.lock();
        if inner.failure.is_none() && inner.in_flight_since.is_none() {
            inner.in_flight_since = Some(self.clock.now());
            tracing::trace!(managed_object = %self.name(), "Asynchronous operation started");
        }
    }

    /// The asynchronous operation completed; callers waiting on it resume.
    pub fn notify_async_operation_complete(&self) {
        let _scope = self.lock.lock();
        let cleared = {
            let mut inner = self.inner.lock();
            if inner.failure.is_some() {
                false
            } else {
                inner.in_flight_since = None;
                true
            }
        };
        if cleared {
            tracing::trace!(managed_object = %self.name(), "Asynchronous operation complete");
            self.operations.activate();
        }
    }

    /// Release the instance.
    ///
    /// While any governance still covers the instance the container only
    /// moves to [`ContainerState::UnloadWaitingGovernance`]; the release
    /// happens when the last governance unregisters. Unloading a failed
    /// container still releases whatever instance it holds.
    pub fn unload(&self) {
        let _scope = self.lock.lock();
        let (instance, hook) = {
            let mut inner = self.inner.lock();
            if inner.state == ContainerState::Unloading {
                return;
            }
            if inner.state != ContainerState::UnloadWaitingGovernance
                && self.transition(&mut inner, Transition::BeginUnload).is_err()
            {
                return;
            }
            for slot in &mut inner.governances {
                if slot.as_ref().is_some_and(|g| !g.is_active()) {
                    *slot = None;
                }
            }
            let occupied = inner.governances.iter().filter(|g| g.is_some()).count();
            if occupied > 0 {
                tracing::debug!(
                    managed_object = %self.name(),
                    occupied,
                    "Unload waiting for governance"
                );
                return;
            }
            if self.transition(&mut inner, Transition::Release).is_err() {
                return;
            }
            inner.object = None;
            inner.in_flight_since = None;
            (inner.instance.take(), inner.recycle.take())
        };

        self.sourcing.activate_permanently();
        self.operations.activate_permanently();

        let outcome = instance.map(|instance| {
            hook.unwrap_or_else(|| self.recycle_hook())
                .release(instance)
        });
        tracing::debug!(managed_object = %self.name(), ?outcome, "Unloaded");
        if let Some(outcome) = outcome {
            self.emit(|| ContainerEvent::Unloaded {
                managed_object: self.name().to_string(),
                outcome,
            });
        }
    }

    /// Clear the governance slot held by `governance`, finishing a pending
    /// unload once every slot is empty.
    pub fn unregister_governance(&self, governance: &ActiveGovernance) {
        let _scope = self.lock.lock();
        let resume_unload = {
            let mut inner = self.inner.lock();
            let slot = governance.slot();
            let held = inner
                .governances
                .get(slot)
                .and_then(Option::as_ref)
                .is_some_and(|current| current.same_registration(governance));
            if !held {
                tracing::trace!(managed_object = %self.name(), slot, "Stale governance ignored");
                return;
            }
            inner.governances[slot] = None;
            tracing::debug!(managed_object = %self.name(), slot, "Governance unregistered");
            inner.state == ContainerState::UnloadWaitingGovernance
                && inner.governances.iter().all(Option::is_none)
        };
        if resume_unload {
            self.unload();
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn ensure_usable(&self, inner: &Inner<M>) -> Result<(), Failure> {
        if let Some(failure) = &inner.failure {
            return Err(Arc::clone(failure));
        }
        if inner.state.is_unloading() {
            return Err(self.unloaded());
        }
        Ok(())
    }

    fn probe(&self, required: Checkpoint) -> Result<Probe, Failure> {
        let inner = self.inner.lock();
        self.ensure_usable(&inner)?;

        if inner.state == ContainerState::NotLoaded {
            return Ok(Probe::Advance(inner.state));
        }
        if self.is_pending(&inner) {
            if let Some(error) = self.timeout_error(&inner, self.clock.now()) {
                return Ok(Probe::TimedOut(error));
            }
            return Ok(Probe::Wait {
                sourcing: inner.instance.is_none(),
            });
        }
        if required.reached_by(inner.state) {
            return Ok(Probe::Ready);
        }
        Ok(Probe::Advance(inner.state))
    }

    /// Waiting for the instance, or for an asynchronous operation.
    fn is_pending(&self, inner: &Inner<M>) -> bool {
        inner.instance.is_none()
            || (self.metadata.config().asynchronous && inner.in_flight_since.is_some())
    }

    fn timeout_error(&self, inner: &Inner<M>, now: Instant) -> Option<Error> {
        let started = inner.in_flight_since?;
        let timeout = self.metadata.config().timeout;
        if now.saturating_duration_since(started) <= timeout {
            return None;
        }
        let managed_object = self.name().to_string();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Some(if inner.instance.is_some() {
            Error::OperationTimedOut {
                managed_object,
                timeout_ms,
            }
        } else {
            Error::SourcingTimedOut {
                managed_object,
                timeout_ms,
            }
        })
    }

    fn transition(&self, inner: &mut Inner<M>, transition: Transition) -> Result<(), Failure> {
        match inner.state.next(transition) {
            Some(next) => {
                tracing::trace!(
                    managed_object = %self.name(),
                    from = %inner.state,
                    to = %next,
                    "Transition"
                );
                inner.state = next;
                Ok(())
            }
            None => Err(self.invariant(format!("{transition:?} is invalid while {}", inner.state))),
        }
    }

    /// Latch `error` unless a failure is already latched, failing every
    /// waiter. Returns the latched failure. Must not be called with the
    /// inner lock held.
    fn latch(&self, error: Error) -> Failure {
        let (failure, fresh) = {
            let mut inner = self.inner.lock();
            match &inner.failure {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let failure = Arc::new(error);
                    inner.failure = Some(Arc::clone(&failure));
                    (failure, true)
                }
            }
        };

        if fresh {
            tracing::warn!(managed_object = %self.name(), error = %failure, "Failure latched");
            self.sourcing.fail_permanently(&failure);
            self.operations.fail_permanently(&failure);
            self.emit(|| ContainerEvent::Failed {
                managed_object: self.name().to_string(),
                error: failure.to_string(),
            });
        }
        failure
    }

    fn invariant(&self, message: impl Into<String>) -> Failure {
        let error = Error::invariant(self.name(), message);
        tracing::error!(managed_object = %self.name(), error = %error, "Invariant violated");
        Arc::new(error)
    }

    fn unloaded(&self) -> Failure {
        Arc::new(Error::Unloaded {
            managed_object: self.name().to_string(),
        })
    }

    fn request_instance(&self) -> Result<(), Failure> {
        let Some(this) = self.this.upgrade() else {
            return Err(self.invariant("container dropped while sourcing"));
        };
        let callback = SourceCallback::new(this as Arc<dyn ObjectUser<M>>);
        let requested = match self.metadata.pool() {
            Some(pool) => pool.source(callback),
            None => self.metadata.source().source(callback),
        };
        if let Err(cause) = requested {
            self.latch(Error::sourcing_failed(self.name(), cause));
        }
        Ok(())
    }

    fn recycle_hook(&self) -> RecycleHook<M> {
        RecycleHook::new(
            self.metadata.shared_name(),
            self.metadata.recycle().cloned(),
            self.metadata.pool().cloned(),
        )
    }

    fn discard(&self, instance: M) {
        tracing::warn!(managed_object = %self.name(), "Discarding unexpected instance delivery");
        let outcome = self.recycle_hook().release(Arc::new(instance));
        tracing::debug!(managed_object = %self.name(), ?outcome, "Discarded delivery released");
        self.emit(|| ContainerEvent::DeliveryDiscarded {
            managed_object: self.name().to_string(),
        });
    }

    fn current_instance(&self) -> Result<Arc<M>, Failure> {
        let instance = self.inner.lock().instance.clone();
        instance.ok_or_else(|| self.invariant("no instance while coordinating"))
    }

    fn dependencies_ready(&self, ctx: &mut Context) -> Outcome {
        let dependencies = self.metadata.dependencies();
        if dependencies.is_empty() {
            return Ok(Readiness::Ready);
        }
        let Some(scope) = self.scope.upgrade() else {
            return Err(self.invariant("scope dropped before dependencies were resolved"));
        };
        scope.dependencies_ready(self.name(), dependencies, ctx)
    }

    fn run_coordination(&self, instance: &M) -> Result<(), Failure> {
        let Some(scope) = self.scope.upgrade() else {
            return Err(self.invariant("scope dropped before coordination"));
        };
        let registry = ScopedRegistry::new(&scope, self.metadata.dependencies());
        instance
            .coordinate(&registry)
            .map_err(|cause| self.latch(Error::coordination_failed(self.name(), cause)))?;
        tracing::debug!(managed_object = %self.name(), "Coordinated");
        Ok(())
    }

    fn evaluate_governance(&self, ctx: &mut Context) -> Result<(), Failure> {
        let descriptors = &self.metadata.config().governance;
        if descriptors.is_empty() {
            return Ok(());
        }
        let Some(governance) = ctx.governance().cloned() else {
            return Ok(());
        };

        for (index, descriptor) in descriptors.iter().enumerate() {
            if !governance.is_governance_active(index) {
                continue;
            }
            let instance = {
                let mut inner = self.inner.lock();
                let occupied = inner.governances[index]
                    .as_ref()
                    .map(ActiveGovernance::is_active);
                match occupied {
                    Some(true) => continue,
                    Some(false) => {
                        tracing::debug!(
                            managed_object = %self.name(),
                            governance = %descriptor.name,
                            "Clearing finished governance"
                        );
                        inner.governances[index] = None;
                        continue;
                    }
                    None => {}
                }
                inner.instance.clone()
            };
            let Some(instance) = instance else {
                return Err(self.invariant("governance evaluated without an instance"));
            };

            let surface = instance.governance_surface(&descriptor.name).map_err(|cause| {
                self.latch(Error::GovernanceFailed {
                    managed_object: self.name().to_string(),
                    governance: descriptor.name.clone(),
                    source: Arc::from(cause),
                })
            })?;
            let registrar: Weak<dyn GovernanceRegistrar> = self.this.clone();
            let owner = GovernanceOwner::new(self.metadata.shared_name(), registrar);
            let registration = governance.create_active_governance(surface, owner, index);
            self.inner.lock().governances[index] = Some(registration.clone());

            tracing::debug!(
                managed_object = %self.name(),
                governance = %descriptor.name,
                job = %ctx.job(),
                "Governance registered"
            );
            ctx.queue_activity(GovernanceActivity {
                governance: descriptor.name.clone(),
                registration,
            });
            self.emit(|| ContainerEvent::Governed {
                managed_object: self.name().to_string(),
                governance: descriptor.name.clone(),
            });
        }
        Ok(())
    }

    #[cfg(feature = "tokio")]
    fn emit(&self, event: impl FnOnce() -> ContainerEvent) {
        if let Some(events) = &self.events {
            events.emit(event());
        }
    }

    #[cfg(not(feature = "tokio"))]
    fn emit(&self, _event: impl FnOnce() -> ContainerEvent) {}
}

impl<M: ManagedObject> std::fmt::Debug for ManagedObjectContainer<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ManagedObjectContainer")
            .field("name", &self.name())
            .field("state", &inner.state)
            .field("loaded", &inner.instance.is_some())
            .field("failure", &inner.failure)
            .field("in_flight", &inner.in_flight_since.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

impl<M: ManagedObject> ObjectContainer for ManagedObjectContainer<M> {
    fn name(&self) -> &str {
        self.metadata.name()
    }

    fn state(&self) -> ContainerState {
        Self::state(self)
    }

    fn failure(&self) -> Option<Failure> {
        Self::failure(self)
    }

    fn load(&self, ctx: &mut Context) -> Outcome {
        Self::load(self, ctx)
    }

    fn govern(&self, ctx: &mut Context) -> Outcome {
        Self::govern(self, ctx)
    }

    fn coordinate(&self, ctx: &mut Context) -> Outcome {
        Self::coordinate(self, ctx)
    }

    fn is_ready(&self, ctx: &mut Context) -> Outcome {
        Self::is_ready(self, ctx)
    }

    fn unload(&self) {
        Self::unload(self);
    }

    fn any_object(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.object()
            .map(|object| Arc::new(object) as Arc<dyn Any + Send + Sync>)
    }
}

impl<M: ManagedObject> ObjectUser<M> for ManagedObjectContainer<M> {
    fn set_instance(&self, instance: M) {
        self.set_resource_instance(instance);
    }

    fn set_failure(&self, cause: BoxError) {
        Self::set_failure(self, cause);
    }
}

impl<M: ManagedObject> AsyncOperationListener for ManagedObjectContainer<M> {
    fn notify_async_operation_started(&self) {
        Self::notify_async_operation_started(self);
    }

    fn notify_async_operation_complete(&self) {
        Self::notify_async_operation_complete(self);
    }
}

impl<M: ManagedObject> GovernanceRegistrar for ManagedObjectContainer<M> {
    fn unregister_governance(&self, governance: &ActiveGovernance) {
        Self::unregister_governance(self, governance);
    }
}

impl<M: ManagedObject> Asset for ManagedObjectContainer<M> {
    fn check_on_asset(&self, now: Instant) {
        let _scope = self.lock.lock();
        let error = {
            let inner = self.inner.lock();
            if inner.failure.is_some() || inner.state.is_unloading() || !self.is_pending(&inner) {
                return;
            }
            self.timeout_error(&inner, now)
        };
        if let Some(error) = error {
            tracing::warn!(managed_object = %self.name(), "Watchdog found a stalled container");
            self.latch(error);
        }
    }
}
