//! End-to-end lifecycle scenarios for a single container: synchronous and
//! deferred sourcing, timeouts, failure latching, duplicate deliveries and
//! unload.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;
use tessera_managed::testing::{
    CountingRecycle, DeferredSource, FailingSource, ImmediateSource, ManualClock, Observations,
    RecordingWaiter, TestObject,
};
use tessera_managed::{
    ContainerConfig, ContainerState, Context, Error, ManagedObjectContainer, ManagedObjectSource,
    MetaData, Readiness, RecycleDecision, Scope, ScopeKind,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn scope() -> Arc<Scope> {
    Arc::new(Scope::new(ScopeKind::Thread, "lifecycle"))
}

fn scope_with_clock(clock: &Arc<ManualClock>) -> Arc<Scope> {
    Arc::new(Scope::new(ScopeKind::Thread, "lifecycle").with_clock(clock.clone()))
}

fn context(waiter: &Arc<RecordingWaiter>) -> Context {
    Context::new("job", waiter.clone())
}

fn bind(
    scope: &Arc<Scope>,
    source: Arc<dyn ManagedObjectSource<TestObject>>,
    config: ContainerConfig,
) -> Arc<ManagedObjectContainer<TestObject>> {
    let metadata = MetaData::builder("db", source).config(config).build().unwrap();
    scope.bind(metadata).unwrap()
}

fn timeout(millis: u64) -> ContainerConfig {
    ContainerConfig {
        timeout: Duration::from_millis(millis),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Forward path
// ---------------------------------------------------------------------------

#[test]
fn synchronous_source_reaches_available_in_one_pass() {
    let scope = scope();
    let source = Arc::new(ImmediateSource::new());
    let container = bind(&scope, source.clone(), ContainerConfig::default());
    let waiter = RecordingWaiter::new();
    let mut ctx = context(&waiter);

    assert_eq!(container.load(&mut ctx).unwrap(), Readiness::Ready);
    assert_eq!(container.state(), ContainerState::Loaded);
    assert_eq!(container.govern(&mut ctx).unwrap(), Readiness::Ready);
    assert_eq!(container.state(), ContainerState::Governed);
    assert_eq!(container.coordinate(&mut ctx).unwrap(), Readiness::Ready);
    assert_eq!(container.state(), ContainerState::ObjectAvailable);

    assert_eq!(container.object(), Some(0));
    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Ready);
    assert_eq!(source.sourced(), 1);
    assert_eq!(waiter.activations(), 0);
}

#[test]
fn is_ready_drives_a_fresh_container_to_available() {
    let scope = scope();
    let observed = Observations::new();
    let shared = observed.clone();
    let source = Arc::new(ImmediateSource::with_factory(move |id| {
        TestObject::new(id + 40).with_observations(shared.clone())
    }));
    let container = bind(&scope, source, ContainerConfig::default());
    let mut ctx = context(&RecordingWaiter::new());

    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Ready);
    assert_eq!(container.object(), Some(40));
    assert_eq!(observed.bound_name().as_deref(), Some("db"));
    // Only asynchronous managed objects get a listener.
    assert!(observed.listener().is_none());
}

#[test]
fn deferred_delivery_resumes_the_waiter() {
    let scope = scope();
    let source = Arc::new(DeferredSource::<TestObject>::new());
    let container = bind(&scope, source.clone(), ContainerConfig::default());
    let waiter = RecordingWaiter::new();
    let mut ctx = context(&waiter);

    assert_eq!(container.load(&mut ctx).unwrap(), Readiness::Waiting);
    assert_eq!(container.state(), ContainerState::Loading);
    assert_eq!(container.load(&mut ctx).unwrap(), Readiness::Waiting);
    assert_eq!(source.pending(), 1);
    assert_eq!(container.waiting(), 1);
    assert!(container.object().is_none());

    assert!(source.deliver(TestObject::new(7)));
    assert_eq!(waiter.activations(), 1);
    assert_eq!(container.state(), ContainerState::Loaded);

    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Ready);
    assert_eq!(container.object(), Some(7));
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[test]
fn sourcing_timeout_is_latched_and_fails_waiters() {
    let clock = Arc::new(ManualClock::new());
    let scope = scope_with_clock(&clock);
    let source = Arc::new(DeferredSource::<TestObject>::new());
    let container = bind(&scope, source.clone(), timeout(100));
    let waiter = RecordingWaiter::new();
    let mut ctx = context(&waiter);

    assert_eq!(container.load(&mut ctx).unwrap(), Readiness::Waiting);

    clock.advance(Duration::from_millis(100));
    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Waiting);

    clock.advance(Duration::from_millis(1));
    let failure = container.is_ready(&mut ctx).unwrap_err();
    assert!(matches!(
        *failure,
        Error::SourcingTimedOut {
            timeout_ms: 100,
            ..
        }
    ));

    let failures = waiter.failures();
    assert_eq!(failures.len(), 1);
    assert!(Arc::ptr_eq(&failures[0], &failure));

    let again = container.is_ready(&mut ctx).unwrap_err();
    assert!(Arc::ptr_eq(&again, &failure));

    // A late delivery is discarded and changes nothing.
    assert!(source.deliver(TestObject::new(1)));
    assert_eq!(container.state(), ContainerState::Loading);
    assert!(container.object().is_none());
    assert!(Arc::ptr_eq(&container.failure().unwrap(), &failure));
}

#[test]
fn asynchronous_operation_blocks_readiness_until_complete() {
    let clock = Arc::new(ManualClock::new());
    let scope = scope_with_clock(&clock);
    let observed = Observations::new();
    let shared = observed.clone();
    let source = Arc::new(ImmediateSource::with_factory(move |id| {
        TestObject::new(id).with_observations(shared.clone())
    }));
    let container = bind(
        &scope,
        source,
        ContainerConfig {
            asynchronous: true,
            ..timeout(50)
        },
    );
    let waiter = RecordingWaiter::new();
    let mut ctx = context(&waiter);

    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Ready);
    let listener = observed.listener().expect("asynchronous instance gets a listener");

    listener.started();
    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Waiting);
    assert_eq!(waiter.activations(), 0);

    listener.complete();
    assert_eq!(waiter.activations(), 1);
    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Ready);

    listener.started();
    clock.advance(Duration::from_millis(51));
    let failure = container.is_ready(&mut ctx).unwrap_err();
    assert!(matches!(*failure, Error::OperationTimedOut { .. }));
    assert!(failure.is_timeout());
    assert!(container.object().is_none());
}

#[test]
fn failure_during_asynchronous_operation_fails_parked_callers() {
    let scope = scope();
    let source = Arc::new(DeferredSource::<TestObject>::new());
    let container = bind(
        &scope,
        source.clone(),
        ContainerConfig {
            asynchronous: true,
            ..timeout(1_000)
        },
    );
    let mut ctx = context(&RecordingWaiter::new());
    assert_eq!(container.load(&mut ctx).unwrap(), Readiness::Waiting);

    let callback = source.peek().unwrap();
    let observed = Observations::new();
    assert!(source.deliver(TestObject::new(1).with_observations(observed.clone())));
    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Ready);

    let listener = observed.listener().unwrap();
    listener.started();
    let parked = RecordingWaiter::new();
    let mut parked_ctx = context(&parked);
    assert_eq!(container.is_ready(&mut parked_ctx).unwrap(), Readiness::Waiting);

    // The source reports a failure long after it delivered.
    callback.set_failure("connection lost");

    let failure = container.failure().unwrap();
    let failures = parked.failures();
    assert_eq!(failures.len(), 1);
    assert!(Arc::ptr_eq(&failures[0], &failure));
    assert_eq!(parked.activations(), 0);
    assert!(Arc::ptr_eq(&container.is_ready(&mut parked_ctx).unwrap_err(), &failure));
    assert!(container.object().is_none());

    // Completion after the failure changes nothing.
    listener.complete();
    assert_eq!(parked.activations(), 0);
    assert!(Arc::ptr_eq(&container.is_ready(&mut ctx).unwrap_err(), &failure));
}

// ---------------------------------------------------------------------------
// Failure latching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Operation {
    Load,
    Govern,
    Coordinate,
    IsReady,
}

fn run(container: &ManagedObjectContainer<TestObject>, op: Operation, ctx: &mut Context) -> tessera_managed::Outcome {
    match op {
        Operation::Load => container.load(ctx),
        Operation::Govern => container.govern(ctx),
        Operation::Coordinate => container.coordinate(ctx),
        Operation::IsReady => container.is_ready(ctx),
    }
}

#[rstest]
#[case::load(Operation::Load)]
#[case::govern(Operation::Govern)]
#[case::coordinate(Operation::Coordinate)]
#[case::is_ready(Operation::IsReady)]
fn latched_failure_dominates_every_operation(#[case] op: Operation) {
    let scope = scope();
    let container = bind(
        &scope,
        Arc::new(FailingSource::new("connection refused")),
        ContainerConfig::default(),
    );
    let mut ctx = context(&RecordingWaiter::new());

    let failure = container.load(&mut ctx).unwrap_err();
    assert!(matches!(*failure, Error::SourcingFailed { .. }));
    assert!(failure.to_string().contains("connection refused"));

    let again = run(&container, op, &mut ctx).unwrap_err();
    assert!(Arc::ptr_eq(&again, &failure));
    assert!(container.object().is_none());
}

#[test]
fn failure_reported_through_callback_is_latched() {
    let scope = scope();
    let container = bind(
        &scope,
        Arc::new(FailingSource::through_callback("disk full")),
        ContainerConfig::default(),
    );
    let mut ctx = context(&RecordingWaiter::new());

    let failure = container.is_ready(&mut ctx).unwrap_err();
    assert!(matches!(*failure, Error::SourcingFailed { .. }));
    assert!(!failure.is_fatal());
    assert!(Arc::ptr_eq(&container.failure().unwrap(), &failure));
}

#[test]
fn first_failure_wins() {
    let scope = scope();
    let source = Arc::new(DeferredSource::<TestObject>::new());
    let container = bind(&scope, source.clone(), ContainerConfig::default());
    let mut ctx = context(&RecordingWaiter::new());
    container.load(&mut ctx).unwrap();

    let callback = source.peek().unwrap();
    assert!(source.fail("first"));
    callback.set_failure("second");

    let failure = container.is_ready(&mut ctx).unwrap_err();
    assert!(failure.to_string().contains("first"));
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

#[test]
fn duplicate_delivery_is_released_without_exposure() {
    let scope = scope();
    let source = Arc::new(DeferredSource::<TestObject>::new());
    let cleanup = Arc::new(CountingRecycle::new(RecycleDecision::Reuse));
    let metadata = MetaData::<TestObject>::builder("db", source.clone())
        .recycle(cleanup.clone())
        .build()
        .unwrap();
    let container = scope.bind(metadata).unwrap();
    let mut ctx = context(&RecordingWaiter::new());
    container.load(&mut ctx).unwrap();

    let callback = source.peek().unwrap();
    assert!(source.deliver(TestObject::new(1)));
    callback.set_instance(TestObject::new(2));

    assert_eq!(cleanup.count(), 1);
    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Ready);
    assert_eq!(container.object(), Some(1));
}

#[test]
fn delivery_after_failure_goes_through_recycle_hook() {
    let scope = scope();
    let source = Arc::new(DeferredSource::<TestObject>::new());
    let cleanup = Arc::new(CountingRecycle::new(RecycleDecision::Reuse));
    let metadata = MetaData::<TestObject>::builder("db", source.clone())
        .recycle(cleanup.clone())
        .build()
        .unwrap();
    let container = scope.bind(metadata).unwrap();
    let mut ctx = context(&RecordingWaiter::new());
    container.load(&mut ctx).unwrap();

    let callback = source.peek().unwrap();
    callback.set_failure("refused");
    callback.set_instance(TestObject::new(1));

    assert_eq!(cleanup.count(), 1);
    assert!(!container.is_loaded());
    assert_eq!(container.state(), ContainerState::Loading);

    // Unloading has nothing left to release.
    container.unload();
    assert_eq!(cleanup.count(), 1);
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[rstest]
#[case::govern(Operation::Govern)]
#[case::coordinate(Operation::Coordinate)]
fn operations_before_load_violate_invariants(#[case] op: Operation) {
    let scope = scope();
    let container = bind(&scope, Arc::new(ImmediateSource::new()), ContainerConfig::default());
    let mut ctx = context(&RecordingWaiter::new());

    let failure = run(&container, op, &mut ctx).unwrap_err();
    assert!(failure.is_fatal());
    assert!(container.failure().is_none());
    assert_eq!(container.state(), ContainerState::NotLoaded);
}

// ---------------------------------------------------------------------------
// Unload
// ---------------------------------------------------------------------------

#[test]
fn unload_releases_once_and_refuses_later_operations() {
    let scope = scope();
    let cleanup = Arc::new(CountingRecycle::new(RecycleDecision::Reuse));
    let metadata = MetaData::<TestObject>::builder("db", Arc::new(ImmediateSource::new()))
        .recycle(cleanup.clone())
        .build()
        .unwrap();
    let container = scope.bind(metadata).unwrap();
    let mut ctx = context(&RecordingWaiter::new());
    assert_eq!(container.is_ready(&mut ctx).unwrap(), Readiness::Ready);

    container.unload();
    container.unload();

    assert_eq!(container.state(), ContainerState::Unloading);
    assert_eq!(cleanup.count(), 1);
    assert!(container.object().is_none());
    assert!(!container.is_loaded());

    let failure = container.is_ready(&mut ctx).unwrap_err();
    assert!(matches!(*failure, Error::Unloaded { .. }));
    assert!(container.failure().is_none());
}

#[test]
fn unload_while_loading_wakes_waiters_and_discards_late_delivery() {
    let scope = scope();
    let source = Arc::new(DeferredSource::<TestObject>::new());
    let cleanup = Arc::new(CountingRecycle::new(RecycleDecision::Reuse));
    let metadata = MetaData::<TestObject>::builder("db", source.clone())
        .recycle(cleanup.clone())
        .build()
        .unwrap();
    let container = scope.bind(metadata).unwrap();
    let waiter = RecordingWaiter::new();
    let mut ctx = context(&waiter);
    assert_eq!(container.load(&mut ctx).unwrap(), Readiness::Waiting);

    container.unload();
    assert_eq!(container.state(), ContainerState::Unloading);
    assert_eq!(waiter.activations(), 1);
    assert_eq!(cleanup.count(), 0);

    assert!(source.deliver(TestObject::new(3)));
    assert_eq!(cleanup.count(), 1);
    assert!(container.object().is_none());
}

#[test]
fn failed_container_still_releases_its_instance() {
    let scope = scope();
    let cleanup = Arc::new(CountingRecycle::new(RecycleDecision::Reuse));
    let source = Arc::new(ImmediateSource::with_factory(|id| {
        TestObject::new(id).failing_coordination()
    }));
    let metadata = MetaData::<TestObject>::builder("db", source)
        .config(ContainerConfig {
            coordinating: true,
            ..Default::default()
        })
        .recycle(cleanup.clone())
        .build()
        .unwrap();
    let container = scope.bind(metadata).unwrap();
    let mut ctx = context(&RecordingWaiter::new());

    let failure = container.is_ready(&mut ctx).unwrap_err();
    assert!(matches!(*failure, Error::CoordinationFailed { .. }));
    assert!(container.is_loaded());

    container.unload();
    assert_eq!(cleanup.count(), 1);
    assert_eq!(container.state(), ContainerState::Unloading);
}
