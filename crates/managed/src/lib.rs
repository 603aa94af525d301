//! # Tessera Managed Objects
//!
//! Lifecycle containers for externally-sourced managed objects in a
//! cooperative execution engine. A [`ManagedObjectContainer`] sources an
//! instance, applies governance, coordinates it with its dependencies and
//! exposes its payload object, without ever blocking the caller: a step that
//! cannot complete parks the caller's [`Waiter`] on a monitor and reports
//! [`Readiness::Waiting`].
//!
//! Containers are bound in a [`Scope`], which shares one reentrant lock and
//! one clock between them and unloads them in reverse dependency order.

pub mod clock;
pub mod container;
pub mod context;
pub mod error;
pub mod events;
pub mod governance;
pub mod graph;
pub mod metadata;
pub mod monitor;
pub mod pool;
pub mod recycle;
pub mod scope;
pub mod source;
pub mod state;
pub mod testing;
pub mod watchdog;

pub use clock::{Clock, SystemClock};
pub use container::{ManagedObjectContainer, ObjectContainer};
pub use context::Context;
pub use error::{BoxError, Error, Failure, Outcome, Readiness, Result};
pub use events::ContainerEvent;
pub use governance::{
    ActiveGovernance, GovernanceActivity, GovernanceContainer, GovernanceOwner,
    GovernanceRegistrar, GovernanceSurface,
};
pub use graph::DependencyGraph;
pub use metadata::{ContainerConfig, GovernanceConfig, MetaData, MetaDataBuilder};
pub use monitor::{AssetMonitor, Waiter};
pub use pool::{BoundedPool, ManagedObjectPool, PoolConfig, PoolStats};
pub use recycle::{Recycle, RecycleDecision, RecycleHook, ReleaseOutcome};
pub use scope::{Scope, ScopeKind, ScopeLock};
pub use source::{
    AsyncListener, AsyncOperationListener, ManagedObject, ManagedObjectSource, ObjectRegistry,
    ObjectUser, SourceCallback,
};
pub use state::{Checkpoint, ContainerState, Transition};
pub use watchdog::{Asset, AssetManager};

#[cfg(feature = "tokio")]
pub use events::{EventBus, EventReceiver};
