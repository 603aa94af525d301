//! Scopes own the containers of one lifetime (process, thread or function)
//! and the lock their lifecycle operations share.
//!
//! Every container bound through a [`Scope`] serializes its lifecycle
//! operations on the scope's reentrant lock, so a container may call into
//! the dependencies it coordinates with while holding it.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{ReentrantMutex, RwLock};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::container::{ManagedObjectContainer, ObjectContainer};
use crate::context::Context;
use crate::error::{Error, Outcome, Readiness, Result};
#[cfg(feature = "tokio")]
use crate::events::EventBus;
use crate::graph::DependencyGraph;
use crate::metadata::MetaData;
use crate::source::{ManagedObject, ObjectRegistry};
use crate::watchdog::{Asset, AssetManager};

/// Lock shared by every container of a scope.
pub type ScopeLock = ReentrantMutex<()>;

/// Lifetime of the containers bound in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScopeKind {
    /// Lives as long as the process.
    Process,
    /// One per thread of work.
    Thread,
    /// One per function invocation.
    Function,
}

/// Owner of the containers of one lifetime.
pub struct Scope {
    kind: ScopeKind,
    id: String,
    lock: Arc<ScopeLock>,
    clock: Arc<dyn Clock>,
    #[cfg(feature = "tokio")]
    events: Option<Arc<EventBus>>,
    assets: Option<Arc<AssetManager>>,
    containers: DashMap<String, Arc<dyn ObjectContainer>>,
    graph: RwLock<DependencyGraph>,
}

impl Scope {
    /// Create an empty scope on the system clock.
    pub fn new(kind: ScopeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            lock: Arc::new(ReentrantMutex::new(())),
            clock: Arc::new(SystemClock),
            #[cfg(feature = "tokio")]
            events: None,
            assets: None,
            containers: DashMap::new(),
            graph: RwLock::new(DependencyGraph::new()),
        }
    }

    /// Use `clock` for every timeout comparison in the scope.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Emit lifecycle events of bound containers to `events`.
    #[cfg(feature = "tokio")]
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Register every bound container with `assets` for watchdog checks.
    #[must_use]
    pub fn with_asset_manager(mut self, assets: Arc<AssetManager>) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Lifetime of the scope.
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Identifier of the scope, used in logs.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The lock shared by the scope's containers.
    #[must_use]
    pub fn lock(&self) -> &Arc<ScopeLock> {
        &self.lock
    }

    /// The clock shared by the scope's containers.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[cfg(feature = "tokio")]
    pub(crate) fn events(&self) -> Option<&Arc<EventBus>> {
        self.events.as_ref()
    }

    /// Bind a container for `metadata` in this scope.
    ///
    /// # Errors
    /// Returns error if the name is already bound or the declared
    /// dependencies would close a cycle.
    pub fn bind<M: ManagedObject>(
        self: &Arc<Self>,
        metadata: Arc<MetaData<M>>,
    ) -> Result<Arc<ManagedObjectContainer<M>>> {
        let name = metadata.name().to_string();
        let container = match self.containers.entry(name.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::configuration(format!(
                    "managed object '{name}' is already bound in scope '{}'",
                    self.id
                )));
            }
            Entry::Vacant(slot) => {
                self.graph.write().bind(&name, metadata.dependencies())?;
                let container = ManagedObjectContainer::new(metadata, self);
                slot.insert(Arc::clone(&container) as Arc<dyn ObjectContainer>);
                container
            }
        };
        if let Some(assets) = &self.assets {
            let asset = Arc::downgrade(&container);
            assets.register(asset as std::sync::Weak<dyn Asset>);
        }

        tracing::debug!(
            scope = %self.id,
            kind = ?self.kind,
            managed_object = %name,
            "Managed object bound"
        );
        Ok(container)
    }

    /// Container bound under `name`.
    #[must_use]
    pub fn container(&self, name: &str) -> Option<Arc<dyn ObjectContainer>> {
        // Clone out of the map so the shard lock is not held by callers.
        self.containers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of bound containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Whether nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Drive every dependency of `owner` towards availability.
    ///
    /// Stops at the first dependency that is not ready, leaving the caller
    /// registered on it.
    pub(crate) fn dependencies_ready(
        &self,
        owner: &str,
        dependencies: &[String],
        ctx: &mut Context,
    ) -> Outcome {
        for name in dependencies {
            let Some(dependency) = self.container(name) else {
                return Err(Arc::new(Error::invariant(
                    owner,
                    format!("dependency '{name}' is not bound in scope '{}'", self.id),
                )));
            };
            if dependency.is_ready(ctx)? == Readiness::Waiting {
                tracing::trace!(managed_object = %owner, dependency = %name, "Waiting on dependency");
                return Ok(Readiness::Waiting);
            }
        }
        Ok(Readiness::Ready)
    }

    /// Unload every container, dependents before their dependencies.
    /// Returns how many containers were asked to unload.
    pub fn unload_all(&self) -> usize {
        let order = self.graph.read().teardown_order();
        let _scope = self.lock.lock();

        let mut unloaded = 0;
        for name in &order {
            if let Some(container) = self.container(name) {
                container.unload();
                unloaded += 1;
            }
        }
        tracing::debug!(scope = %self.id, unloaded, "Scope unloaded");
        unloaded
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("containers", &self.containers.len())
            .finish_non_exhaustive()
    }
}

/// Registry view limited to the declared dependencies of one managed object.
pub(crate) struct ScopedRegistry<'a> {
    scope: &'a Scope,
    visible: &'a [String],
}

impl<'a> ScopedRegistry<'a> {
    pub(crate) fn new(scope: &'a Scope, visible: &'a [String]) -> Self {
        Self { scope, visible }
    }
}

impl ObjectRegistry for ScopedRegistry<'_> {
    fn object(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        if !self.visible.iter().any(|dependency| dependency == name) {
            return None;
        }
        self.scope.container(name)?.any_object()
    }
}
