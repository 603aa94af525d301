//! Immutable descriptor of a bound managed object.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pool::ManagedObjectPool;
use crate::recycle::Recycle;
use crate::source::{ManagedObject, ManagedObjectSource};

/// A governance that may cover the managed object.
///
/// The position in [`ContainerConfig::governance`] is the index asked of
/// [`GovernanceContainer::is_governance_active`](crate::GovernanceContainer::is_governance_active)
/// and the slot of the resulting registration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GovernanceConfig {
    /// Governance name, passed to [`ManagedObject::governance_surface`].
    pub name: String,
}

impl GovernanceConfig {
    /// Create a governance descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Configuration of a managed-object container
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ContainerConfig {
    /// How long sourcing, or an asynchronous operation, may stay in flight
    pub timeout: Duration,
    /// The instance runs asynchronous operations and reports them through
    /// an [`AsyncListener`](crate::AsyncListener)
    pub asynchronous: bool,
    /// The instance needs its dependencies injected before use
    pub coordinating: bool,
    /// Governances that may cover the instance, one slot each
    pub governance: Vec<GovernanceConfig>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            asynchronous: false,
            coordinating: false,
            governance: Vec::new(),
        }
    }
}

impl ContainerConfig {
    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::configuration("timeout must be greater than zero"));
        }
        let mut seen = HashSet::new();
        for governance in &self.governance {
            if governance.name.is_empty() {
                return Err(Error::configuration("governance name must not be empty"));
            }
            if !seen.insert(governance.name.as_str()) {
                return Err(Error::configuration(format!(
                    "governance '{}' is listed more than once",
                    governance.name
                )));
            }
        }
        Ok(())
    }
}

/// Everything a container needs to know about its managed object.
///
/// Shared by every container bound to the same managed object.
pub struct MetaData<M: ManagedObject> {
    name: Arc<str>,
    config: ContainerConfig,
    source: Arc<dyn ManagedObjectSource<M>>,
    pool: Option<Arc<dyn ManagedObjectPool<M>>>,
    recycle: Option<Arc<dyn Recycle<M>>>,
    dependencies: Vec<String>,
}

impl<M: ManagedObject> MetaData<M> {
    /// Start building metadata for `name`, sourced from `source`.
    pub fn builder(
        name: impl Into<String>,
        source: Arc<dyn ManagedObjectSource<M>>,
    ) -> MetaDataBuilder<M> {
        MetaDataBuilder {
            name: name.into(),
            config: ContainerConfig::default(),
            source,
            pool: None,
            recycle: None,
            dependencies: Vec::new(),
        }
    }

    /// Bound name of the managed object.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Container configuration.
    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// The raw source.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn ManagedObjectSource<M>> {
        &self.source
    }

    /// The pool, if instances are pooled.
    #[must_use]
    pub fn pool(&self) -> Option<&Arc<dyn ManagedObjectPool<M>>> {
        self.pool.as_ref()
    }

    /// The cleanup run when an instance is released.
    #[must_use]
    pub fn recycle(&self) -> Option<&Arc<dyn Recycle<M>>> {
        self.recycle.as_ref()
    }

    /// Names of the managed objects this one depends on.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

impl<M: ManagedObject> std::fmt::Debug for MetaData<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaData")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("pooled", &self.pool.is_some())
            .field("recycle", &self.recycle.is_some())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Builder for [`MetaData`].
pub struct MetaDataBuilder<M: ManagedObject> {
    name: String,
    config: ContainerConfig,
    source: Arc<dyn ManagedObjectSource<M>>,
    pool: Option<Arc<dyn ManagedObjectPool<M>>>,
    recycle: Option<Arc<dyn Recycle<M>>>,
    dependencies: Vec<String>,
}

impl<M: ManagedObject> MetaDataBuilder<M> {
    /// Use `config` instead of the default configuration.
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Source instances through `pool` and return them to it on release.
    pub fn pool(mut self, pool: Arc<dyn ManagedObjectPool<M>>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Run `recycle` on every released instance.
    pub fn recycle(mut self, recycle: Arc<dyn Recycle<M>>) -> Self {
        self.recycle = Some(recycle);
        self
    }

    /// Declare a dependency on another managed object of the same scope.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    /// Validate and build the metadata.
    ///
    /// # Errors
    /// Returns error if the name is empty, the configuration is invalid, or
    /// the managed object depends on itself.
    pub fn build(self) -> Result<Arc<MetaData<M>>> {
        if self.name.is_empty() {
            return Err(Error::configuration("managed object name must not be empty"));
        }
        self.config.validate()?;
        if self.dependencies.contains(&self.name) {
            return Err(Error::CircularDependency {
                cycle: format!("{0} -> {0}", self.name),
            });
        }
        Ok(Arc::new(MetaData {
            name: Arc::from(self.name),
            config: self.config,
            source: self.source,
            pool: self.pool,
            recycle: self.recycle,
            dependencies: self.dependencies,
        }))
    }
}
