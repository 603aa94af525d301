//! Managed objects and the sources that produce them.
//!
//! A [`ManagedObjectSource`] is an asynchronous factory: it receives a
//! [`SourceCallback`] and, on its own schedule and thread, reports exactly
//! one instance or one failure through it.

use std::any::Any;
use std::sync::{Arc, Weak};

use crate::error::BoxError;
use crate::governance::GovernanceSurface;

/// An externally-sourced instance whose lifecycle a container manages.
///
/// Hooks take `&self`: the instance is shared between the container and
/// the hooks it invokes, and its internals are its own concern.
pub trait ManagedObject: Send + Sync + 'static {
    /// The object handed to the unit of work once the instance is available.
    type Object: Clone + Send + Sync + 'static;

    /// Extract the payload object.
    fn object(&self) -> Result<Self::Object, BoxError>;

    /// Receive the bound name of the managed object. Called once when the
    /// instance arrives.
    fn bind_name(&self, _name: &str) {}

    /// Receive the listener through which an asynchronous instance reports
    /// its operations. Called once when the instance arrives, and only for
    /// managed objects configured as asynchronous.
    fn register_async_listener(&self, _listener: AsyncListener) {}

    /// Inject dependencies. Called once, for managed objects configured as
    /// coordinating, after every declared dependency is ready.
    fn coordinate(&self, _registry: &dyn ObjectRegistry) -> Result<(), BoxError> {
        Ok(())
    }

    /// Extract the interception surface for the named governance.
    fn governance_surface(&self, governance: &str) -> Result<GovernanceSurface, BoxError> {
        Err(format!("no surface for governance '{governance}'").into())
    }

    /// Whether the instance can go back to a pool after use.
    fn is_reusable(&self) -> bool {
        true
    }
}

/// Dependency lookup handed to [`ManagedObject::coordinate`].
///
/// Only the dependencies declared by the coordinating managed object are
/// visible.
pub trait ObjectRegistry {
    /// The payload object of the named dependency, if it is available.
    fn object(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

impl dyn ObjectRegistry + '_ {
    /// Typed lookup of a dependency's payload object.
    pub fn get<T: Clone + 'static>(&self, name: &str) -> Option<T> {
        self.object(name)
            .and_then(|object| object.downcast_ref::<T>().cloned())
    }
}

/// Produces managed-object instances.
pub trait ManagedObjectSource<M: ManagedObject>: Send + Sync {
    /// Start sourcing an instance.
    ///
    /// The source must eventually call exactly one of
    /// [`SourceCallback::set_instance`] or [`SourceCallback::set_failure`],
    /// either before returning or later from any thread. Returning `Err`
    /// reports a failure synchronously.
    fn source(&self, callback: SourceCallback<M>) -> Result<(), BoxError>;
}

/// Receiving end of a sourcing request.
pub trait ObjectUser<M>: Send + Sync {
    /// An instance was produced.
    fn set_instance(&self, instance: M);

    /// Sourcing failed.
    fn set_failure(&self, cause: BoxError);
}

/// Callback handed to a source for one sourcing request.
pub struct SourceCallback<M> {
    user: Arc<dyn ObjectUser<M>>,
}

impl<M> Clone for SourceCallback<M> {
    fn clone(&self) -> Self {
        Self {
            user: Arc::clone(&self.user),
        }
    }
}

impl<M> SourceCallback<M> {
    /// Wrap the receiver of a sourcing request.
    pub fn new(user: Arc<dyn ObjectUser<M>>) -> Self {
        Self { user }
    }

    /// Deliver the sourced instance.
    pub fn set_instance(&self, instance: M) {
        self.user.set_instance(instance);
    }

    /// Report that sourcing failed.
    pub fn set_failure(&self, cause: impl Into<BoxError>) {
        self.user.set_failure(cause.into());
    }
}

impl<M> std::fmt::Debug for SourceCallback<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCallback").finish_non_exhaustive()
    }
}

/// Receiver of asynchronous-operation notifications.
pub trait AsyncOperationListener: Send + Sync {
    /// An asynchronous operation started on the instance.
    fn notify_async_operation_started(&self);

    /// The asynchronous operation completed.
    fn notify_async_operation_complete(&self);
}

/// Handle an asynchronous instance uses to report its operations.
///
/// Safe to call from any thread. Calls after the container is gone are
/// ignored.
#[derive(Clone)]
pub struct AsyncListener {
    target: Weak<dyn AsyncOperationListener>,
}

impl AsyncListener {
    /// Create a listener forwarding to `target`.
    pub fn new(target: Weak<dyn AsyncOperationListener>) -> Self {
        Self { target }
    }

    /// Report that an asynchronous operation started.
    pub fn started(&self) {
        if let Some(target) = self.target.upgrade() {
            target.notify_async_operation_started();
        }
    }

    /// Report that the asynchronous operation completed.
    pub fn complete(&self) {
        if let Some(target) = self.target.upgrade() {
            target.notify_async_operation_complete();
        }
    }
}

impl std::fmt::Debug for AsyncListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncListener")
            .field("alive", &(self.target.strong_count() > 0))
            .finish()
    }
}
