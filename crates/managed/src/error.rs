//! Error types for managed-object containers
use std::sync::Arc;

use thiserror::Error;

/// Boxed error reported by sources, pools and managed-object hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared form of [`BoxError`], kept inside the cloneable [`Error`].
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type for container configuration and wiring
pub type Result<T> = std::result::Result<T, Error>;

/// A failure surfaced by a container.
///
/// Once latched, the same `Arc` is handed back by every later operation,
/// so callers can compare failures with [`Arc::ptr_eq`].
pub type Failure = Arc<Error>;

/// Result of a lifecycle operation: ready, waiting, or failed.
pub type Outcome = std::result::Result<Readiness, Failure>;

/// Non-failed answer of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// The requested step is complete.
    Ready,
    /// The caller has been registered on a monitor and must suspend until
    /// it is activated.
    Waiting,
}

impl Readiness {
    /// Whether the requested step is complete.
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Error taxonomy for managed-object lifecycle operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The source or pool reported a failure, or failed while being asked
    /// for an instance.
    #[error("Sourcing failed for managed object '{managed_object}': {source}")]
    SourcingFailed {
        /// The managed object name
        managed_object: String,
        /// The underlying error
        #[source]
        source: SharedError,
    },

    /// No instance arrived within the configured timeout.
    #[error("Sourcing timed out after {timeout_ms}ms for managed object '{managed_object}'")]
    SourcingTimedOut {
        /// The managed object name
        managed_object: String,
        /// The configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// An asynchronous operation on a sourced instance exceeded the timeout.
    #[error(
        "Asynchronous operation timed out after {timeout_ms}ms for managed object '{managed_object}'"
    )]
    OperationTimedOut {
        /// The managed object name
        managed_object: String,
        /// The configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// The coordination hook of the managed object failed.
    #[error("Coordination failed for managed object '{managed_object}': {source}")]
    CoordinationFailed {
        /// The managed object name
        managed_object: String,
        /// The underlying error
        #[source]
        source: SharedError,
    },

    /// The governance surface could not be extracted from the instance.
    #[error(
        "Governance '{governance}' could not be applied to managed object '{managed_object}': {source}"
    )]
    GovernanceFailed {
        /// The managed object name
        managed_object: String,
        /// The governance name
        governance: String,
        /// The underlying error
        #[source]
        source: SharedError,
    },

    /// An internal precondition was broken. Never latched; the enclosing
    /// scope is expected to abort.
    #[error("Invariant violated for managed object '{managed_object}': {message}")]
    InvariantViolation {
        /// The managed object name
        managed_object: String,
        /// What went wrong
        message: String,
    },

    /// The container already released its instance.
    #[error("Managed object '{managed_object}' has been unloaded")]
    Unloaded {
        /// The managed object name
        managed_object: String,
    },

    /// Container or pool configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// Declared dependencies form a cycle.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency {
        /// The dependency cycle as a string
        cycle: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a sourcing failure from the cause reported by a source.
    pub fn sourcing_failed(managed_object: impl Into<String>, cause: BoxError) -> Self {
        Self::SourcingFailed {
            managed_object: managed_object.into(),
            source: Arc::from(cause),
        }
    }

    /// Create a coordination failure.
    pub fn coordination_failed(managed_object: impl Into<String>, cause: BoxError) -> Self {
        Self::CoordinationFailed {
            managed_object: managed_object.into(),
            source: Arc::from(cause),
        }
    }

    /// Create an invariant violation.
    pub fn invariant(managed_object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            managed_object: managed_object.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the enclosing scope instead of being
    /// handled as a failure of one managed object.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    /// Whether this error is one of the timeout failures.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::SourcingTimedOut { .. } | Self::OperationTimedOut { .. }
        )
    }

    /// Get the managed object name associated with this error (if any)
    #[must_use]
    pub fn managed_object(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } | Self::CircularDependency { .. } => None,
            Self::SourcingFailed { managed_object, .. }
            | Self::SourcingTimedOut { managed_object, .. }
            | Self::OperationTimedOut { managed_object, .. }
            | Self::CoordinationFailed { managed_object, .. }
            | Self::GovernanceFailed { managed_object, .. }
            | Self::InvariantViolation { managed_object, .. }
            | Self::Unloaded { managed_object } => Some(managed_object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sourcing_failure_keeps_cause() {
        let err = Error::sourcing_failed("db", "connection refused".into());
        assert_eq!(
            err.to_string(),
            "Sourcing failed for managed object 'db': connection refused"
        );
        let source = std::error::Error::source(&err).expect("cause");
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn only_invariant_violation_is_fatal() {
        assert!(Error::invariant("db", "unreachable checkpoint").is_fatal());
        assert!(!Error::configuration("bad").is_fatal());
        assert!(
            !Error::SourcingTimedOut {
                managed_object: "db".into(),
                timeout_ms: 10,
            }
            .is_fatal()
        );
    }

    #[test]
    fn timeout_classification() {
        let sourcing = Error::SourcingTimedOut {
            managed_object: "db".into(),
            timeout_ms: 10,
        };
        let operation = Error::OperationTimedOut {
            managed_object: "db".into(),
            timeout_ms: 10,
        };
        assert!(sourcing.is_timeout());
        assert!(operation.is_timeout());
        assert!(!Error::coordination_failed("db", "nope".into()).is_timeout());
    }

    #[test]
    fn managed_object_name() {
        assert_eq!(
            Error::Unloaded {
                managed_object: "cache".into()
            }
            .managed_object(),
            Some("cache")
        );
        assert_eq!(Error::configuration("bad").managed_object(), None);
    }

    #[test]
    fn readiness_is_ready() {
        assert!(Readiness::Ready.is_ready());
        assert!(!Readiness::Waiting.is_ready());
    }
}
