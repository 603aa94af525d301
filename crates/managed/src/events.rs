//! Lifecycle events of containers.
//!
//! With the `tokio` feature a scope can hand its containers an `EventBus`;
//! each subscriber gets an `EventReceiver` that counts what it missed.

#[cfg(feature = "tokio")]
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::recycle::ReleaseOutcome;

// ---------------------------------------------------------------------------
// ContainerEvent
// ---------------------------------------------------------------------------

/// Events emitted during the lifecycle of a managed-object container.
///
/// Every variant carries the bound name of the managed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    /// The source or pool was asked for an instance.
    Sourcing {
        /// The managed object name.
        managed_object: String,
    },
    /// An instance was delivered and accepted.
    Loaded {
        /// The managed object name.
        managed_object: String,
    },
    /// A late or duplicate instance was released without being used.
    DeliveryDiscarded {
        /// The managed object name.
        managed_object: String,
    },
    /// A failure was latched.
    Failed {
        /// The managed object name.
        managed_object: String,
        /// Human-readable error description.
        error: String,
    },
    /// A governance started covering the instance.
    Governed {
        /// The managed object name.
        managed_object: String,
        /// The governance name.
        governance: String,
    },
    /// The payload object became available.
    Available {
        /// The managed object name.
        managed_object: String,
    },
    /// The instance was released.
    Unloaded {
        /// The managed object name.
        managed_object: String,
        /// Whether the instance went back to a pool.
        outcome: ReleaseOutcome,
    },
}

impl ContainerEvent {
    /// Name of the managed object that triggered the event.
    #[must_use]
    pub fn managed_object(&self) -> &str {
        match self {
            Self::Sourcing { managed_object }
            | Self::Loaded { managed_object }
            | Self::DeliveryDiscarded { managed_object }
            | Self::Failed { managed_object, .. }
            | Self::Governed { managed_object, .. }
            | Self::Available { managed_object }
            | Self::Unloaded { managed_object, .. } => managed_object,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fan-out of container events to any number of subscribers.
///
/// Containers never wait on the bus. A subscriber that falls more than
/// `capacity` events behind loses the oldest ones.
#[cfg(feature = "tokio")]
pub struct EventBus {
    sender: broadcast::Sender<ContainerEvent>,
}

#[cfg(feature = "tokio")]
impl EventBus {
    /// Bus buffering up to `capacity` events per subscriber (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish `event`. Returns how many subscribers will see it.
    pub fn emit(&self, event: ContainerEvent) -> usize {
        tracing::trace!(managed_object = %event.managed_object(), ?event, "Container event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            missed: 0,
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(feature = "tokio")]
impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(feature = "tokio")]
impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// One subscription to an [`EventBus`].
#[cfg(feature = "tokio")]
#[derive(Debug)]
pub struct EventReceiver {
    receiver: broadcast::Receiver<ContainerEvent>,
    missed: u64,
}

#[cfg(feature = "tokio")]
impl EventReceiver {
    /// Wait for the next event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ContainerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Every event already queued, oldest first, without waiting.
    pub fn drain(&mut self) -> Vec<ContainerEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
            }
        }
    }

    /// Queued events of `managed_object` only, without waiting.
    pub fn drain_for(&mut self, managed_object: &str) -> Vec<ContainerEvent> {
        self.drain()
            .into_iter()
            .filter(|event| event.managed_object() == managed_object)
            .collect()
    }

    /// Events lost because this subscriber fell behind.
    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn lagged(&mut self, skipped: u64) {
        tracing::warn!(skipped, "Event subscriber fell behind");
        self.missed += skipped;
    }
}
