//! Callback context handed to every lifecycle operation

use std::sync::Arc;

use crate::governance::{GovernanceActivity, GovernanceContainer};
use crate::monitor::Waiter;

/// Context for lifecycle operations.
///
/// Identifies the calling unit of work: the [`Waiter`] registered on a
/// monitor when the container is not ready, the governance state of the
/// unit of work, and the activities queued for it to run.
pub struct Context {
    /// Label of the calling unit of work, used in logs.
    job: String,
    waiter: Arc<dyn Waiter>,
    governance: Option<Arc<dyn GovernanceContainer>>,
    activities: Vec<GovernanceActivity>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("job", &self.job)
            .field("governance", &self.governance.is_some())
            .field("activities", &self.activities)
            .finish()
    }
}

impl Context {
    /// Create a context for the unit of work `job`, resumed through `waiter`.
    pub fn new(job: impl Into<String>, waiter: Arc<dyn Waiter>) -> Self {
        Self {
            job: job.into(),
            waiter,
            governance: None,
            activities: Vec::new(),
        }
    }

    /// Attach the governance state of the unit of work.
    pub fn with_governance(mut self, governance: Arc<dyn GovernanceContainer>) -> Self {
        self.governance = Some(governance);
        self
    }

    /// Label of the calling unit of work.
    #[must_use]
    pub fn job(&self) -> &str {
        &self.job
    }

    /// The waiter registered when a container is not ready.
    #[must_use]
    pub fn waiter(&self) -> &Arc<dyn Waiter> {
        &self.waiter
    }

    /// Governance state of the unit of work.
    #[must_use]
    pub fn governance(&self) -> Option<&Arc<dyn GovernanceContainer>> {
        self.governance.as_ref()
    }

    /// Queue an activity for the unit of work.
    pub fn queue_activity(&mut self, activity: GovernanceActivity) {
        self.activities.push(activity);
    }

    /// Activities queued so far.
    #[must_use]
    pub fn activities(&self) -> &[GovernanceActivity] {
        &self.activities
    }

    /// Take the queued activities, leaving none behind.
    pub fn take_activities(&mut self) -> Vec<GovernanceActivity> {
        std::mem::take(&mut self.activities)
    }
}
