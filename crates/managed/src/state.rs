//! Lifecycle states of a managed-object container and the transition table
//! that drives them.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`ManagedObjectContainer`](crate::ManagedObjectContainer).
///
/// The forward path is `NotLoaded → Loading → Loaded → Governing → Governed
/// → Coordinating → ObjectAvailable`. Unloading branches off any forward
/// state through `UnloadWaitingGovernance → Unloading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContainerState {
    /// Nothing has been requested yet.
    #[default]
    NotLoaded,
    /// The source or pool has been asked for an instance.
    Loading,
    /// An instance has been delivered.
    Loaded,
    /// Waiting for the instance to settle before governance is evaluated.
    Governing,
    /// Governance has been evaluated at least once.
    Governed,
    /// Coordination is done; the payload object is being extracted.
    Coordinating,
    /// The payload object is available to the unit of work.
    ObjectAvailable,
    /// Unload requested; waiting for active governance to be released.
    UnloadWaitingGovernance,
    /// The instance has been released.
    Unloading,
}

/// Events that move a container from one state to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The source or pool is asked for an instance.
    BeginLoad,
    /// The instance arrived.
    Deliver,
    /// Governance evaluation starts.
    BeginGovern,
    /// The instance settled and governance has been evaluated.
    Govern,
    /// Coordination completed.
    Coordinate,
    /// The payload object was extracted.
    ExposeObject,
    /// Unload was requested.
    BeginUnload,
    /// Every governance slot is empty; release the instance.
    Release,
}

/// Readiness checkpoint a caller can require from a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    /// An instance is present.
    Loaded,
    /// Governance has been evaluated.
    Governed,
    /// The payload object is available.
    ObjectAvailable,
}

impl ContainerState {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 9] = [
        Self::NotLoaded,
        Self::Loading,
        Self::Loaded,
        Self::Governing,
        Self::Governed,
        Self::Coordinating,
        Self::ObjectAvailable,
        Self::UnloadWaitingGovernance,
        Self::Unloading,
    ];

    /// The transition table.
    ///
    /// Returns `None` when `transition` is not valid from this state.
    #[must_use]
    pub fn next(self, transition: Transition) -> Option<Self> {
        use ContainerState as S;
        use Transition as T;

        match (self, transition) {
            (S::NotLoaded, T::BeginLoad) => Some(S::Loading),
            (S::Loading, T::Deliver) => Some(S::Loaded),
            (S::Loaded, T::BeginGovern) => Some(S::Governing),
            (S::Governing, T::Govern) => Some(S::Governed),
            (S::Governed, T::Coordinate) => Some(S::Coordinating),
            (S::Coordinating, T::ExposeObject) => Some(S::ObjectAvailable),
            (S::UnloadWaitingGovernance, T::Release) => Some(S::Unloading),
            (S::Unloading, _) => None,
            (_, T::BeginUnload) => Some(S::UnloadWaitingGovernance),
            _ => None,
        }
    }

    /// States directly reachable from this one.
    #[must_use]
    pub fn next_states(self) -> Vec<Self> {
        let transitions = [
            Transition::BeginLoad,
            Transition::Deliver,
            Transition::BeginGovern,
            Transition::Govern,
            Transition::Coordinate,
            Transition::ExposeObject,
            Transition::BeginUnload,
            Transition::Release,
        ];
        let mut states: Vec<Self> = transitions
            .iter()
            .filter_map(|t| self.next(*t))
            .filter(|s| *s != self)
            .collect();
        states.dedup();
        states
    }

    /// Whether some transition leads from this state to `target`.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next_states().contains(&target)
    }

    /// Position on the forward path, `None` once unloading started.
    #[must_use]
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::NotLoaded => Some(0),
            Self::Loading => Some(1),
            Self::Loaded => Some(2),
            Self::Governing => Some(3),
            Self::Governed => Some(4),
            Self::Coordinating => Some(5),
            Self::ObjectAvailable => Some(6),
            Self::UnloadWaitingGovernance | Self::Unloading => None,
        }
    }

    /// Whether unload has been requested.
    #[must_use]
    pub fn is_unloading(self) -> bool {
        self.rank().is_none()
    }
}

impl Checkpoint {
    /// Whether `state` has reached this checkpoint.
    #[must_use]
    pub fn reached_by(self, state: ContainerState) -> bool {
        let required = match self {
            Self::Loaded => 2,
            Self::Governed => 4,
            Self::ObjectAvailable => 6,
        };
        state.rank().is_some_and(|rank| rank >= required)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotLoaded => "not-loaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Governing => "governing",
            Self::Governed => "governed",
            Self::Coordinating => "coordinating",
            Self::ObjectAvailable => "object-available",
            Self::UnloadWaitingGovernance => "unload-waiting-governance",
            Self::Unloading => "unloading",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Governed => write!(f, "governed"),
            Self::ObjectAvailable => write!(f, "object-available"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_linear() {
        let mut state = ContainerState::NotLoaded;
        for transition in [
            Transition::BeginLoad,
            Transition::Deliver,
            Transition::BeginGovern,
            Transition::Govern,
            Transition::Coordinate,
            Transition::ExposeObject,
        ] {
            state = state.next(transition).expect("valid forward transition");
        }
        assert_eq!(state, ContainerState::ObjectAvailable);
    }

    #[test]
    fn unload_reachable_from_every_forward_state() {
        for state in ContainerState::ALL {
            if state == ContainerState::Unloading {
                continue;
            }
            assert_eq!(
                state.next(Transition::BeginUnload),
                Some(ContainerState::UnloadWaitingGovernance),
                "{state} should accept unload"
            );
        }
    }

    #[test]
    fn unloading_is_terminal() {
        assert!(ContainerState::Unloading.next_states().is_empty());
    }

    #[test]
    fn release_only_after_waiting_for_governance() {
        for state in ContainerState::ALL {
            let expected = (state == ContainerState::UnloadWaitingGovernance)
                .then_some(ContainerState::Unloading);
            assert_eq!(state.next(Transition::Release), expected);
        }
    }

    #[test]
    fn checkpoints() {
        assert!(!Checkpoint::Loaded.reached_by(ContainerState::Loading));
        assert!(Checkpoint::Loaded.reached_by(ContainerState::Governing));
        assert!(!Checkpoint::Governed.reached_by(ContainerState::Governing));
        assert!(Checkpoint::Governed.reached_by(ContainerState::Coordinating));
        assert!(Checkpoint::ObjectAvailable.reached_by(ContainerState::ObjectAvailable));
        assert!(!Checkpoint::Loaded.reached_by(ContainerState::Unloading));
    }

    #[test]
    fn display() {
        assert_eq!(
            ContainerState::UnloadWaitingGovernance.to_string(),
            "unload-waiting-governance"
        );
        assert_eq!(Checkpoint::ObjectAvailable.to_string(), "object-available");
    }
}
