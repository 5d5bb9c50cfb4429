//! Sync operation lifecycle states
//!
//! Every sync operation moves through a small state machine:
//!
//! ```text
//!               ┌───────────┐
//!      ┌──────► │ Completed │
//!      │        └───────────┘
//! ┌─────────┐   ┌───────────┐
//! │Executing│──►│  Failed   │
//! └─────────┘   └───────────┘
//!      ▲        ┌───────────┐
//! ┌─────────┐ ┌►│ Cancelled │
//! │ Pending │─┘ └───────────┘
//! └─────────┘
//! ```
//!
//! Terminal states are final; no state re-enters `Executing`. A `Pending`
//! operation may be cancelled without ever executing (cycle cancellation or
//! an unsatisfiable dependency detected before submission).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Lifecycle state of a sync operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Built but not yet submitted
    #[default]
    Pending,
    /// Round trip in flight
    Executing,
    /// Round trip succeeded and the result was applied locally
    Completed,
    /// Round trip or merge failed; the record stays dirty
    Failed,
    /// Abandoned before or during execution; nothing was merged
    Cancelled,
}

impl OperationState {
    /// Returns the state name as a string
    pub fn name(&self) -> &'static str {
        match self {
            OperationState::Pending => "Pending",
            OperationState::Executing => "Executing",
            OperationState::Completed => "Completed",
            OperationState::Failed => "Failed",
            OperationState::Cancelled => "Cancelled",
        }
    }

    /// Returns true for Completed, Failed, and Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Cancelled
        )
    }

    /// Checks whether a transition to `target` is valid
    ///
    /// Valid transitions:
    /// - Pending -> Executing, Failed, Cancelled
    /// - Executing -> Completed, Failed, Cancelled
    /// - terminal states -> (none)
    pub fn can_transition_to(&self, target: &OperationState) -> bool {
        match (self, target) {
            (OperationState::Pending, OperationState::Executing) => true,
            (OperationState::Pending, OperationState::Failed) => true,
            (OperationState::Pending, OperationState::Cancelled) => true,
            (OperationState::Executing, OperationState::Completed) => true,
            (OperationState::Executing, OperationState::Failed) => true,
            (OperationState::Executing, OperationState::Cancelled) => true,
            _ => false,
        }
    }

    /// Attempts to transition to a new state, returning the new state
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: OperationState) -> Result<(), DomainError> {
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: target.name().to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::Pending => write!(f, "pending"),
            OperationState::Executing => write!(f, "executing"),
            OperationState::Completed => write!(f, "completed"),
            OperationState::Failed => write!(f, "failed"),
            OperationState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_transitions() {
        let s = OperationState::Pending;
        assert!(s.can_transition_to(&OperationState::Executing));
        assert!(s.can_transition_to(&OperationState::Failed));
        assert!(s.can_transition_to(&OperationState::Cancelled));
        assert!(!s.can_transition_to(&OperationState::Completed));
        assert!(!s.can_transition_to(&OperationState::Pending));
    }

    #[test]
    fn test_executing_transitions() {
        let s = OperationState::Executing;
        assert!(s.can_transition_to(&OperationState::Completed));
        assert!(s.can_transition_to(&OperationState::Failed));
        assert!(s.can_transition_to(&OperationState::Cancelled));
        assert!(!s.can_transition_to(&OperationState::Pending));
        assert!(!s.can_transition_to(&OperationState::Executing));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            OperationState::Completed,
            OperationState::Failed,
            OperationState::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for target in [
                OperationState::Pending,
                OperationState::Executing,
                OperationState::Completed,
                OperationState::Failed,
                OperationState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(&target));
            }
        }
    }

    #[test]
    fn test_transition_to_success() {
        let mut s = OperationState::Pending;
        s.transition_to(OperationState::Executing).unwrap();
        assert_eq!(s, OperationState::Executing);
        s.transition_to(OperationState::Completed).unwrap();
        assert_eq!(s, OperationState::Completed);
    }

    #[test]
    fn test_transition_to_failure() {
        let mut s = OperationState::Completed;
        let result = s.transition_to(OperationState::Executing);
        assert!(matches!(result, Err(DomainError::InvalidState { .. })));
        // State is unchanged after a rejected transition
        assert_eq!(s, OperationState::Completed);
    }

    #[test]
    fn test_default_is_pending() {
        assert_eq!(OperationState::default(), OperationState::Pending);
    }
}
