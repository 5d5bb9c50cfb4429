//! Engine-visible error taxonomy
//!
//! [`SyncError`] is the error type every operation outcome, cycle failure
//! entry, and observer hook carries. Port-level errors (`StoreError`,
//! `TransportError`, `MappingError`) convert into it; the conversions route
//! store identity-assignment and unavailability failures to their dedicated
//! variants so callers can report them precisely.

use thiserror::Error;

use crate::domain::newtypes::LocalId;
use crate::ports::local_store::StoreError;
use crate::ports::mapping::MappingError;
use crate::ports::transport::TransportError;

/// Errors produced by the synchronization engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A descriptor registration was malformed; rejected atomically
    #[error("Invalid sync descriptor: {0}")]
    InvalidDescriptor(String),

    /// The local store could not allocate a durable identity for a record
    #[error("Identity assignment failed: {0}")]
    IdentityAssignment(String),

    /// The transport reported a failure; the record stays dirty
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A prerequisite operation failed or was cancelled, so this one could
    /// not be attempted
    #[error("Dependency {dependency} unsatisfiable for {dependent}")]
    DependencyUnsatisfiable {
        /// The record whose operation was abandoned
        dependent: LocalId,
        /// The prerequisite record that never acquired a remote identity
        dependency: LocalId,
    },

    /// The record was concurrently deleted or incompatibly altered between
    /// request build and response merge; no partial merge was applied
    #[error("Merge conflict: {0}")]
    MergeConflict(String),

    /// The mapping rejected the record payload or the response body
    #[error("Mapping failure: {0}")]
    Mapping(#[from] MappingError),

    /// The operation was cancelled; nothing was merged
    #[error("Operation cancelled")]
    Cancelled,

    /// The local store is unavailable; the cycle could not start
    #[error("Local store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other local store failure
    #[error("Local store failure: {0}")]
    Store(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::IdentityAssignment(msg) => SyncError::IdentityAssignment(msg),
            StoreError::Unavailable(msg) => SyncError::StoreUnavailable(msg),
            StoreError::Storage(msg) => SyncError::Store(msg),
        }
    }
}

impl SyncError {
    /// Returns true for failures that leave the record dirty for a retry on
    /// the next cycle (as opposed to configuration errors)
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::InvalidDescriptor(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_routing() {
        let err: SyncError = StoreError::IdentityAssignment("no slot".to_string()).into();
        assert!(matches!(err, SyncError::IdentityAssignment(_)));

        let err: SyncError = StoreError::Unavailable("closed".to_string()).into();
        assert!(matches!(err, SyncError::StoreUnavailable(_)));

        let err: SyncError = StoreError::Storage("io".to_string()).into();
        assert!(matches!(err, SyncError::Store(_)));
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: SyncError = TransportError::Timeout.into();
        assert!(matches!(err, SyncError::Transport(TransportError::Timeout)));
    }

    #[test]
    fn test_dependency_display() {
        let dependent = LocalId::new();
        let dependency = LocalId::new();
        let err = SyncError::DependencyUnsatisfiable {
            dependent,
            dependency,
        };
        let text = err.to_string();
        assert!(text.contains(&dependent.to_string()));
        assert!(text.contains(&dependency.to_string()));
    }

    #[test]
    fn test_retryable_classes() {
        assert!(SyncError::Cancelled.is_retryable());
        assert!(SyncError::Transport(TransportError::Timeout).is_retryable());
        assert!(!SyncError::InvalidDescriptor("x".to_string()).is_retryable());
    }
}
