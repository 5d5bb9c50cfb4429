//! Cycle identity and outcome accounting
//!
//! One cycle is a full pass of scan -> schedule -> execute -> summarize.
//! The [`CycleSummary`] is the engine's report at cycle end; per-object
//! failures never abort a cycle, they are collected here and surfaced to
//! observers.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::newtypes::{EntityKind, LocalId};
use super::sync_target::SyncAction;
use crate::errors::SyncError;

// ============================================================================
// CycleId
// ============================================================================

/// Identifier for one sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Uuid);

impl CycleId {
    /// Create a new random CycleId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a CycleId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CycleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CycleId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid CycleId: {e}")))
    }
}

// ============================================================================
// CycleFailure / CycleSummary
// ============================================================================

/// One failed or cancelled operation within a cycle
#[derive(Debug, Clone)]
pub struct CycleFailure {
    /// Entity type of the affected record
    pub entity: EntityKind,
    /// Local handle of the affected record
    pub local_id: LocalId,
    /// The HTTP semantic the operation was attempting
    pub action: SyncAction,
    /// Why the operation did not complete
    pub error: SyncError,
}

/// Summary of a completed synchronization cycle
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    /// Operations that completed their round trip and merged successfully
    pub completed: u32,
    /// Operations that failed (transport, merge, or dependency)
    pub failed: u32,
    /// Operations cancelled before or during execution
    pub cancelled: u32,
    /// Every failed or cancelled operation, with its cause
    pub failures: Vec<CycleFailure>,
    /// Wall-clock duration of the cycle in milliseconds
    pub duration_ms: u64,
}

impl CycleSummary {
    /// Total number of operations the cycle scheduled
    pub fn total(&self) -> u32 {
        self.completed + self.failed + self.cancelled
    }

    /// Returns true if no operation failed or was cancelled
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}
