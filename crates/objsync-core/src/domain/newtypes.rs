//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and
//! values. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// LocalId
// ============================================================================

/// The durable local handle of a record
///
/// A `LocalId` is assigned by the local store and is stable for the lifetime
/// of the record, independent of any in-memory edit session. It is never
/// reused, and it remains valid after the record acquires a remote identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Create a new random LocalId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a LocalId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Create a nil (all zeros) LocalId
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid LocalId: {e}")))
    }
}

impl From<Uuid> for LocalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// RemoteId
// ============================================================================

/// The identifier assigned by the remote store
///
/// Present only once a record is confirmed to exist remotely. Remote stores
/// use opaque string identifiers; numeric identifiers are carried in their
/// decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Creates a RemoteId, rejecting empty values
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "remote identifier must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// EntityKind
// ============================================================================

/// The name of a local entity type (e.g. `"task"`, `"reminder"`)
///
/// Entity kinds key the sync descriptor registry. Names are case-sensitive
/// and must be non-empty with no surrounding or embedded whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    /// Creates an EntityKind, rejecting empty names and names with whitespace
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidEntityKind(name));
        }
        Ok(Self(name))
    }

    /// Returns the kind name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// SyncRank
// ============================================================================

/// Execution precedence class for sync operations
///
/// Lower ranks execute first; all operations of rank N reach a terminal
/// state before any operation of rank N+1 begins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SyncRank(i32);

impl SyncRank {
    /// Creates a rank with the given precedence value
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the precedence value
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl Display for SyncRank {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for SyncRank {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
