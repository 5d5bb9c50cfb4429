//! Local store port (driven/secondary port)
//!
//! This module defines the interface to the local object store: the change
//! feed the scanner consumes, permanent-identity assignment, and the
//! snapshot/merge operations every sync operation funnels its local reads
//! and writes through.
//!
//! ## Design Notes
//!
//! - Errors are a typed [`StoreError`] rather than adapter-opaque errors
//!   because the engine must discriminate identity-assignment failures
//!   (which exclude a single record from the cycle) from store
//!   unavailability (which aborts the cycle before it starts).
//! - A record remains in the change feed until `mark_synced` or `remove`
//!   is called for it; the `since` argument is a lower-bound hint for
//!   stores that keep modification journals, never a correctness filter.
//!   A record whose sync failed stays dirty and reappears next cycle.
//! - Implementations must serialize writes internally. The engine
//!   additionally marshals all of its own reads and writes through a single
//!   writer task, so no two operations ever interleave mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::{EntityKind, LocalId};
use crate::domain::record::{MergedFields, RecordSnapshot};

// ============================================================================
// StoreError
// ============================================================================

/// Errors reported by the local store collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not allocate a durable identity for a new record
    #[error("Identity assignment failed: {0}")]
    IdentityAssignment(String),

    /// The store is not reachable or not open
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other storage failure (I/O, corruption, constraint violation)
    #[error("Store operation failed: {0}")]
    Storage(String),
}

// ============================================================================
// Change feed DTOs
// ============================================================================

/// How a record changed since the last successful sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Inserted locally, never synced
    Created,
    /// Edited locally since its last successful sync
    Updated,
    /// Marked for local deletion
    Deleted,
}

/// One entry from the local store's change feed
///
/// This is a port-level DTO; the scanner resolves it against the descriptor
/// registry and the record snapshot to build a classified `SyncTarget`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedRecord {
    /// Entity type of the changed record
    pub entity: EntityKind,
    /// Local handle; may be provisional for freshly inserted records
    pub local_id: LocalId,
    /// How the record changed
    pub kind: ChangeKind,
    /// True when `local_id` has not been made durable yet and the scanner
    /// must call `obtain_permanent_id` before building a target
    pub provisional: bool,
}

// ============================================================================
// ILocalStore trait
// ============================================================================

/// Port trait for the local object store
///
/// ## Implementation Notes
///
/// - `obtain_permanent_id` has synchronous semantics: it must complete (or
///   fail) before the scanner builds a target, because the target's handle
///   must stay dereferenceable after the originating edit session ends.
/// - `apply_merge` merges remote-confirmed fields into the record without
///   touching its dirty flag; `mark_synced` clears the dirty flag and is
///   called separately, only when the merged state is known to be current.
/// - `remove` deletes the record (or its deletion tombstone) entirely.
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    /// Returns the records that are new, modified, or marked for deletion
    /// since the last successful sync
    ///
    /// # Arguments
    /// * `since` - Lower-bound hint from the engine's watermark; stores
    ///   without a modification journal may ignore it
    async fn changed_records(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangedRecord>, StoreError>;

    /// Exchanges a provisional handle for a durable one
    ///
    /// # Errors
    /// `StoreError::IdentityAssignment` if the store cannot allocate a
    /// durable identity; the record is then excluded from the current cycle
    /// and retried on the next scan.
    async fn obtain_permanent_id(&self, provisional: &LocalId) -> Result<LocalId, StoreError>;

    /// Reads a point-in-time snapshot of a record
    ///
    /// Returns `None` when no record (and no tombstone) exists under the
    /// given handle.
    async fn fetch(&self, local_id: &LocalId) -> Result<Option<RecordSnapshot>, StoreError>;

    /// Merges remote-confirmed fields into a record
    async fn apply_merge(
        &self,
        local_id: &LocalId,
        fields: &MergedFields,
    ) -> Result<(), StoreError>;

    /// Clears the record's dirty flag, removing it from the change feed
    async fn mark_synced(&self, local_id: &LocalId) -> Result<(), StoreError>;

    /// Removes the record (or its deletion tombstone) entirely
    async fn remove(&self, local_id: &LocalId) -> Result<(), StoreError>;
}
