//! Sync targets - classified dirty records awaiting synchronization
//!
//! A [`SyncTarget`] is produced by the dirty scanner for each local record
//! that requires a remote round trip. Targets are transient: they are built
//! fresh each scan cycle and discarded once the corresponding operation
//! reaches a terminal state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{EntityKind, LocalId, RemoteId, SyncRank};

// ============================================================================
// SyncAction
// ============================================================================

/// The HTTP semantic a dirty record requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// The record does not exist remotely yet (POST to the collection)
    Create,
    /// The record exists remotely and has local changes (PUT to the resource)
    Update,
    /// The record is marked for deletion (DELETE on the resource)
    Delete,
}

impl SyncAction {
    /// Returns the action name as a string
    pub fn name(&self) -> &'static str {
        match self {
            SyncAction::Create => "Create",
            SyncAction::Update => "Update",
            SyncAction::Delete => "Delete",
        }
    }

    /// Returns true for the Delete action
    pub fn is_delete(&self) -> bool {
        matches!(self, SyncAction::Delete)
    }

    /// Returns true if `self` takes precedence over `other` when both were
    /// classified for the same record in one scan
    ///
    /// Delete wins over everything; Create wins over Update (a record that
    /// was created and then edited within one scan window still needs its
    /// Create round trip).
    pub fn supersedes(&self, other: &SyncAction) -> bool {
        match (self, other) {
            (SyncAction::Delete, _) => true,
            (SyncAction::Create, SyncAction::Update) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Create => write!(f, "create"),
            SyncAction::Update => write!(f, "update"),
            SyncAction::Delete => write!(f, "delete"),
        }
    }
}

// ============================================================================
// SyncTarget
// ============================================================================

/// A classified dirty record awaiting a sync operation
///
/// Carries everything the scheduler needs to order and execute the record's
/// round trip: the action, the rank copied from the descriptor at scan time,
/// and the local handles of records this one references through declared
/// relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTarget {
    /// Entity type of the record
    entity: EntityKind,
    /// Durable local handle (valid beyond the originating edit session)
    local_id: LocalId,
    /// Remote identifier, when known; a deleted record keeps its remote
    /// identifier so the delete can address the correct remote resource
    remote_id: Option<RemoteId>,
    /// Required HTTP semantic
    action: SyncAction,
    /// Execution precedence, copied from the descriptor at scan time
    rank: SyncRank,
    /// The local edit that made the record eligible for this cycle
    dirty_since: DateTime<Utc>,
    /// Local handles referenced through declared relations
    depends_on: Vec<LocalId>,
}

impl SyncTarget {
    /// Creates a sync target with no relation dependencies
    pub fn new(
        entity: EntityKind,
        local_id: LocalId,
        remote_id: Option<RemoteId>,
        action: SyncAction,
        rank: SyncRank,
        dirty_since: DateTime<Utc>,
    ) -> Self {
        Self {
            entity,
            local_id,
            remote_id,
            action,
            rank,
            dirty_since,
            depends_on: Vec::new(),
        }
    }

    /// Sets the relation dependencies
    pub fn with_depends_on(mut self, depends_on: Vec<LocalId>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Returns the entity type
    pub fn entity(&self) -> &EntityKind {
        &self.entity
    }

    /// Returns the durable local handle
    pub fn local_id(&self) -> &LocalId {
        &self.local_id
    }

    /// Returns the remote identifier, if known at scan time
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    /// Returns the required HTTP semantic
    pub fn action(&self) -> SyncAction {
        self.action
    }

    /// Returns the execution precedence class
    pub fn rank(&self) -> SyncRank {
        self.rank
    }

    /// Returns when the record became eligible for this cycle
    pub fn dirty_since(&self) -> DateTime<Utc> {
        self.dirty_since
    }

    /// Returns the local handles this target depends on
    pub fn depends_on(&self) -> &[LocalId] {
        &self.depends_on
    }
}
