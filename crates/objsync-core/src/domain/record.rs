//! Record snapshots and merge payloads
//!
//! A [`RecordSnapshot`] is a point-in-time copy of a local record as read
//! from the local store. Snapshots are read at operation build time and must
//! not be assumed current at execute time; the engine re-fetches before
//! merging a remote response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::{EntityKind, LocalId, RemoteId};

/// Point-in-time copy of a local record
///
/// The `payload` carries the record's attribute values as a JSON object with
/// local field names. Relationship fields hold the referenced record's
/// [`LocalId`] in string form; translation to remote identifiers happens at
/// request build time through the descriptor's declared relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    /// Entity type of the record
    pub entity: EntityKind,
    /// Durable local handle
    pub local_id: LocalId,
    /// Remote identifier, if the record is known to exist remotely
    pub remote_id: Option<RemoteId>,
    /// Attribute values, keyed by local field name
    pub payload: Value,
    /// Whether the record is marked for local deletion (tombstone)
    pub deleted: bool,
    /// When the record was last modified locally
    pub modified_at: DateTime<Utc>,
}

impl RecordSnapshot {
    /// Returns the value of a payload field, if present and non-null
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self.payload.get(name) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }
}

/// Fields to merge into a local record after a successful remote round trip
///
/// Produced by the resolved mapping from a remote response body. The engine
/// applies the merge on the store's write context; it never inspects the
/// `fields` object beyond handing it to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedFields {
    /// Remote identifier assigned by the remote store, when the response
    /// carried one (always expected for Create responses)
    pub remote_id: Option<RemoteId>,
    /// Attribute values to merge, keyed by local field name
    pub fields: Value,
}

impl MergedFields {
    /// Creates an empty merge carrying only a remote identifier
    pub fn identity_only(remote_id: RemoteId) -> Self {
        Self {
            remote_id: Some(remote_id),
            fields: Value::Object(serde_json::Map::new()),
        }
    }
}
