//! Remote mapping port (driven/secondary port)
//!
//! A remote mapping is the opaque field-level translation between a local
//! record and its remote representation. The engine never inspects the
//! translation rules; it hands the mapping a fresh record snapshot (plus the
//! remote identifiers its declared relations resolved to) and receives a
//! request payload, or hands it a response body and receives the fields to
//! merge back.
//!
//! ## Design Notes
//!
//! - Mapping methods are synchronous and pure: no I/O, callable from any
//!   task. All I/O stays in the transport and store ports.
//! - Malformed data surfaces as [`MappingError`] and fails the one
//!   operation, never the cycle.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::domain::newtypes::RemoteId;
use crate::domain::record::{MergedFields, RecordSnapshot};

/// Remote identifiers resolved for a record's declared relations,
/// keyed by the local payload field that references the related record
pub type ResolvedRelations = HashMap<String, RemoteId>;

/// Errors reported by a remote mapping
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// A field required by the mapping is missing from the payload or body
    #[error("Missing field: {0}")]
    MissingField(String),

    /// The payload or body has an unexpected shape
    #[error("Malformed data: {0}")]
    Malformed(String),
}

/// Port trait for local/remote field translation
pub trait IRemoteMapping: Send + Sync {
    /// Builds the JSON request body for a Create or Update round trip
    ///
    /// # Arguments
    /// * `record` - Fresh snapshot of the record, read at execute time
    /// * `relations` - Remote identifiers for the record's declared
    ///   relations, keyed by local field name
    fn request_body(
        &self,
        record: &RecordSnapshot,
        relations: &ResolvedRelations,
    ) -> Result<Value, MappingError>;

    /// Extracts the fields to merge locally from a response body
    ///
    /// The returned [`MergedFields`] carries the assigned remote identifier
    /// when the body contains one; Create responses must contain one.
    fn merge_fields(&self, body: &Value) -> Result<MergedFields, MappingError>;
}
