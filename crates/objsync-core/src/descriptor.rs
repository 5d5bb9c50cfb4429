//! Sync descriptors - per-entity remote mapping configuration
//!
//! A [`SyncDescriptor`] binds a local entity type to everything the engine
//! needs to sync it: the remote collection endpoint, the execution rank, the
//! opaque field mapping, the remote-existence predicate, and the declared
//! relations that drive intra-cycle ordering.
//!
//! Descriptors are built through [`SyncDescriptorBuilder`], which validates
//! required fields at construction time. A malformed descriptor can never
//! reach the registry, so classification failures cannot surface lazily in
//! the middle of a sync cycle.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;
use crate::domain::newtypes::{EntityKind, SyncRank};
use crate::domain::record::RecordSnapshot;
use crate::ports::mapping::IRemoteMapping;

/// Predicate deciding whether a record is known to exist remotely
///
/// Must be pure and side-effect-free; the scanner calls it from its own
/// task for every dirty record.
pub type ExistsPredicate = Arc<dyn Fn(&RecordSnapshot) -> bool + Send + Sync>;

/// Returns the conventional existence predicate: a record exists remotely
/// once it carries a remote identifier
pub fn exists_when_remote_id_present() -> ExistsPredicate {
    Arc::new(|record: &RecordSnapshot| record.remote_id.is_some())
}

// ============================================================================
// RelationDecl
// ============================================================================

/// An explicitly declared relationship to another entity
///
/// `local_field` names the payload field holding the referenced record's
/// local handle (as a UUID string); `remote_key` names the key the mapping
/// emits the referenced record's remote identifier under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDecl {
    /// Payload field carrying the referenced record's local handle
    pub local_field: String,
    /// Remote payload key for the referenced record's remote identifier
    pub remote_key: String,
    /// Entity type of the referenced record
    pub target: EntityKind,
}

impl RelationDecl {
    /// Creates a relation declaration
    pub fn new(
        local_field: impl Into<String>,
        remote_key: impl Into<String>,
        target: EntityKind,
    ) -> Self {
        Self {
            local_field: local_field.into(),
            remote_key: remote_key.into(),
            target,
        }
    }
}

// ============================================================================
// SyncDescriptor
// ============================================================================

/// Per-entity sync configuration
///
/// At most one descriptor is registered per entity kind; registering a
/// duplicate atomically replaces the prior one.
#[derive(Clone)]
pub struct SyncDescriptor {
    /// Entity type this descriptor covers
    entity: EntityKind,
    /// Remote collection endpoint, used to address Create requests
    /// (e.g. `/tasks`); resource addresses append the remote identifier
    collection_path: String,
    /// Execution precedence class
    rank: SyncRank,
    /// Opaque local/remote field translation
    mapping: Arc<dyn IRemoteMapping>,
    /// Pure predicate deciding create-vs-update
    exists_remotely: ExistsPredicate,
    /// Declared relationships to other entities
    relations: Vec<RelationDecl>,
}

impl SyncDescriptor {
    /// Starts building a descriptor for the given entity kind
    pub fn builder(entity: EntityKind) -> SyncDescriptorBuilder {
        SyncDescriptorBuilder::new(entity)
    }

    /// Returns the entity type
    pub fn entity(&self) -> &EntityKind {
        &self.entity
    }

    /// Returns the remote collection endpoint
    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }

    /// Returns the path addressing one resource in the collection
    pub fn resource_path(&self, remote_id: &crate::domain::newtypes::RemoteId) -> String {
        format!(
            "{}/{}",
            self.collection_path.trim_end_matches('/'),
            remote_id.as_str()
        )
    }

    /// Returns the execution precedence class
    pub fn rank(&self) -> SyncRank {
        self.rank
    }

    /// Returns the field mapping handle
    pub fn mapping(&self) -> &Arc<dyn IRemoteMapping> {
        &self.mapping
    }

    /// Evaluates the remote-existence predicate against a snapshot
    pub fn exists_remotely(&self, record: &RecordSnapshot) -> bool {
        (self.exists_remotely)(record)
    }

    /// Returns the declared relations
    pub fn relations(&self) -> &[RelationDecl] {
        &self.relations
    }

    /// Re-checks the invariants the builder enforced
    ///
    /// The registry calls this before admitting a descriptor so a batch
    /// registration can be rejected atomically.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.collection_path.trim().is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "descriptor for '{}' has an empty collection path",
                self.entity
            )));
        }
        if !self.collection_path.starts_with('/') {
            return Err(DomainError::ValidationFailed(format!(
                "descriptor for '{}' has a relative collection path '{}'",
                self.entity, self.collection_path
            )));
        }
        for relation in &self.relations {
            if relation.local_field.is_empty() || relation.remote_key.is_empty() {
                return Err(DomainError::ValidationFailed(format!(
                    "descriptor for '{}' declares a relation with empty field names",
                    self.entity
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SyncDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncDescriptor")
            .field("entity", &self.entity)
            .field("collection_path", &self.collection_path)
            .field("rank", &self.rank)
            .field("relations", &self.relations)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SyncDescriptorBuilder
// ============================================================================

/// Builder enforcing that every required descriptor field is supplied
pub struct SyncDescriptorBuilder {
    entity: EntityKind,
    collection_path: Option<String>,
    rank: Option<SyncRank>,
    mapping: Option<Arc<dyn IRemoteMapping>>,
    exists_remotely: Option<ExistsPredicate>,
    relations: Vec<RelationDecl>,
}

impl SyncDescriptorBuilder {
    /// Creates a builder for the given entity kind
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            collection_path: None,
            rank: None,
            mapping: None,
            exists_remotely: None,
            relations: Vec::new(),
        }
    }

    /// Sets the remote collection endpoint (required)
    pub fn collection_path(mut self, path: impl Into<String>) -> Self {
        self.collection_path = Some(path.into());
        self
    }

    /// Sets the execution precedence class (required)
    pub fn rank(mut self, rank: SyncRank) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Sets the field mapping handle (required)
    pub fn mapping(mut self, mapping: Arc<dyn IRemoteMapping>) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Sets the remote-existence predicate (required)
    pub fn exists_remotely(mut self, predicate: ExistsPredicate) -> Self {
        self.exists_remotely = Some(predicate);
        self
    }

    /// Declares a relationship to another entity
    pub fn relation(mut self, relation: RelationDecl) -> Self {
        self.relations.push(relation);
        self
    }

    /// Validates and builds the descriptor
    ///
    /// # Errors
    ///
    /// `DomainError::ValidationFailed` if the collection path, rank,
    /// mapping, or existence predicate is missing or malformed.
    pub fn build(self) -> Result<SyncDescriptor, DomainError> {
        let collection_path = self.collection_path.ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "descriptor for '{}' is missing a collection path",
                self.entity
            ))
        })?;
        let rank = self.rank.ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "descriptor for '{}' is missing a sync rank",
                self.entity
            ))
        })?;
        let mapping = self.mapping.ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "descriptor for '{}' is missing a remote mapping",
                self.entity
            ))
        })?;
        let exists_remotely = self.exists_remotely.ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "descriptor for '{}' is missing an existence predicate",
                self.entity
            ))
        })?;

        let descriptor = SyncDescriptor {
            entity: self.entity,
            collection_path,
            rank,
            mapping,
            exists_remotely,
            relations: self.relations,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}
