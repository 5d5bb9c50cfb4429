//! Dirty object scanner
//!
//! Translates the local store's change feed into classified [`SyncTarget`]s.
//! For each changed record the scanner resolves its descriptor (no
//! descriptor means the record is not sync-eligible and is silently
//! skipped), forces permanent-identity assignment for freshly inserted
//! records, and classifies the required HTTP semantic:
//!
//! - marked for deletion -> `Delete` (the remote identifier is carried when
//!   known so the delete can address the correct remote resource)
//! - existence predicate false -> `Create`
//! - otherwise -> `Update`
//!
//! The output is duplicate-free per local handle; `Delete` wins ties, and
//! `Create` wins over `Update` for records inserted and edited within one
//! scan window.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use objsync_core::descriptor::SyncDescriptor;
use objsync_core::domain::newtypes::LocalId;
use objsync_core::domain::record::RecordSnapshot;
use objsync_core::domain::sync_target::{SyncAction, SyncTarget};
use objsync_core::errors::SyncError;
use objsync_core::ports::local_store::{ChangeKind, ILocalStore, StoreError};

use crate::registry::RegistrySnapshot;

/// Produces the cycle's sync targets from the store's change feed
pub struct DirtyScanner {
    store: Arc<dyn ILocalStore>,
}

impl DirtyScanner {
    /// Creates a scanner over the given local store
    pub fn new(store: Arc<dyn ILocalStore>) -> Self {
        Self { store }
    }

    /// Scans for dirty records and classifies them into sync targets
    ///
    /// # Arguments
    /// * `registry` - The cycle's registry snapshot
    /// * `since` - Watermark hint passed through to the change feed
    ///
    /// # Errors
    ///
    /// Store unavailability aborts the scan (and with it the cycle);
    /// identity-assignment failures exclude only the affected record, which
    /// is retried on the next cycle.
    #[tracing::instrument(skip(self, registry))]
    pub async fn scan(
        &self,
        registry: &RegistrySnapshot,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SyncTarget>, SyncError> {
        let changed = self.store.changed_records(since).await?;
        debug!(changed = changed.len(), "Change feed read");

        let mut order: Vec<LocalId> = Vec::new();
        let mut by_id: HashMap<LocalId, SyncTarget> = HashMap::new();

        for record in changed {
            let Some(descriptor) = registry.get(&record.entity) else {
                debug!(entity = %record.entity, "No descriptor registered, record is not sync-eligible");
                continue;
            };

            // Freshly inserted records may carry a provisional handle; the
            // target's handle must stay dereferenceable after the
            // originating edit session ends, so durability is forced here.
            let local_id = if record.provisional {
                match self.store.obtain_permanent_id(&record.local_id).await {
                    Ok(durable) => durable,
                    Err(StoreError::IdentityAssignment(reason)) => {
                        warn!(
                            entity = %record.entity,
                            handle = %record.local_id,
                            %reason,
                            "Permanent identity unavailable, deferring record to next cycle"
                        );
                        continue;
                    }
                    Err(other) => return Err(other.into()),
                }
            } else {
                record.local_id
            };

            let Some(snapshot) = self.store.fetch(&local_id).await? else {
                debug!(local_id = %local_id, "Record vanished after change notification, skipping");
                continue;
            };

            let action = if snapshot.deleted || record.kind == ChangeKind::Deleted {
                SyncAction::Delete
            } else if !descriptor.exists_remotely(&snapshot) {
                SyncAction::Create
            } else {
                SyncAction::Update
            };

            let depends_on = if action.is_delete() {
                // Deletes address the remote resource directly; they never
                // wait on a referenced record's identity.
                Vec::new()
            } else {
                relation_dependencies(descriptor, &snapshot)
            };

            let target = SyncTarget::new(
                snapshot.entity.clone(),
                local_id,
                snapshot.remote_id.clone(),
                action,
                descriptor.rank(),
                snapshot.modified_at,
            )
            .with_depends_on(depends_on);

            match by_id.get(&local_id) {
                Some(existing) if !target.action().supersedes(&existing.action()) => {
                    debug!(
                        local_id = %local_id,
                        kept = existing.action().name(),
                        dropped = target.action().name(),
                        "Coalesced duplicate change"
                    );
                }
                Some(_) => {
                    by_id.insert(local_id, target);
                }
                None => {
                    order.push(local_id);
                    by_id.insert(local_id, target);
                }
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect())
    }
}

/// Extracts the local handles a record references through its descriptor's
/// declared relations
fn relation_dependencies(descriptor: &SyncDescriptor, snapshot: &RecordSnapshot) -> Vec<LocalId> {
    let mut deps = Vec::new();
    for decl in descriptor.relations() {
        let Some(value) = snapshot.field(&decl.local_field) else {
            continue;
        };
        let Some(raw) = value.as_str() else {
            warn!(
                entity = %snapshot.entity,
                field = %decl.local_field,
                "Relation field does not hold a local handle, ignoring"
            );
            continue;
        };
        match raw.parse::<LocalId>() {
            Ok(dep) => {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
            Err(_) => {
                warn!(
                    entity = %snapshot.entity,
                    field = %decl.local_field,
                    "Relation field is not a valid local handle, ignoring"
                );
            }
        }
    }
    deps
}
