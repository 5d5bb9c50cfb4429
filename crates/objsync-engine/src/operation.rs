//! Sync operation - one record's remote round trip
//!
//! A [`SyncOperation`] takes one classified [`SyncTarget`], builds the
//! transport request its action requires, executes it, and applies the
//! result back to the local record through the store write context.
//!
//! ## Consistency rules
//!
//! - The scan-time snapshot is never trusted at execute time: the operation
//!   re-fetches the record before building the request and again before
//!   merging the response.
//! - A `Create` whose fresh snapshot already carries a remote identifier is
//!   demoted to `Update`, so a retried create never produces a duplicate
//!   remote resource.
//! - A failed round trip leaves the record's dirty state untouched; the
//!   record is retried on the next scan cycle. A failed or cancelled
//!   operation never marks the record synced.
//! - If the record was edited locally while the request was in flight, only
//!   the assigned remote identity is merged and the dirty flag stays set,
//!   so the newer edit is pushed next cycle instead of being lost.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use objsync_core::descriptor::SyncDescriptor;
use objsync_core::domain::newtypes::{LocalId, RemoteId};
use objsync_core::domain::operation::OperationState;
use objsync_core::domain::record::{MergedFields, RecordSnapshot};
use objsync_core::domain::sync_target::{SyncAction, SyncTarget};
use objsync_core::errors::SyncError;
use objsync_core::ports::mapping::{MappingError, ResolvedRelations};
use objsync_core::ports::transport::{ITransport, SyncRequest, SyncResponse};

use crate::write_context::StoreWriter;

// ============================================================================
// OperationOutcome
// ============================================================================

/// Terminal result of one sync operation
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    /// The target the operation was built from
    pub target: SyncTarget,
    /// Terminal state (Completed, Failed, or Cancelled)
    pub state: OperationState,
    /// The cause, for Failed and Cancelled outcomes
    pub error: Option<SyncError>,
}

impl OperationOutcome {
    /// Builds the outcome of an operation cancelled before it was submitted
    pub fn never_started(target: SyncTarget) -> Self {
        Self {
            target,
            state: OperationState::Cancelled,
            error: Some(SyncError::Cancelled),
        }
    }
}

// ============================================================================
// Request plan
// ============================================================================

/// The concrete round trip resolved from the fresh snapshot
enum Plan {
    /// POST to the collection endpoint
    Create(RecordSnapshot),
    /// PUT to the resource endpoint
    Update(RecordSnapshot, RemoteId),
    /// DELETE on the resource endpoint; `None` when the record never
    /// acquired a remote identity (local-only removal)
    Delete {
        remote_id: Option<RemoteId>,
        have_tombstone: bool,
    },
}

// ============================================================================
// SyncOperation
// ============================================================================

/// A single unit of sync work over one dirty record
///
/// The operation holds non-owning references to shared engine state (the
/// resolved descriptor, the transport handle, the write context); the
/// scheduler owns operations only for their active lifetime.
pub struct SyncOperation {
    target: SyncTarget,
    descriptor: Arc<SyncDescriptor>,
    transport: Arc<dyn ITransport>,
    writer: StoreWriter,
    cancel: CancellationToken,
    state: OperationState,
}

impl SyncOperation {
    /// Builds a pending operation for a target
    pub fn new(
        target: SyncTarget,
        descriptor: Arc<SyncDescriptor>,
        transport: Arc<dyn ITransport>,
        writer: StoreWriter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            target,
            descriptor,
            transport,
            writer,
            cancel,
            state: OperationState::Pending,
        }
    }

    /// Returns the operation's target
    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Returns the current lifecycle state
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Runs the round trip to a terminal state
    #[tracing::instrument(
        skip(self),
        fields(
            entity = %self.target.entity(),
            local_id = %self.target.local_id(),
            action = %self.target.action(),
        )
    )]
    pub async fn execute(mut self) -> OperationOutcome {
        if self.cancel.is_cancelled() {
            // Cycle torn down before this operation was submitted
            self.state.transition_to(OperationState::Cancelled).ok();
            return OperationOutcome {
                target: self.target,
                state: self.state,
                error: Some(SyncError::Cancelled),
            };
        }

        self.state.transition_to(OperationState::Executing).ok();

        let result = self.run().await;
        let (state, error) = match result {
            Ok(()) => (OperationState::Completed, None),
            Err(SyncError::Cancelled) => (OperationState::Cancelled, Some(SyncError::Cancelled)),
            Err(err) => {
                warn!(error = %err, "Sync operation failed");
                (OperationState::Failed, Some(err))
            }
        };
        self.state.transition_to(state).ok();

        OperationOutcome {
            target: self.target,
            state: self.state,
            error,
        }
    }

    async fn run(&self) -> Result<(), SyncError> {
        let snapshot = self.writer.fetch(*self.target.local_id()).await?;

        match self.resolve_plan(snapshot)? {
            Plan::Create(snapshot) => {
                let body = self.build_body(&snapshot).await?;
                let request = SyncRequest::post(self.descriptor.collection_path(), body);
                let response = self.execute_transport(request).await?;
                self.merge_response(&snapshot, response).await
            }
            Plan::Update(snapshot, remote_id) => {
                let body = self.build_body(&snapshot).await?;
                let request = SyncRequest::put(self.descriptor.resource_path(&remote_id), body);
                let response = self.execute_transport(request).await?;
                self.merge_response(&snapshot, response).await
            }
            Plan::Delete {
                remote_id,
                have_tombstone,
            } => {
                if let Some(remote_id) = remote_id {
                    let request = SyncRequest::delete(self.descriptor.resource_path(&remote_id));
                    self.execute_transport(request).await?;
                } else {
                    debug!("Record never existed remotely, removing locally only");
                }
                if have_tombstone {
                    self.writer.remove(*self.target.local_id()).await?;
                }
                Ok(())
            }
        }
    }

    /// Resolves the concrete round trip from the fresh snapshot
    ///
    /// This is where the scan-time classification is re-validated against
    /// current store state.
    fn resolve_plan(&self, snapshot: Option<RecordSnapshot>) -> Result<Plan, SyncError> {
        if self.target.action().is_delete() {
            if let Some(snapshot) = &snapshot {
                if !snapshot.deleted {
                    // The deletion mark was cleared between scan and
                    // execute; a live record must not be deleted remotely.
                    debug!("Deletion rescinded concurrently, cancelling");
                    return Err(SyncError::Cancelled);
                }
            }
            let remote_id = snapshot
                .as_ref()
                .and_then(|s| s.remote_id.clone())
                .or_else(|| self.target.remote_id().cloned());
            return Ok(Plan::Delete {
                remote_id,
                have_tombstone: snapshot.is_some(),
            });
        }

        let Some(snapshot) = snapshot else {
            return Err(SyncError::MergeConflict(
                "record vanished before its round trip was built".to_string(),
            ));
        };

        if snapshot.deleted {
            // Deleted out from under a pending Create/Update; the delete
            // will be scheduled by the next scan, nothing may be merged now.
            debug!("Record was deleted concurrently, cancelling");
            return Err(SyncError::Cancelled);
        }

        let addressed = snapshot
            .remote_id
            .clone()
            .or_else(|| self.target.remote_id().cloned());

        match (self.target.action(), addressed) {
            // Idempotence: the record acquired a remote identity since the
            // scan (e.g. a retried create), so re-submitting a POST would
            // duplicate the remote resource.
            (SyncAction::Create, Some(remote_id)) => {
                debug!(remote_id = %remote_id, "Create demoted to update, remote identity already assigned");
                Ok(Plan::Update(snapshot, remote_id))
            }
            (SyncAction::Create, None) => Ok(Plan::Create(snapshot)),
            (SyncAction::Update, Some(remote_id)) => Ok(Plan::Update(snapshot, remote_id)),
            // The existence predicate said the record exists remotely but
            // no identity is available to address it; create instead.
            (SyncAction::Update, None) => Ok(Plan::Create(snapshot)),
            (SyncAction::Delete, _) => unreachable!("delete handled above"),
        }
    }

    /// Builds the request body, resolving declared relations to the
    /// referenced records' remote identifiers
    async fn build_body(
        &self,
        snapshot: &RecordSnapshot,
    ) -> Result<serde_json::Value, SyncError> {
        let mut relations = ResolvedRelations::new();
        for decl in self.descriptor.relations() {
            let Some(value) = snapshot.field(&decl.local_field) else {
                continue;
            };
            let raw = value.as_str().ok_or_else(|| {
                MappingError::Malformed(format!(
                    "relation field '{}' does not hold a local handle",
                    decl.local_field
                ))
            })?;
            let dependency: LocalId = raw.parse().map_err(|_| {
                MappingError::Malformed(format!(
                    "relation field '{}' is not a valid local handle",
                    decl.local_field
                ))
            })?;

            let referenced = self.writer.fetch(dependency).await?;
            match referenced.and_then(|r| r.remote_id) {
                Some(remote_id) => {
                    relations.insert(decl.local_field.clone(), remote_id);
                }
                None => {
                    return Err(SyncError::DependencyUnsatisfiable {
                        dependent: *self.target.local_id(),
                        dependency,
                    });
                }
            }
        }

        Ok(self
            .descriptor
            .mapping()
            .request_body(snapshot, &relations)?)
    }

    /// Executes the transport exchange, honoring cancellation
    async fn execute_transport(&self, request: SyncRequest) -> Result<SyncResponse, SyncError> {
        debug!(method = %request.method, path = %request.path, "Executing sync request");
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            result = self.transport.execute(&request) => Ok(result?),
        }
    }

    /// Merges the response into the local record on the write context
    ///
    /// Re-validates the record first: a record removed or tombstoned during
    /// the round trip fails with a merge conflict and nothing is applied.
    async fn merge_response(
        &self,
        built_from: &RecordSnapshot,
        response: SyncResponse,
    ) -> Result<(), SyncError> {
        let Some(body) = response.body else {
            return Err(MappingError::Malformed(format!(
                "response {} carried no body to merge",
                response.status
            ))
            .into());
        };
        let merged = self.descriptor.mapping().merge_fields(&body)?;

        let local_id = *self.target.local_id();
        let fresh = self.writer.fetch(local_id).await?;
        let Some(fresh) = fresh else {
            return Err(SyncError::MergeConflict(
                "record removed while its round trip was in flight".to_string(),
            ));
        };
        if fresh.deleted {
            return Err(SyncError::MergeConflict(
                "record deleted while its round trip was in flight".to_string(),
            ));
        }

        if fresh.modified_at > built_from.modified_at {
            // Edited while the request was in flight: merge only the
            // assigned identity and keep the dirty flag, so the newer edit
            // is pushed next cycle instead of being overwritten by the
            // stale remote echo.
            debug!("Record edited during round trip, merging identity only");
            if let Some(remote_id) = merged.remote_id {
                self.writer
                    .apply_merge(local_id, MergedFields::identity_only(remote_id))
                    .await?;
            }
        } else {
            self.writer.apply_merge(local_id, merged).await?;
            self.writer.mark_synced(local_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        descriptor, descriptor_with_relation, snapshot_of, task_snapshot, MockStore, MockTransport,
    };
    use objsync_core::descriptor::RelationDecl;
    use objsync_core::domain::newtypes::{EntityKind, SyncRank};
    use objsync_core::domain::sync_target::SyncAction;
    use objsync_core::ports::local_store::ILocalStore;
    use objsync_core::ports::transport::TransportError;
    use chrono::Utc;
    use serde_json::json;

    fn target_for(snapshot: &RecordSnapshot, action: SyncAction) -> SyncTarget {
        SyncTarget::new(
            snapshot.entity.clone(),
            snapshot.local_id,
            snapshot.remote_id.clone(),
            action,
            SyncRank::new(0),
            snapshot.modified_at,
        )
    }

    struct Fixture {
        store: Arc<MockStore>,
        transport: Arc<MockTransport>,
        writer: StoreWriter,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MockStore::new());
            let writer = StoreWriter::spawn(Arc::clone(&store) as Arc<dyn ILocalStore>);
            Self {
                store,
                transport: Arc::new(MockTransport::new()),
                writer,
            }
        }

        fn operation(
            &self,
            target: SyncTarget,
            descriptor: objsync_core::descriptor::SyncDescriptor,
        ) -> SyncOperation {
            SyncOperation::new(
                target,
                Arc::new(descriptor),
                Arc::clone(&self.transport) as Arc<dyn ITransport>,
                self.writer.clone(),
                CancellationToken::new(),
            )
        }
    }

    #[tokio::test]
    async fn test_create_posts_and_merges_remote_id() {
        let fx = Fixture::new();
        let snapshot = task_snapshot(json!({ "name": "buy milk" }));
        let id = snapshot.local_id;
        fx.store.insert(snapshot.clone());
        fx.transport
            .stub_ok("POST", "/tasks", 201, json!({ "id": 7, "name": "buy milk" }));

        let outcome = fx
            .operation(target_for(&snapshot, SyncAction::Create), descriptor("task", "/tasks"))
            .execute()
            .await;

        assert_eq!(outcome.state, OperationState::Completed);
        assert!(outcome.error.is_none());

        let record = fx.store.get(&id).unwrap();
        assert_eq!(record.remote_id.unwrap().as_str(), "7");
        assert!(!fx.store.is_dirty(&id));
    }

    #[tokio::test]
    async fn test_create_demoted_to_update_when_remote_id_appeared() {
        let fx = Fixture::new();
        let mut snapshot = task_snapshot(json!({ "name": "buy milk" }));
        let target = target_for(&snapshot, SyncAction::Create);
        // The remote identity appeared after the scan (e.g. merged by a
        // previous attempt whose mark_synced did not land).
        snapshot.remote_id = Some(objsync_core::domain::newtypes::RemoteId::new("7").unwrap());
        fx.store.insert(snapshot.clone());
        fx.transport
            .stub_ok("PUT", "/tasks/7", 200, json!({ "id": 7, "name": "buy milk" }));

        let outcome = fx
            .operation(target, descriptor("task", "/tasks"))
            .execute()
            .await;

        assert_eq!(outcome.state, OperationState::Completed);
        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/tasks/7");
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_record_dirty() {
        let fx = Fixture::new();
        let snapshot = task_snapshot(json!({ "name": "a" }));
        let id = snapshot.local_id;
        fx.store.insert(snapshot.clone());
        fx.transport.stub(
            "POST",
            "/tasks",
            Err(TransportError::Status {
                status: 500,
                message: "boom".to_string(),
            }),
        );

        let outcome = fx
            .operation(target_for(&snapshot, SyncAction::Create), descriptor("task", "/tasks"))
            .execute()
            .await;

        assert_eq!(outcome.state, OperationState::Failed);
        assert!(matches!(outcome.error, Some(SyncError::Transport(_))));
        assert!(fx.store.is_dirty(&id));
        assert!(fx.store.get(&id).unwrap().remote_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_with_remote_id_removes_remote_and_local() {
        let fx = Fixture::new();
        let mut snapshot = task_snapshot(json!({ "name": "a" }));
        snapshot.remote_id = Some(objsync_core::domain::newtypes::RemoteId::new("3").unwrap());
        snapshot.deleted = true;
        let id = snapshot.local_id;
        fx.store.insert(snapshot.clone());
        fx.transport
            .stub("DELETE", "/tasks/3", Ok(SyncResponse { status: 204, body: None }));

        let outcome = fx
            .operation(target_for(&snapshot, SyncAction::Delete), descriptor("task", "/tasks"))
            .execute()
            .await;

        assert_eq!(outcome.state, OperationState::Completed);
        assert_eq!(fx.transport.request_count(), 1);
        assert!(fx.store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_delete_without_remote_id_is_local_only() {
        let fx = Fixture::new();
        let mut snapshot = task_snapshot(json!({ "name": "never synced" }));
        snapshot.deleted = true;
        let id = snapshot.local_id;
        fx.store.insert(snapshot.clone());

        let outcome = fx
            .operation(target_for(&snapshot, SyncAction::Delete), descriptor("task", "/tasks"))
            .execute()
            .await;

        assert_eq!(outcome.state, OperationState::Completed);
        assert_eq!(fx.transport.request_count(), 0);
        assert!(fx.store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_update_cancelled_when_record_deleted_concurrently() {
        let fx = Fixture::new();
        let mut snapshot = task_snapshot(json!({ "name": "a" }));
        snapshot.remote_id = Some(objsync_core::domain::newtypes::RemoteId::new("3").unwrap());
        let target = target_for(&snapshot, SyncAction::Update);
        snapshot.deleted = true;
        let id = snapshot.local_id;
        fx.store.insert(snapshot);

        let outcome = fx
            .operation(target, descriptor("task", "/tasks"))
            .execute()
            .await;

        assert_eq!(outcome.state, OperationState::Cancelled);
        assert_eq!(fx.transport.request_count(), 0);
        // The tombstone is untouched; the next scan schedules the delete.
        assert!(fx.store.get(&id).is_some());
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_submission() {
        let fx = Fixture::new();
        let snapshot = task_snapshot(json!({ "name": "a" }));
        fx.store.insert(snapshot.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let operation = SyncOperation::new(
            target_for(&snapshot, SyncAction::Create),
            Arc::new(descriptor("task", "/tasks")),
            Arc::clone(&fx.transport) as Arc<dyn ITransport>,
            fx.writer.clone(),
            cancel,
        );

        let outcome = operation.execute().await;
        assert_eq!(outcome.state, OperationState::Cancelled);
        assert_eq!(fx.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_relation_resolved_into_payload() {
        let fx = Fixture::new();
        let mut parent = task_snapshot(json!({ "name": "parent" }));
        parent.remote_id = Some(objsync_core::domain::newtypes::RemoteId::new("40").unwrap());
        let parent_id = parent.local_id;
        fx.store.insert_clean(parent);

        let child = snapshot_of(
            "reminder",
            json!({ "remind_at": "2026-08-01T09:00:00Z", "task": parent_id.to_string() }),
        );
        fx.store.insert(child.clone());
        fx.transport
            .stub_ok("POST", "/reminders", 201, json!({ "id": 41 }));

        let desc = descriptor_with_relation(
            "reminder",
            "/reminders",
            SyncRank::new(1),
            RelationDecl::new("task", "task_id", EntityKind::new("task").unwrap()),
        );
        let outcome = fx
            .operation(target_for(&child, SyncAction::Create), desc)
            .execute()
            .await;

        assert_eq!(outcome.state, OperationState::Completed);
        let requests = fx.transport.requests();
        let payload = requests[0].payload.as_ref().unwrap();
        assert_eq!(payload["task_id"], json!("40"));
        // The local handle never leaks into the wire payload
        assert!(payload.get("task").is_none());
    }

    #[tokio::test]
    async fn test_unresolved_relation_fails_without_network() {
        let fx = Fixture::new();
        let parent = task_snapshot(json!({ "name": "parent, never synced" }));
        let parent_id = parent.local_id;
        fx.store.insert_clean(parent);

        let child = snapshot_of("reminder", json!({ "task": parent_id.to_string() }));
        fx.store.insert(child.clone());

        let desc = descriptor_with_relation(
            "reminder",
            "/reminders",
            SyncRank::new(1),
            RelationDecl::new("task", "task_id", EntityKind::new("task").unwrap()),
        );
        let outcome = fx
            .operation(target_for(&child, SyncAction::Create), desc)
            .execute()
            .await;

        assert_eq!(outcome.state, OperationState::Failed);
        assert!(matches!(
            outcome.error,
            Some(SyncError::DependencyUnsatisfiable { .. })
        ));
        assert_eq!(fx.transport.request_count(), 0);
    }

    /// Transport double that edits the record while the request is in flight
    struct EditingTransport {
        store: Arc<MockStore>,
        id: LocalId,
    }

    #[async_trait::async_trait]
    impl ITransport for EditingTransport {
        async fn execute(&self, _request: &SyncRequest) -> Result<SyncResponse, TransportError> {
            self.store.edit(&self.id, |payload| {
                payload["name"] = json!("v2");
            });
            Ok(SyncResponse {
                status: 201,
                body: Some(json!({ "id": 7, "name": "v1" })),
            })
        }
    }

    #[tokio::test]
    async fn test_edit_during_round_trip_keeps_dirty_flag() {
        let store = Arc::new(MockStore::new());
        let writer = StoreWriter::spawn(Arc::clone(&store) as Arc<dyn ILocalStore>);

        let mut snapshot = task_snapshot(json!({ "name": "v1" }));
        snapshot.modified_at = Utc::now() - chrono::Duration::seconds(5);
        let id = snapshot.local_id;
        store.insert(snapshot.clone());

        let transport = Arc::new(EditingTransport {
            store: Arc::clone(&store),
            id,
        });
        let operation = SyncOperation::new(
            target_for(&snapshot, SyncAction::Create),
            Arc::new(descriptor("task", "/tasks")),
            transport,
            writer,
            CancellationToken::new(),
        );

        let outcome = operation.execute().await;

        // The round trip completes and the assigned identity is merged, but
        // the stale remote echo does not overwrite the in-flight edit and
        // the dirty flag stays set so the edit syncs next cycle.
        assert_eq!(outcome.state, OperationState::Completed);
        let record = store.get(&id).unwrap();
        assert_eq!(record.remote_id.unwrap().as_str(), "7");
        assert_eq!(record.payload["name"], json!("v2"));
        assert!(store.is_dirty(&id));
    }
}
