//! Shared test doubles for the engine's unit tests
//!
//! `MockStore` is an in-memory `ILocalStore` with a dirty list and
//! provisional-identity bookkeeping; `MockTransport` replays scripted
//! responses keyed by method and path while recording every request.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};

use objsync_core::descriptor::{
    exists_when_remote_id_present, RelationDecl, SyncDescriptor,
};
use objsync_core::domain::newtypes::{EntityKind, LocalId, RemoteId, SyncRank};
use objsync_core::domain::record::{MergedFields, RecordSnapshot};
use objsync_core::ports::local_store::{ChangeKind, ChangedRecord, ILocalStore, StoreError};
use objsync_core::ports::mapping::{IRemoteMapping, MappingError, ResolvedRelations};
use objsync_core::ports::transport::{ITransport, SyncRequest, SyncResponse, TransportError};

// ============================================================================
// EchoMapping
// ============================================================================

/// Mapping that passes the payload through unchanged, overlays resolved
/// relations under their remote keys, and reads the remote id from `"id"`
pub struct EchoMapping {
    relations: Vec<RelationDecl>,
}

impl EchoMapping {
    pub fn new() -> Self {
        Self {
            relations: Vec::new(),
        }
    }

    pub fn with_relations(relations: Vec<RelationDecl>) -> Self {
        Self { relations }
    }
}

impl IRemoteMapping for EchoMapping {
    fn request_body(
        &self,
        record: &RecordSnapshot,
        relations: &ResolvedRelations,
    ) -> Result<Value, MappingError> {
        let mut body = match &record.payload {
            Value::Object(map) => map.clone(),
            other => {
                return Err(MappingError::Malformed(format!(
                    "payload is not an object: {other}"
                )))
            }
        };
        for decl in &self.relations {
            body.remove(&decl.local_field);
            if let Some(remote_id) = relations.get(&decl.local_field) {
                body.insert(decl.remote_key.clone(), json!(remote_id.as_str()));
            }
        }
        Ok(Value::Object(body))
    }

    fn merge_fields(&self, body: &Value) -> Result<MergedFields, MappingError> {
        let map = body
            .as_object()
            .ok_or_else(|| MappingError::Malformed("response body is not an object".into()))?;
        let remote_id = match map.get("id") {
            Some(Value::String(s)) => Some(
                RemoteId::new(s.clone())
                    .map_err(|e| MappingError::Malformed(e.to_string()))?,
            ),
            Some(Value::Number(n)) => Some(
                RemoteId::new(n.to_string())
                    .map_err(|e| MappingError::Malformed(e.to_string()))?,
            ),
            _ => None,
        };
        let mut fields = map.clone();
        fields.remove("id");
        Ok(MergedFields {
            remote_id,
            fields: Value::Object(fields),
        })
    }
}

// ============================================================================
// Descriptor helpers
// ============================================================================

pub fn descriptor(entity: &str, collection_path: &str) -> SyncDescriptor {
    descriptor_with_rank(entity, collection_path, SyncRank::new(0))
}

pub fn descriptor_with_rank(
    entity: &str,
    collection_path: &str,
    rank: SyncRank,
) -> SyncDescriptor {
    SyncDescriptor::builder(EntityKind::new(entity).unwrap())
        .collection_path(collection_path)
        .rank(rank)
        .mapping(Arc::new(EchoMapping::new()))
        .exists_remotely(exists_when_remote_id_present())
        .build()
        .unwrap()
}

pub fn descriptor_with_relation(
    entity: &str,
    collection_path: &str,
    rank: SyncRank,
    relation: RelationDecl,
) -> SyncDescriptor {
    SyncDescriptor::builder(EntityKind::new(entity).unwrap())
        .collection_path(collection_path)
        .rank(rank)
        .mapping(Arc::new(EchoMapping::with_relations(vec![relation.clone()])))
        .exists_remotely(exists_when_remote_id_present())
        .relation(relation)
        .build()
        .unwrap()
}

pub fn task_snapshot(payload: Value) -> RecordSnapshot {
    snapshot_of("task", payload)
}

pub fn snapshot_of(entity: &str, payload: Value) -> RecordSnapshot {
    RecordSnapshot {
        entity: EntityKind::new(entity).unwrap(),
        local_id: LocalId::new(),
        remote_id: None,
        payload,
        deleted: false,
        modified_at: Utc::now(),
    }
}

// ============================================================================
// MockStore
// ============================================================================

#[derive(Default)]
struct StoreInner {
    records: HashMap<LocalId, RecordSnapshot>,
    /// Dirty handles in insertion order; the bool marks provisional handles
    dirty: Vec<(LocalId, bool)>,
    /// Provisional handle -> durable handle
    provisional: HashMap<LocalId, LocalId>,
    identity_failures: HashSet<LocalId>,
    unavailable: bool,
}

/// In-memory `ILocalStore` test double
#[derive(Default)]
pub struct MockStore {
    inner: Mutex<StoreInner>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record and marks it dirty
    pub fn insert(&self, snapshot: RecordSnapshot) {
        let mut inner = self.lock();
        inner.dirty.push((snapshot.local_id, false));
        inner.records.insert(snapshot.local_id, snapshot);
    }

    /// Inserts a record without marking it dirty (already synced)
    pub fn insert_clean(&self, snapshot: RecordSnapshot) {
        self.lock().records.insert(snapshot.local_id, snapshot);
    }

    /// Inserts a record reachable only through a provisional handle until
    /// `obtain_permanent_id` is called
    pub fn insert_provisional(&self, provisional: LocalId, snapshot: RecordSnapshot) {
        let mut inner = self.lock();
        inner.provisional.insert(provisional, snapshot.local_id);
        inner.dirty.push((provisional, true));
        inner.records.insert(snapshot.local_id, snapshot);
    }

    /// Makes `obtain_permanent_id` fail for the given provisional handle
    pub fn fail_identity_for(&self, provisional: LocalId) {
        self.lock().identity_failures.insert(provisional);
    }

    /// Makes `changed_records` report the store as unavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Marks a record's tombstone, keeping it dirty
    pub fn mark_deleted(&self, local_id: &LocalId) {
        let mut inner = self.lock();
        if let Some(record) = inner.records.get_mut(local_id) {
            record.deleted = true;
            record.modified_at = Utc::now();
        }
        if !inner.dirty.iter().any(|(id, _)| id == local_id) {
            inner.dirty.push((*local_id, false));
        }
    }

    /// Edits a record payload in place, advancing its modification stamp
    pub fn edit(&self, local_id: &LocalId, f: impl FnOnce(&mut Value)) {
        let mut inner = self.lock();
        if let Some(record) = inner.records.get_mut(local_id) {
            f(&mut record.payload);
            record.modified_at = Utc::now();
        }
    }

    pub fn get(&self, local_id: &LocalId) -> Option<RecordSnapshot> {
        self.lock().records.get(local_id).cloned()
    }

    pub fn is_dirty(&self, local_id: &LocalId) -> bool {
        self.lock().dirty.iter().any(|(id, _)| id == local_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ILocalStore for MockStore {
    async fn changed_records(
        &self,
        _since: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<ChangedRecord>, StoreError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::Unavailable("mock store closed".into()));
        }
        let mut changed = Vec::new();
        for (handle, provisional) in &inner.dirty {
            let durable = inner.provisional.get(handle).unwrap_or(handle);
            let Some(record) = inner.records.get(durable) else {
                continue;
            };
            let kind = if record.deleted {
                ChangeKind::Deleted
            } else if record.remote_id.is_none() {
                ChangeKind::Created
            } else {
                ChangeKind::Updated
            };
            changed.push(ChangedRecord {
                entity: record.entity.clone(),
                local_id: *handle,
                kind,
                provisional: *provisional,
            });
        }
        Ok(changed)
    }

    async fn obtain_permanent_id(&self, provisional: &LocalId) -> Result<LocalId, StoreError> {
        let inner = self.lock();
        if inner.identity_failures.contains(provisional) {
            return Err(StoreError::IdentityAssignment(format!(
                "no durable identity for {provisional}"
            )));
        }
        Ok(*inner.provisional.get(provisional).unwrap_or(provisional))
    }

    async fn fetch(&self, local_id: &LocalId) -> Result<Option<RecordSnapshot>, StoreError> {
        Ok(self.lock().records.get(local_id).cloned())
    }

    async fn apply_merge(
        &self,
        local_id: &LocalId,
        fields: &MergedFields,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .records
            .get_mut(local_id)
            .ok_or_else(|| StoreError::Storage(format!("no record {local_id}")))?;
        if let Some(remote_id) = &fields.remote_id {
            record.remote_id = Some(remote_id.clone());
        }
        if let (Value::Object(payload), Value::Object(merged)) =
            (&mut record.payload, &fields.fields)
        {
            for (key, value) in merged {
                payload.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn mark_synced(&self, local_id: &LocalId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let resolved: HashSet<LocalId> = inner
            .provisional
            .iter()
            .filter(|(_, durable)| **durable == *local_id)
            .map(|(provisional, _)| *provisional)
            .collect();
        inner
            .dirty
            .retain(|(id, _)| id != local_id && !resolved.contains(id));
        Ok(())
    }

    async fn remove(&self, local_id: &LocalId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.records.remove(local_id);
        inner.dirty.retain(|(id, _)| id != local_id);
        Ok(())
    }
}

// ============================================================================
// MockTransport
// ============================================================================

#[derive(Default)]
struct TransportInner {
    responses: HashMap<String, VecDeque<Result<SyncResponse, TransportError>>>,
    requests: Vec<SyncRequest>,
}

/// Scripted `ITransport` test double
///
/// Responses are keyed by `"METHOD path"`; unmatched requests answer 404 so
/// a missing stub shows up as a failed operation, never a hang.
#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<TransportInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the given method and path
    pub fn stub(
        &self,
        method: &str,
        path: &str,
        response: Result<SyncResponse, TransportError>,
    ) {
        self.lock()
            .responses
            .entry(format!("{method} {path}"))
            .or_default()
            .push_back(response);
    }

    /// Queues a 2xx JSON response for the given method and path
    pub fn stub_ok(&self, method: &str, path: &str, status: u16, body: Value) {
        self.stub(
            method,
            path,
            Ok(SyncResponse {
                status,
                body: Some(body),
            }),
        );
    }

    /// Returns every request executed so far
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of requests executed so far
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TransportInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ITransport for MockTransport {
    async fn execute(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        let mut inner = self.lock();
        inner.requests.push(request.clone());
        let key = format!("{} {}", request.method, request.path);
        match inner.responses.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(response) => response,
            None => Err(TransportError::Status {
                status: 404,
                message: format!("no stub for {key}"),
            }),
        }
    }
}
