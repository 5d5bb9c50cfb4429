//! Declarative JSON field mapping
//!
//! [`FieldMapping`] is the reference [`IRemoteMapping`] implementation:
//! attributes are renamed between local and remote field names, declared
//! relations are emitted under their remote keys from the resolved remote
//! identifiers, and the assigned identifier is read back from a configured
//! response key (string or numeric).
//!
//! Mappings are plain data and serializable, so a host application can ship
//! them in configuration instead of code.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use objsync_core::domain::newtypes::RemoteId;
use objsync_core::domain::record::{MergedFields, RecordSnapshot};
use objsync_core::ports::mapping::{IRemoteMapping, MappingError, ResolvedRelations};

/// One attribute translated between local and remote field names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePair {
    /// Field name in the local record payload
    pub local: String,
    /// Field name on the wire
    pub remote: String,
}

/// One relation emitted under its remote key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationKey {
    /// Local payload field holding the referenced record's local handle
    pub local_field: String,
    /// Wire key carrying the referenced record's remote identifier
    pub remote_key: String,
}

/// Declarative local/remote field translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Response key carrying the assigned remote identifier
    id_key: String,
    /// Translated attributes
    attributes: Vec<AttributePair>,
    /// Relation keys
    relations: Vec<RelationKey>,
}

impl FieldMapping {
    /// Creates a mapping that reads the remote identifier from `id_key`
    pub fn new(id_key: impl Into<String>) -> Self {
        Self {
            id_key: id_key.into(),
            attributes: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declares an attribute translated between different field names
    pub fn attribute(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.attributes.push(AttributePair {
            local: local.into(),
            remote: remote.into(),
        });
        self
    }

    /// Declares an attribute with the same name on both sides
    pub fn field(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.attribute(name.clone(), name)
    }

    /// Declares a relation emitted under `remote_key`
    pub fn relation(
        mut self,
        local_field: impl Into<String>,
        remote_key: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationKey {
            local_field: local_field.into(),
            remote_key: remote_key.into(),
        });
        self
    }
}

impl IRemoteMapping for FieldMapping {
    fn request_body(
        &self,
        record: &RecordSnapshot,
        relations: &ResolvedRelations,
    ) -> Result<Value, MappingError> {
        let payload = record
            .payload
            .as_object()
            .ok_or_else(|| MappingError::Malformed("record payload is not an object".into()))?;

        let mut body = Map::new();
        for attr in &self.attributes {
            if let Some(value) = payload.get(&attr.local) {
                body.insert(attr.remote.clone(), value.clone());
            }
        }
        for relation in &self.relations {
            if let Some(remote_id) = relations.get(&relation.local_field) {
                body.insert(
                    relation.remote_key.clone(),
                    Value::String(remote_id.as_str().to_string()),
                );
            }
        }
        Ok(Value::Object(body))
    }

    fn merge_fields(&self, body: &Value) -> Result<MergedFields, MappingError> {
        let map = body
            .as_object()
            .ok_or_else(|| MappingError::Malformed("response body is not an object".into()))?;

        let remote_id = match map.get(&self.id_key) {
            Some(Value::String(s)) => Some(
                RemoteId::new(s.clone()).map_err(|e| MappingError::Malformed(e.to_string()))?,
            ),
            Some(Value::Number(n)) => Some(
                RemoteId::new(n.to_string()).map_err(|e| MappingError::Malformed(e.to_string()))?,
            ),
            Some(other) => {
                return Err(MappingError::Malformed(format!(
                    "identifier key '{}' holds neither string nor number: {other}",
                    self.id_key
                )))
            }
            None => None,
        };

        let mut fields = Map::new();
        for attr in &self.attributes {
            if let Some(value) = map.get(&attr.remote) {
                fields.insert(attr.local.clone(), value.clone());
            }
        }

        Ok(MergedFields {
            remote_id,
            fields: Value::Object(fields),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use objsync_core::domain::newtypes::{EntityKind, LocalId};
    use serde_json::json;

    fn task_mapping() -> FieldMapping {
        FieldMapping::new("id")
            .field("name")
            .attribute("due_at", "due_date")
    }

    fn reminder_mapping() -> FieldMapping {
        FieldMapping::new("id")
            .field("remind_at")
            .relation("task", "task_id")
    }

    fn record(entity: &str, payload: Value) -> RecordSnapshot {
        RecordSnapshot {
            entity: EntityKind::new(entity).unwrap(),
            local_id: LocalId::new(),
            remote_id: None,
            payload,
            deleted: false,
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn test_request_body_renames_attributes() {
        let mapping = task_mapping();
        let record = record(
            "task",
            json!({ "name": "file taxes", "due_at": "2026-04-15", "internal": true }),
        );

        let body = mapping
            .request_body(&record, &ResolvedRelations::new())
            .unwrap();

        assert_eq!(body, json!({ "name": "file taxes", "due_date": "2026-04-15" }));
    }

    #[test]
    fn test_request_body_emits_resolved_relations() {
        let mapping = reminder_mapping();
        let parent = LocalId::new();
        let record = record(
            "reminder",
            json!({ "remind_at": "2026-04-01T09:00:00Z", "task": parent.to_string() }),
        );

        let mut relations = ResolvedRelations::new();
        relations.insert("task".to_string(), RemoteId::new("100").unwrap());

        let body = mapping.request_body(&record, &relations).unwrap();
        assert_eq!(body["task_id"], json!("100"));
        // The local handle never reaches the wire
        assert!(body.get("task").is_none());
    }

    #[test]
    fn test_request_body_rejects_non_object_payload() {
        let mapping = task_mapping();
        let record = record("task", json!("scalar"));
        assert!(matches!(
            mapping.request_body(&record, &ResolvedRelations::new()),
            Err(MappingError::Malformed(_))
        ));
    }

    #[test]
    fn test_merge_fields_extracts_string_id() {
        let merged = task_mapping()
            .merge_fields(&json!({ "id": "abc", "name": "synced" }))
            .unwrap();
        assert_eq!(merged.remote_id.unwrap().as_str(), "abc");
        assert_eq!(merged.fields, json!({ "name": "synced" }));
    }

    #[test]
    fn test_merge_fields_extracts_numeric_id() {
        let merged = task_mapping().merge_fields(&json!({ "id": 42 })).unwrap();
        assert_eq!(merged.remote_id.unwrap().as_str(), "42");
    }

    #[test]
    fn test_merge_fields_maps_remote_names_back() {
        let merged = task_mapping()
            .merge_fields(&json!({ "id": 1, "due_date": "2026-04-15" }))
            .unwrap();
        assert_eq!(merged.fields, json!({ "due_at": "2026-04-15" }));
    }

    #[test]
    fn test_merge_fields_without_id() {
        let merged = task_mapping()
            .merge_fields(&json!({ "name": "no id here" }))
            .unwrap();
        assert!(merged.remote_id.is_none());
    }

    #[test]
    fn test_merge_fields_rejects_bad_id_shape() {
        assert!(matches!(
            task_mapping().merge_fields(&json!({ "id": [1, 2] })),
            Err(MappingError::Malformed(_))
        ));
        assert!(matches!(
            task_mapping().merge_fields(&json!([])),
            Err(MappingError::Malformed(_))
        ));
    }

    #[test]
    fn test_mapping_serialization_roundtrip() {
        let mapping = reminder_mapping();
        let yaml_like = serde_json::to_string(&mapping).unwrap();
        let back: FieldMapping = serde_json::from_str(&yaml_like).unwrap();
        assert_eq!(mapping, back);
    }
}
