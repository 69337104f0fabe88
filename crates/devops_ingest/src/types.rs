//! Core records shared across the pipeline: what comes back from the remote,
//! and what the connector emits.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Source tag prefixed to every document id.
pub const SOURCE_PREFIX: &str = "azuredevops";

/// Inclusive `[start, end]` sync window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// From epoch seconds, as callers usually hold them.
    #[must_use]
    pub fn from_epoch_seconds(start: i64, end: i64) -> Option<Self> {
        Some(Self {
            start: DateTime::from_timestamp(start, 0)?,
            end: DateTime::from_timestamp(end, 0)?,
        })
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Minimal handle returned by the query stage. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordReference {
    pub id: u64,
    #[serde(default)]
    pub url: Option<String>,
}

/// A work item as returned by the batch detail endpoint.
///
/// `fields` holds exactly the fields the remote returned: essential fields plus
/// whichever optional fields the project has. Missing optional fields are
/// absent keys, never placeholders.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRecord {
    pub id: u64,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, rename = "_links")]
    pub links: Option<Value>,
}

impl RawRecord {
    pub fn new(id: u64, fields: Map<String, Value>) -> Self {
        Self {
            id,
            fields,
            links: None,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Field rendered as text. Empty strings count as absent.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        match self.field(name)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Copy in fields from `other` without overwriting ones already present.
    pub fn merge_fields(&mut self, other: RawRecord) {
        for (name, value) in other.fields {
            self.fields.entry(name).or_insert(value);
        }
        if self.links.is_none() {
            self.links = other.links;
        }
    }
}

/// One text section of a document, with the link it should cite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSection {
    pub text: String,
    pub link: Option<String>,
}

/// A person attached to a record (creator, assignee, author).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Owner {
    /// From an identity reference (`{displayName, uniqueName}`), if it names anyone.
    #[must_use]
    pub fn from_identity(value: &Value) -> Option<Self> {
        let display_name = value
            .get("displayName")
            .and_then(Value::as_str)
            .map(str::to_string);
        let email = value
            .get("uniqueName")
            .or_else(|| value.get("emailAddress"))
            .or_else(|| value.get("email"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if display_name.is_none() && email.is_none() {
            return None;
        }
        Some(Self {
            display_name,
            email,
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Unknown")
    }
}

/// Canonical output of the connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable id derived from (source, organization, project, record type, record id).
    pub id: String,
    pub title: String,
    pub semantic_identifier: String,
    pub sections: Vec<TextSection>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub owners: Vec<Owner>,
    pub source_link: String,
}

/// Id-only document used for pruning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlimDocument {
    pub id: String,
}

/// One record that could not be turned into a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub document_link: Option<String>,
}

/// A whole stream or page that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailedItem {
    Document(DocumentFailure),
    Entity(EntityFailure),
}

/// A recoverable failure reported in-stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorFailure {
    pub failed: FailedItem,
    pub message: String,
}

impl ConnectorFailure {
    pub fn document(
        document_id: impl Into<String>,
        document_link: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            failed: FailedItem::Document(DocumentFailure {
                document_id: document_id.into(),
                document_link,
            }),
            message: message.into(),
        }
    }

    pub fn entity(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failed: FailedItem::Entity(EntityFailure {
                entity_id: entity_id.into(),
            }),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_entity(&self) -> bool {
        matches!(self.failed, FailedItem::Entity(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_record_deserializes_api_shape() {
        let record: RawRecord = serde_json::from_value(json!({
            "id": 7,
            "rev": 3,
            "fields": {"System.Title": "Crash", "System.Description": ""},
            "_links": {"html": {"href": "https://x"}}
        }))
        .expect("parse");

        assert_eq!(record.id, 7);
        assert_eq!(record.text("System.Title").as_deref(), Some("Crash"));
        assert_eq!(record.text("System.Description"), None);
        assert!(record.links.is_some());
    }

    #[test]
    fn test_merge_keeps_existing_fields() {
        let mut base = RawRecord::new(
            1,
            json!({"System.Title": "a"}).as_object().cloned().unwrap_or_default(),
        );
        let extra = RawRecord::new(
            1,
            json!({"System.Title": "b", "System.AreaPath": "P\\Team"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
        base.merge_fields(extra);
        assert_eq!(base.text("System.Title").as_deref(), Some("a"));
        assert_eq!(base.text("System.AreaPath").as_deref(), Some("P\\Team"));
    }

    #[test]
    fn test_owner_from_identity() {
        let owner = Owner::from_identity(&json!({"displayName": "Ada", "uniqueName": "ada@x.io"}))
            .expect("owner");
        assert_eq!(owner.label(), "Ada");
        assert_eq!(owner.email.as_deref(), Some("ada@x.io"));
        assert!(Owner::from_identity(&json!({"id": "123"})).is_none());
    }

    #[test]
    fn test_failure_constructors() {
        let doc = ConnectorFailure::document("azuredevops:o/p/workitem/1", None, "bad date");
        assert!(!doc.is_entity());
        let entity = ConnectorFailure::entity("azure_devops_work_items", "query failed");
        assert!(entity.is_entity());
        let encoded = serde_json::to_value(&entity).expect("serialize");
        assert_eq!(encoded["failed"]["kind"], "entity");
    }

    #[test]
    fn test_window_is_inclusive() {
        let window = TimeWindow::from_epoch_seconds(100, 200).expect("window");
        assert!(window.contains(window.start));
        assert!(window.contains(window.end));
        assert!(!window.contains(window.end + chrono::Duration::seconds(1)));
    }
}
