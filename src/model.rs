//! Task and stage records, decoded from store documents.
//!
//! Documents arrive as loose JSON maps. Decoding happens once at the store
//! boundary with explicit defaults, so the rest of the engine only sees the
//! strict types below:
//!
//! - `stageId` missing, empty or not a string: unassigned
//! - `completed` missing or not a bool: `false`
//! - `dueDate` must be `YYYY-MM-DD` or RFC 3339, anything else is dropped
//! - a task without a title is skipped (logged), the rest of the snapshot
//!   is kept
//! - a stage without a title is labelled with its id

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::{Document, Snapshot, StoredDocument, PROJECT_ID_FIELD};

pub const TITLE_FIELD: &str = "title";
pub const DESCRIPTION_FIELD: &str = "description";
pub const DUE_DATE_FIELD: &str = "dueDate";
pub const STAGE_ID_FIELD: &str = "stageId";
pub const COMPLETED_FIELD: &str = "completed";

/// Drop target that means "no stage".
pub const UNASSIGNED_TARGET: &str = "unassigned";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("document {id}: missing or empty '{field}'")]
    MissingField { id: String, field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub stage_id: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            due_date: None,
            stage_id: None,
            completed: false,
        }
    }

    pub fn in_stage(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }

    pub fn decode(doc: &StoredDocument) -> Result<Self, DecodeError> {
        let title = non_empty_str(&doc.fields, TITLE_FIELD).ok_or_else(|| {
            DecodeError::MissingField {
                id: doc.id.clone(),
                field: TITLE_FIELD,
            }
        })?;
        Ok(Self {
            id: doc.id.clone(),
            title: title.to_string(),
            description: non_empty_str(&doc.fields, DESCRIPTION_FIELD).map(str::to_string),
            due_date: doc.fields.get(DUE_DATE_FIELD).and_then(parse_due_date),
            stage_id: non_empty_str(&doc.fields, STAGE_ID_FIELD).map(str::to_string),
            completed: doc
                .fields
                .get(COMPLETED_FIELD)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Fields for a new task document owned by `project_id`.
    pub fn to_document(&self, project_id: &str) -> Document {
        let mut fields = Document::new();
        fields.insert(PROJECT_ID_FIELD.to_string(), Value::from(project_id));
        fields.insert(TITLE_FIELD.to_string(), Value::from(self.title.clone()));
        if let Some(description) = &self.description {
            fields.insert(
                DESCRIPTION_FIELD.to_string(),
                Value::from(description.clone()),
            );
        }
        if let Some(due) = self.due_date {
            fields.insert(
                DUE_DATE_FIELD.to_string(),
                Value::from(due.format("%Y-%m-%d").to_string()),
            );
        }
        fields.insert(STAGE_ID_FIELD.to_string(), stage_value(self.stage_id.as_deref()));
        fields.insert(COMPLETED_FIELD.to_string(), Value::from(self.completed));
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub title: String,
}

impl Stage {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    pub fn decode(doc: &StoredDocument) -> Self {
        let title = non_empty_str(&doc.fields, TITLE_FIELD).unwrap_or(doc.id.as_str());
        Self {
            id: doc.id.clone(),
            title: title.to_string(),
        }
    }

    pub fn to_document(&self) -> Document {
        let mut fields = Document::new();
        fields.insert(TITLE_FIELD.to_string(), Value::from(self.title.clone()));
        fields
    }
}

/// Decode a task snapshot, skipping documents that cannot be tasks.
pub fn decode_tasks(snapshot: &Snapshot) -> Vec<Task> {
    snapshot
        .documents
        .iter()
        .filter_map(|doc| match Task::decode(doc) {
            Ok(task) => Some(task),
            Err(err) => {
                tracing::warn!(%err, "skipping undecodable task document");
                None
            }
        })
        .collect()
}

pub fn decode_stages(snapshot: &Snapshot) -> Vec<Stage> {
    snapshot.documents.iter().map(Stage::decode).collect()
}

/// Normalize a drop target: `"unassigned"` (any case) or blank means no stage.
pub fn normalize_target(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNASSIGNED_TARGET) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Store value for a stage reference.
pub fn stage_value(stage_id: Option<&str>) -> Value {
    match stage_id {
        Some(id) => Value::from(id),
        None => Value::Null,
    }
}

/// A finished drag gesture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DragOperation {
    pub task_id: String,
    /// Stage the task was in when the drag started.
    pub source_stage_id: Option<String>,
    pub target_stage_id: Option<String>,
}

impl DragOperation {
    pub fn new(
        task_id: impl Into<String>,
        source_stage_id: Option<String>,
        drop_target: &str,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            source_stage_id,
            target_stage_id: normalize_target(drop_target),
        }
    }

    /// Capture the source from the task as it looked when the drag started.
    pub fn from_drag_start(task: &Task, drop_target: &str) -> Self {
        Self::new(task.id.clone(), task.stage_id.clone(), drop_target)
    }

    pub fn is_noop(&self) -> bool {
        self.source_stage_id == self.target_stage_id
    }
}

fn non_empty_str<'a>(fields: &'a Document, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_due_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|timestamp| timestamp.date_naive())
}
