//! Entity store client abstraction
//!
//! The board engine talks to its document database through the
//! [`EntityStore`] trait: streaming collection subscriptions, single document
//! reads and partial document updates.
//!
//! Every item a subscription yields is a **full snapshot** of the collection
//! (after filtering), never a delta. Implementations must keep that contract
//! even when the underlying medium only knows about changes.
//!
//! # Layout
//!
//! ```text
//! tasks/<task id>                       # every task, tagged with projectId
//! projects/<project id>/stages/<id>     # stages owned by one project
//! ```

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_stream::Stream;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Weakly typed document body as it lives in the store.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Live stream of full collection snapshots.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = StoreResult<Snapshot>> + Send>>;

pub const TASKS_COLLECTION: &str = "tasks";
pub const PROJECTS_COLLECTION: &str = "projects";
pub const STAGES_COLLECTION: &str = "stages";
pub const PROJECT_ID_FIELD: &str = "projectId";

/// Failures reported by an entity store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

impl From<crate::error::Error> for StoreError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Store(inner) => inner,
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Slash separated path naming a collection (odd number of segments).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments = split_segments(raw)?;
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(format!(
                "'{raw}' names a document, not a collection"
            )));
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Path of the document `id` inside this collection.
    pub fn doc(&self, id: &str) -> StoreResult<DocumentPath> {
        validate_segment(id)?;
        Ok(DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        })
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = StoreError;

    fn try_from(value: String) -> StoreResult<Self> {
        Self::parse(&value)
    }
}

impl From<CollectionPath> for String {
    fn from(value: CollectionPath) -> Self {
        value.0
    }
}

/// Path naming a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments = split_segments(raw)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(format!(
                "'{raw}' names a collection, not a document"
            )));
        }
        let (id, collection) = segments
            .split_last()
            .ok_or_else(|| StoreError::InvalidPath(raw.to_string()))?;
        Ok(Self {
            collection: CollectionPath(collection.join("/")),
            id: id.to_string(),
        })
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

fn split_segments(raw: &str) -> StoreResult<Vec<&str>> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath("path cannot be empty".to_string()));
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    for segment in &segments {
        validate_segment(segment)?;
    }
    Ok(segments)
}

fn validate_segment(segment: &str) -> StoreResult<()> {
    if segment.is_empty() {
        return Err(StoreError::InvalidPath("empty path segment".to_string()));
    }
    if segment.contains('/') || segment == "." || segment == ".." {
        return Err(StoreError::InvalidPath(format!(
            "invalid path segment '{segment}'"
        )));
    }
    Ok(())
}

/// Equality filter applied to collection subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: serde_json::Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Document) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// A document together with its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    #[serde(default)]
    pub fields: Document,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, fields: Document) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Shallow merge of `patch` into this document: last write wins per field.
    pub fn merge(&mut self, patch: Document) {
        for (key, value) in patch {
            self.fields.insert(key, value);
        }
    }
}

/// Complete contents of a (filtered) collection at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<StoredDocument>,
}

impl Snapshot {
    /// Build a snapshot from a collection, keeping store order.
    pub fn from_collection(documents: &[StoredDocument], filter: Option<&Filter>) -> Self {
        let documents = documents
            .iter()
            .filter(|doc| filter.map(|f| f.matches(&doc.fields)).unwrap_or(true))
            .cloned()
            .collect();
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Streaming document store consumed by the board engine.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Subscribe to a collection. The first item is the current snapshot;
    /// every later item is the full snapshot after a change.
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        filter: Option<Filter>,
    ) -> StoreResult<SnapshotStream>;

    /// Merge `fields` into an existing document.
    async fn update_document(&self, path: &DocumentPath, fields: Document) -> StoreResult<()>;

    /// Read one document, `None` if absent.
    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<Document>>;

    /// Create a document with a store-assigned id.
    async fn create_document(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> StoreResult<String>;

    /// Remove a document; removing a missing document is an error.
    async fn delete_document(&self, path: &DocumentPath) -> StoreResult<()>;
}

/// Store locations for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectScope {
    project_id: String,
}

impl ProjectScope {
    pub fn new(project_id: &str) -> crate::error::Result<Self> {
        let trimmed = project_id.trim();
        if trimmed.is_empty() {
            return Err(crate::error::Error::InvalidArgument(
                "project id cannot be empty".to_string(),
            ));
        }
        validate_segment(trimmed).map_err(|err| {
            crate::error::Error::InvalidArgument(format!("project id '{trimmed}': {err}"))
        })?;
        Ok(Self {
            project_id: trimmed.to_string(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn tasks_collection(&self) -> CollectionPath {
        CollectionPath(TASKS_COLLECTION.to_string())
    }

    pub fn tasks_filter(&self) -> Filter {
        Filter::eq(PROJECT_ID_FIELD, self.project_id.clone())
    }

    pub fn stages_collection(&self) -> CollectionPath {
        CollectionPath(format!(
            "{PROJECTS_COLLECTION}/{}/{STAGES_COLLECTION}",
            self.project_id
        ))
    }

    pub fn task_document(&self, task_id: &str) -> StoreResult<DocumentPath> {
        self.tasks_collection().doc(task_id)
    }

    pub fn stage_document(&self, stage_id: &str) -> StoreResult<DocumentPath> {
        self.stages_collection().doc(stage_id)
    }
}
