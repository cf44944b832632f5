//! File-backed entity store.
//!
//! Each collection is one JSON file holding an ordered array of documents:
//!
//! ```text
//! <root>/tasks.json
//! <root>/projects/<project>/stages.json
//! ```
//!
//! Writes are read-modify-write under an exclusive sidecar lock and replace
//! the file atomically, so several processes can share one root. Live
//! subscriptions watch the collection's directory and re-read the whole file
//! after each (debounced) change, emitting a full snapshot whenever the
//! filtered contents differ from the last emission.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use ulid::Ulid;

use super::{
    CollectionPath, Document, DocumentPath, EntityStore, Filter, Snapshot, SnapshotStream,
    StoreError, StoreResult, StoredDocument,
};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};

const COLLECTION_EXT: &str = "json";
const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 100;
const WATCH_IDLE_POLL_MS: u64 = 250;

/// Entity store persisted as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    lock_timeout_ms: u64,
    debounce: Duration,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            debounce: Duration::from_millis(DEFAULT_WATCH_DEBOUNCE_MS),
        }
    }

    pub fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Data file backing a collection.
    pub fn collection_file(&self, path: &CollectionPath) -> PathBuf {
        let mut file = self.root.clone();
        for segment in path.segments() {
            file.push(segment);
        }
        file.set_extension(COLLECTION_EXT);
        file
    }

    fn read_collection(&self, path: &CollectionPath) -> StoreResult<Vec<StoredDocument>> {
        let file = self.collection_file(path);
        lock::with_file_locked(&file, self.lock_timeout_ms, read_documents)
            .map_err(StoreError::from)
    }

    /// Read-modify-write of one collection under its lock.
    fn modify_collection<T, F>(&self, path: &CollectionPath, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Vec<StoredDocument>) -> StoreResult<T>,
    {
        let file = self.collection_file(path);
        let outcome = lock::with_file_locked(&file, self.lock_timeout_ms, |file| {
            let mut documents = read_documents(file)?;
            let value = match op(&mut documents) {
                Ok(value) => value,
                Err(err) => return Ok(Err(err)),
            };
            let data = serde_json::to_vec_pretty(&documents)?;
            lock::write_atomic(file, &data)?;
            Ok(Ok(value))
        })
        .map_err(StoreError::from)?;
        outcome
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(FileStore) -> StoreResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|err| StoreError::Unavailable(format!("store worker failed: {err}")))?
    }
}

fn read_documents(file: &Path) -> crate::error::Result<Vec<StoredDocument>> {
    if !file.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(file)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl EntityStore for FileStore {
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        filter: Option<Filter>,
    ) -> StoreResult<SnapshotStream> {
        let collection = path.clone();
        let initial_filter = filter.clone();
        let (initial, file) = self
            .blocking(move |store| {
                let docs = store.read_collection(&collection)?;
                let file = store.collection_file(&collection);
                Ok((Snapshot::from_collection(&docs, initial_filter.as_ref()), file))
            })
            .await?;

        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)
            .map_err(|err| StoreError::Unavailable(format!("{}: {err}", dir.display())))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(initial.clone()));
        spawn_collection_watch(
            self.clone(),
            path.clone(),
            filter,
            dir,
            file.clone(),
            initial,
            tx,
        );
        tracing::debug!(
            collection = %path,
            file = %file.display(),
            "file store subscription opened"
        );
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn update_document(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        let path = path.clone();
        self.blocking(move |store| {
            store.modify_collection(path.collection(), |docs| {
                let doc = docs
                    .iter_mut()
                    .find(|doc| doc.id == path.id())
                    .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                doc.merge(fields);
                Ok(())
            })
        })
        .await
    }

    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        let path = path.clone();
        self.blocking(move |store| {
            let docs = store.read_collection(path.collection())?;
            Ok(docs
                .into_iter()
                .find(|doc| doc.id == path.id())
                .map(|doc| doc.fields))
        })
        .await
    }

    async fn create_document(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> StoreResult<String> {
        let collection = collection.clone();
        self.blocking(move |store| {
            let id = Ulid::new().to_string().to_ascii_lowercase();
            store.modify_collection(&collection, |docs| {
                docs.push(StoredDocument::new(id.clone(), fields));
                Ok(())
            })?;
            Ok(id)
        })
        .await
    }

    async fn delete_document(&self, path: &DocumentPath) -> StoreResult<()> {
        let path = path.clone();
        self.blocking(move |store| {
            store.modify_collection(path.collection(), |docs| {
                let before = docs.len();
                docs.retain(|doc| doc.id != path.id());
                if docs.len() == before {
                    return Err(StoreError::NotFound(path.to_string()));
                }
                Ok(())
            })
        })
        .await
    }
}

impl FileStore {
    /// Insert or replace a document under a caller-chosen id.
    pub async fn put_document(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        let path = path.clone();
        self.blocking(move |store| {
            store.modify_collection(path.collection(), |docs| {
                match docs.iter_mut().find(|doc| doc.id == path.id()) {
                    Some(doc) => doc.fields = fields,
                    None => docs.push(StoredDocument::new(path.id(), fields)),
                }
                Ok(())
            })
        })
        .await
    }
}

fn spawn_collection_watch(
    store: FileStore,
    path: CollectionPath,
    filter: Option<Filter>,
    dir: PathBuf,
    file: PathBuf,
    initial: Snapshot,
    tx: mpsc::UnboundedSender<StoreResult<Snapshot>>,
) {
    thread::spawn(move || {
        let (event_tx, event_rx) = std_mpsc::channel();
        let watcher: notify::Result<RecommendedWatcher> =
            notify::recommended_watcher(move |res| {
                let _ = event_tx.send(res);
            });

        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(err) => {
                let _ = tx.send(Err(StoreError::Unavailable(format!("watch: {err}"))));
                return;
            }
        };
        if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            let _ = tx.send(Err(StoreError::Unavailable(format!("watch: {err}"))));
            return;
        }

        let mut last = initial;
        // Re-read once right away: a write may have landed before the watch began.
        let mut pending: Option<Instant> = Some(Instant::now());
        let idle = Duration::from_millis(WATCH_IDLE_POLL_MS);

        loop {
            if tx.is_closed() {
                break;
            }
            let timeout = pending
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(idle);
            match event_rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    // Lock sidecars and temp files share the directory.
                    let touches_data = event
                        .paths
                        .iter()
                        .any(|changed| changed.file_name() == file.file_name());
                    if touches_data {
                        pending = Some(Instant::now() + store.debounce);
                    }
                }
                Ok(Err(err)) => {
                    if tx
                        .send(Err(StoreError::Unavailable(format!("watch: {err}"))))
                        .is_err()
                    {
                        break;
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    if pending.take().is_none() {
                        continue;
                    }
                    match store.read_collection(&path) {
                        Ok(docs) => {
                            let snapshot = Snapshot::from_collection(&docs, filter.as_ref());
                            if snapshot == last {
                                continue;
                            }
                            last = snapshot.clone();
                            if tx.send(Ok(snapshot)).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            if tx.send(Err(err)).is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!(collection = %path, "file store subscription closed");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fields(value: serde_json::Value) -> Document {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn collection_file_mirrors_path_segments() {
        let store = FileStore::new("/data");
        let path = CollectionPath::parse("projects/p1/stages").unwrap();
        assert_eq!(
            store.collection_file(&path),
            PathBuf::from("/data/projects/p1/stages.json")
        );
    }

    #[tokio::test]
    async fn update_merges_fields_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let path = DocumentPath::parse("tasks/t1").unwrap();
        store
            .put_document(&path, fields(json!({"title": "Ship", "stageId": "backlog"})))
            .await
            .unwrap();
        store
            .update_document(&path, fields(json!({"stageId": "done"})))
            .await
            .unwrap();

        let reopened = FileStore::new(dir.path());
        let doc = reopened.get_document(&path).await.unwrap().unwrap();
        assert_eq!(doc["title"], json!("Ship"));
        assert_eq!(doc["stageId"], json!("done"));
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let path = DocumentPath::parse("tasks/ghost").unwrap();
        let result = store.update_document(&path, Document::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
