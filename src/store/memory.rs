//! In-process entity store.
//!
//! Keeps every collection in memory, fans full snapshots out to subscribers
//! after each write and applies last-write-wins per document. It also carries
//! the knobs tests need to exercise the board engine's failure paths: queued
//! write failures, a gate that holds writes in flight, stream errors and
//! forced disconnects.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use ulid::Ulid;

use super::{
    CollectionPath, Document, DocumentPath, EntityStore, Filter, Snapshot, SnapshotStream,
    StoreError, StoreResult, StoredDocument,
};

/// A write as the store received it, before it was applied or rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub path: DocumentPath,
    pub fields: Document,
}

struct Subscriber {
    path: CollectionPath,
    filter: Option<Filter>,
    tx: mpsc::UnboundedSender<StoreResult<Snapshot>>,
}

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<CollectionPath, Vec<StoredDocument>>,
    subscribers: Vec<Subscriber>,
    update_failures: VecDeque<StoreError>,
    writes: Vec<WriteRecord>,
}

impl MemoryState {
    fn publish(&mut self, path: &CollectionPath) {
        let documents = self.collections.get(path).cloned().unwrap_or_default();
        self.subscribers.retain(|sub| {
            if &sub.path != path {
                return !sub.tx.is_closed();
            }
            let snapshot = Snapshot::from_collection(&documents, sub.filter.as_ref());
            sub.tx.send(Ok(snapshot)).is_ok()
        });
    }
}

/// Shared in-memory store; clones observe the same data.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    writes_paused: Arc<watch::Sender<bool>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            writes_paused: Arc::new(tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a document under a caller-chosen id.
    pub fn put_document(&self, path: &DocumentPath, fields: Document) {
        let mut state = self.lock();
        let docs = state
            .collections
            .entry(path.collection().clone())
            .or_default();
        match docs.iter_mut().find(|doc| doc.id == path.id()) {
            Some(doc) => doc.fields = fields,
            None => docs.push(StoredDocument::new(path.id(), fields)),
        }
        state.publish(path.collection());
    }

    /// Queue a failure for the next `update_document` call.
    pub fn fail_next_update(&self, err: StoreError) {
        self.lock().update_failures.push_back(err);
    }

    /// Hold every subsequent write in flight until [`resume_writes`].
    ///
    /// [`resume_writes`]: MemoryStore::resume_writes
    pub fn pause_writes(&self) {
        self.writes_paused.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.writes_paused.send_replace(false);
    }

    /// Every update the store has received, in arrival order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Push an error to every live subscription on `path`.
    pub fn fail_subscriptions(&self, path: &CollectionPath, err: StoreError) {
        let mut state = self.lock();
        state.subscribers.retain(|sub| {
            if &sub.path != path {
                return true;
            }
            sub.tx.send(Err(err.clone())).is_ok()
        });
    }

    /// Close every subscription on `path`, ending their streams.
    pub fn disconnect(&self, path: &CollectionPath) {
        self.lock().subscribers.retain(|sub| &sub.path != path);
    }

    /// Number of subscriptions on `path` whose consumer is still listening.
    pub fn live_subscriptions(&self, path: &CollectionPath) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|sub| &sub.path == path && !sub.tx.is_closed())
            .count()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        filter: Option<Filter>,
    ) -> StoreResult<SnapshotStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let initial = state
            .collections
            .get(path)
            .map(|docs| Snapshot::from_collection(docs, filter.as_ref()))
            .unwrap_or_default();
        // The receiver is alive, so this send cannot fail.
        let _ = tx.send(Ok(initial));
        state.subscribers.push(Subscriber {
            path: path.clone(),
            filter,
            tx,
        });
        tracing::debug!(collection = %path, "memory store subscription opened");
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn update_document(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        self.lock().writes.push(WriteRecord {
            path: path.clone(),
            fields: fields.clone(),
        });

        let mut paused = self.writes_paused.subscribe();
        let resumed = paused.wait_for(|paused| !*paused).await.is_ok();
        if !resumed {
            return Err(StoreError::Unavailable("store shut down".to_string()));
        }

        let mut state = self.lock();
        if let Some(err) = state.update_failures.pop_front() {
            return Err(err);
        }
        let doc = state
            .collections
            .get_mut(path.collection())
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == path.id()))
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        doc.merge(fields);
        state.publish(path.collection());
        Ok(())
    }

    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        Ok(self
            .lock()
            .collections
            .get(path.collection())
            .and_then(|docs| docs.iter().find(|doc| doc.id == path.id()))
            .map(|doc| doc.fields.clone()))
    }

    async fn create_document(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> StoreResult<String> {
        let id = Ulid::new().to_string().to_ascii_lowercase();
        self.put_document(&collection.doc(&id)?, fields);
        Ok(id)
    }

    async fn delete_document(&self, path: &DocumentPath) -> StoreResult<()> {
        let mut state = self.lock();
        let docs = state
            .collections
            .get_mut(path.collection())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        let before = docs.len();
        docs.retain(|doc| doc.id != path.id());
        if docs.len() == before {
            return Err(StoreError::NotFound(path.to_string()));
        }
        state.publish(path.collection());
        Ok(())
    }
}
