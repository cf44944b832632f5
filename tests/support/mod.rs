#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use stageboard::store::{
    CollectionPath, Document, DocumentPath, EntityStore, Filter, MemoryStore, ProjectScope,
    SnapshotStream, StoreError, StoreResult,
};
use stageboard::{BoardView, DragController, DragSettings, StreamMerger, Subscription};
use tokio::sync::watch;

pub const PROJECT: &str = "p1";

pub fn fields(value: Value) -> Document {
    value.as_object().cloned().expect("object")
}

/// A memory store seeded with one project's stages and tasks.
pub struct BoardFixture {
    pub store: MemoryStore,
    pub scope: ProjectScope,
}

impl BoardFixture {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            scope: ProjectScope::new(PROJECT).expect("scope"),
        }
    }

    pub fn stage(&self, id: &str) -> &Self {
        self.store.put_document(
            &self.scope.stage_document(id).expect("stage path"),
            fields(json!({ "title": id })),
        );
        self
    }

    pub fn task(&self, id: &str, stage: Option<&str>) -> &Self {
        self.task_in_project(id, PROJECT, stage)
    }

    pub fn task_in_project(&self, id: &str, project: &str, stage: Option<&str>) -> &Self {
        self.store.put_document(
            &self.scope.task_document(id).expect("task path"),
            fields(json!({ "projectId": project, "title": id, "stageId": stage })),
        );
        self
    }

    pub fn shared(&self) -> Arc<dyn EntityStore> {
        Arc::new(self.store.clone())
    }

    /// Subscribe and wait for the first board.
    pub async fn subscribe(&self) -> Subscription {
        let subscription = StreamMerger::new(self.shared())
            .subscribe(PROJECT)
            .await
            .expect("subscribe");
        subscription.first_board().await.expect("first board");
        subscription
    }

    pub fn controller(
        &self,
        subscription: &Subscription,
        settings: DragSettings,
    ) -> Arc<DragController> {
        Arc::new(DragController::for_subscription(
            self.shared(),
            subscription,
            settings,
        ))
    }
}

/// Stage id of `task_id` on the displayed board; `None` means unassigned.
pub fn displayed_stage(view: &BoardView, task_id: &str) -> Option<Option<String>> {
    view.placement(task_id)
        .map(|placement| placement.stage_id().map(str::to_string))
}

/// Wait for a view matching `pred`, failing the test after five seconds.
pub async fn wait_until<F>(rx: &mut watch::Receiver<BoardView>, pred: F) -> BoardView
where
    F: FnMut(&BoardView) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for board")
        .expect("view model dropped")
        .clone()
}

/// Store whose subscriptions are always refused.
pub struct RefusingStore;

#[async_trait]
impl EntityStore for RefusingStore {
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        _filter: Option<Filter>,
    ) -> StoreResult<SnapshotStream> {
        Err(StoreError::PermissionDenied(path.to_string()))
    }

    async fn update_document(&self, path: &DocumentPath, _fields: Document) -> StoreResult<()> {
        Err(StoreError::PermissionDenied(path.to_string()))
    }

    async fn get_document(&self, _path: &DocumentPath) -> StoreResult<Option<Document>> {
        Ok(None)
    }

    async fn create_document(
        &self,
        collection: &CollectionPath,
        _fields: Document,
    ) -> StoreResult<String> {
        Err(StoreError::PermissionDenied(collection.to_string()))
    }

    async fn delete_document(&self, path: &DocumentPath) -> StoreResult<()> {
        Err(StoreError::PermissionDenied(path.to_string()))
    }
}
