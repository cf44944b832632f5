mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stageboard::store::{EntityStore, FileStore, ProjectScope, StoredDocument};
use stageboard::{BoardState, DragController, DragOutcome, DragSettings, StreamMerger};
use support::{displayed_stage, fields, wait_until, PROJECT};
use tempfile::TempDir;

fn store_at(dir: &TempDir) -> FileStore {
    FileStore::new(dir.path()).with_debounce(Duration::from_millis(20))
}

async fn seed(store: &FileStore, scope: &ProjectScope) {
    for stage in ["backlog", "done"] {
        store
            .put_document(
                &scope.stage_document(stage).expect("path"),
                fields(json!({ "title": stage })),
            )
            .await
            .expect("seed stage");
    }
    store
        .put_document(
            &scope.task_document("t1").expect("path"),
            fields(json!({ "projectId": PROJECT, "title": "one", "stageId": "backlog" })),
        )
        .await
        .expect("seed task");
}

#[tokio::test]
async fn collections_are_plain_json_arrays() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir);
    let scope = ProjectScope::new(PROJECT).expect("scope");
    seed(&store, &scope).await;

    let raw = std::fs::read_to_string(dir.path().join("tasks.json")).expect("tasks file");
    let docs: Vec<StoredDocument> = serde_json::from_str(&raw).expect("json array");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "t1");
    assert_eq!(docs[0].fields["stageId"], json!("backlog"));
    assert!(dir
        .path()
        .join("projects")
        .join(PROJECT)
        .join("stages.json")
        .exists());
}

#[tokio::test]
async fn created_documents_get_distinct_ids() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir);
    let scope = ProjectScope::new(PROJECT).expect("scope");

    let a = store
        .create_document(&scope.tasks_collection(), fields(json!({ "title": "a" })))
        .await
        .expect("create a");
    let b = store
        .create_document(&scope.tasks_collection(), fields(json!({ "title": "b" })))
        .await
        .expect("create b");
    assert_ne!(a, b);

    store
        .delete_document(&scope.task_document(&a).expect("path"))
        .await
        .expect("delete");
    assert!(store
        .get_document(&scope.task_document(&a).expect("path"))
        .await
        .expect("read")
        .is_none());
    assert!(store
        .delete_document(&scope.task_document(&a).expect("path"))
        .await
        .is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn writes_from_another_handle_reach_live_boards() {
    let dir = TempDir::new().expect("tempdir");
    let scope = ProjectScope::new(PROJECT).expect("scope");
    seed(&store_at(&dir), &scope).await;

    let sub = StreamMerger::new(Arc::new(store_at(&dir)))
        .subscribe(PROJECT)
        .await
        .expect("subscribe");
    sub.first_board().await.expect("first board");
    let mut rx = sub.watch();

    // A second handle on the same root stands in for another process.
    let other = store_at(&dir);
    other
        .update_document(
            &scope.task_document("t1").expect("path"),
            fields(json!({ "stageId": "done" })),
        )
        .await
        .expect("update");

    let view = wait_until(&mut rx, |view| {
        displayed_stage(view, "t1") == Some(Some("done".to_string()))
    })
    .await;
    assert_eq!(view.board().expect("board").task_count(), 1);
    sub.unsubscribe().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drag_through_file_store_converges() {
    let dir = TempDir::new().expect("tempdir");
    let scope = ProjectScope::new(PROJECT).expect("scope");
    let store = Arc::new(store_at(&dir));
    seed(&store, &scope).await;

    let sub = StreamMerger::new(store.clone())
        .subscribe(PROJECT)
        .await
        .expect("subscribe");
    sub.first_board().await.expect("first board");
    let controller = DragController::for_subscription(store.clone(), &sub, DragSettings::default());

    let outcome = controller.move_task("t1", "done").await.expect("move");
    assert_eq!(outcome, DragOutcome::Committed);

    let mut rx = sub.watch();
    let view = wait_until(&mut rx, |view| {
        matches!(view.state, Some(BoardState::Confirmed(_)))
            && displayed_stage(view, "t1") == Some(Some("done".to_string()))
    })
    .await;
    assert_eq!(view.moves_in_flight, 0);

    let reopened = FileStore::new(dir.path());
    let doc = reopened
        .get_document(&scope.task_document("t1").expect("path"))
        .await
        .expect("read")
        .expect("task");
    assert_eq!(doc["stageId"], json!("done"));
    assert_eq!(doc["title"], json!("one"));
    sub.unsubscribe().await;
}
