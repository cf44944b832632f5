//! Stream merger: joins the task and stage subscriptions into one board.
//!
//! One spawned task owns the latest snapshot of each collection and selects
//! over both streams, so every recomputation reads a consistent pair. The
//! board is recomputed from scratch on every emission and handed to the
//! [`BoardViewModel`].

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::board::Board;
use crate::error::{Error, Result};
use crate::model::{decode_stages, decode_tasks, Stage, Task};
use crate::store::{EntityStore, ProjectScope, Snapshot, SnapshotStream, StoreResult};
use crate::view_model::{BoardStatus, BoardView, BoardViewModel};

/// Opens board subscriptions against one store.
#[derive(Clone)]
pub struct StreamMerger {
    store: Arc<dyn EntityStore>,
}

impl StreamMerger {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Subscribe to the board of `project_id`.
    ///
    /// A store that refuses either subscription yields a subscription whose
    /// view is `Unavailable`; only a malformed project id is an error.
    pub async fn subscribe(&self, project_id: &str) -> Result<Subscription> {
        let scope = ProjectScope::new(project_id)?;
        let id = Uuid::new_v4();
        let view = Arc::new(BoardViewModel::new());

        let tasks = self
            .store
            .subscribe_collection(&scope.tasks_collection(), Some(scope.tasks_filter()))
            .await;
        let stages = self
            .store
            .subscribe_collection(&scope.stages_collection(), None)
            .await;

        let handle = match (tasks, stages) {
            (Ok(tasks), Ok(stages)) => {
                tracing::debug!(
                    subscription = %id,
                    project = scope.project_id(),
                    "board subscription opened"
                );
                Some(tokio::spawn(run_merge(id, view.clone(), tasks, stages)))
            }
            (Err(err), _) => {
                tracing::warn!(subscription = %id, %err, "task subscription refused");
                view.mark_unavailable(format!("task stream: {err}"));
                None
            }
            (_, Err(err)) => {
                tracing::warn!(subscription = %id, %err, "stage subscription refused");
                view.mark_unavailable(format!("stage stream: {err}"));
                None
            }
        };

        Ok(Subscription {
            id,
            scope,
            view,
            handle,
        })
    }
}

/// A live board subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    scope: ProjectScope,
    view: Arc<BoardViewModel>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> &ProjectScope {
        &self.scope
    }

    pub fn view(&self) -> &Arc<BoardViewModel> {
        &self.view
    }

    pub fn watch(&self) -> watch::Receiver<BoardView> {
        self.view.watch()
    }

    /// Wait until the first board is computed or the subscription fails.
    pub async fn first_board(&self) -> Result<Board> {
        let mut rx = self.view.watch();
        let view = rx
            .wait_for(|view| view.status != BoardStatus::Loading)
            .await
            .map_err(|_| Error::BoardUnavailable("board subscription closed".to_string()))?
            .clone();
        match view.status {
            BoardStatus::Unavailable { reason } => Err(Error::BoardUnavailable(reason)),
            _ => view
                .board()
                .cloned()
                .ok_or_else(|| Error::BoardUnavailable("no board computed".to_string())),
        }
    }

    /// Stop both store subscriptions and detach the view model.
    ///
    /// Returns once the merge task has released its streams.
    pub async fn unsubscribe(mut self) {
        if let Some(handle) = self.stop() {
            let _ = handle.await;
        }
    }

    fn stop(&mut self) -> Option<JoinHandle<()>> {
        self.view.detach();
        let handle = self.handle.take()?;
        handle.abort();
        tracing::debug!(subscription = %self.id, "board subscription closed");
        Some(handle)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Emission {
    Tasks(Option<StoreResult<Snapshot>>),
    Stages(Option<StoreResult<Snapshot>>),
}

/// Health and latest decoded contents of one collection stream.
struct Feed<T> {
    name: &'static str,
    latest: Option<Vec<T>>,
    healthy: bool,
    open: bool,
}

impl<T> Feed<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            latest: None,
            healthy: true,
            open: true,
        }
    }

    /// Record one stream item. Returns the reason when the feed just failed.
    fn accept(
        &mut self,
        item: Option<StoreResult<Snapshot>>,
        decode: impl FnOnce(&Snapshot) -> Vec<T>,
    ) -> Option<String> {
        match item {
            Some(Ok(snapshot)) => {
                self.latest = Some(decode(&snapshot));
                self.healthy = true;
                None
            }
            Some(Err(err)) => {
                self.healthy = false;
                Some(format!("{} stream: {err}", self.name))
            }
            None => {
                self.healthy = false;
                self.open = false;
                Some(format!("{} stream disconnected", self.name))
            }
        }
    }

    fn current(&self) -> Option<&[T]> {
        if !self.healthy {
            return None;
        }
        self.latest.as_deref()
    }
}

async fn run_merge(
    id: Uuid,
    view: Arc<BoardViewModel>,
    mut task_stream: SnapshotStream,
    mut stage_stream: SnapshotStream,
) {
    let mut tasks: Feed<Task> = Feed::new("task");
    let mut stages: Feed<Stage> = Feed::new("stage");

    loop {
        let emission = tokio::select! {
            item = task_stream.next(), if tasks.open => Emission::Tasks(item),
            item = stage_stream.next(), if stages.open => Emission::Stages(item),
            else => break,
        };

        let failure = match emission {
            Emission::Tasks(item) => tasks.accept(item, decode_tasks),
            Emission::Stages(item) => stages.accept(item, decode_stages),
        };
        if let Some(reason) = failure {
            tracing::warn!(subscription = %id, %reason, "board unavailable");
            if !view.mark_unavailable(reason) {
                break;
            }
            continue;
        }

        let (Some(task_set), Some(stage_set)) = (tasks.current(), stages.current()) else {
            continue;
        };
        let board = Board::compute(task_set, stage_set);
        tracing::debug!(
            subscription = %id,
            tasks = board.task_count(),
            columns = board.columns.len(),
            unassigned = board.unassigned_tasks.len(),
            "board recomputed"
        );
        if !view.apply_confirmed(board) {
            break;
        }
    }
    tracing::debug!(subscription = %id, "merge loop finished");
}
