//! Drag transition controller: optimistic moves with rollback.
//!
//! A finished drag is applied to the view model first, then persisted with a
//! single `stageId` write. Success needs no follow-up because the next store
//! emission confirms the move; failure (rejection or timeout) withdraws the
//! optimistic move. Nothing is retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::board::Placement;
use crate::error::{Error, Result};
use crate::merger::Subscription;
use crate::model::{stage_value, DragOperation, STAGE_ID_FIELD};
use crate::store::{Document, EntityStore, ProjectScope};
use crate::view_model::{BoardViewModel, RollbackOutcome, SettleOutcome};

pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;

/// What to do with a drag on a task whose previous move is still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Fail the new gesture with [`Error::DragInFlight`].
    #[default]
    Reject,
    /// Wait for the previous write to settle, then run the gesture.
    Queue,
}

impl std::fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlapPolicy::Reject => f.write_str("reject"),
            OverlapPolicy::Queue => f.write_str("queue"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSettings {
    pub overlap: OverlapPolicy,
    pub write_timeout: Duration,
}

impl Default for DragSettings {
    fn default() -> Self {
        Self {
            overlap: OverlapPolicy::default(),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DragOutcome {
    /// Dropped where it started; nothing written.
    Unchanged,
    Committed,
    /// The board was torn down before the write settled.
    Detached,
}

pub struct DragController {
    store: Arc<dyn EntityStore>,
    scope: ProjectScope,
    view: Arc<BoardViewModel>,
    settings: DragSettings,
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DragController {
    pub fn new(
        store: Arc<dyn EntityStore>,
        scope: ProjectScope,
        view: Arc<BoardViewModel>,
        settings: DragSettings,
    ) -> Self {
        Self {
            store,
            scope,
            view,
            settings,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Controller writing to the board behind `subscription`.
    pub fn for_subscription(
        store: Arc<dyn EntityStore>,
        subscription: &Subscription,
        settings: DragSettings,
    ) -> Self {
        Self::new(
            store,
            subscription.scope().clone(),
            subscription.view().clone(),
            settings,
        )
    }

    pub fn settings(&self) -> DragSettings {
        self.settings
    }

    /// Drag `task_id` from wherever it is displayed now onto `drop_target`.
    pub async fn move_task(&self, task_id: &str, drop_target: &str) -> Result<DragOutcome> {
        let board = self
            .view
            .board()
            .ok_or_else(|| Error::BoardUnavailable("board not loaded yet".to_string()))?;
        let task = board
            .find_task(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        self.drag_end(DragOperation::from_drag_start(task, drop_target))
            .await
    }

    /// Finish a drag gesture.
    pub async fn drag_end(&self, op: DragOperation) -> Result<DragOutcome> {
        if op.is_noop() {
            tracing::debug!(task_id = %op.task_id, "drop on source stage, nothing to do");
            return Ok(DragOutcome::Unchanged);
        }
        let path = self.scope.task_document(&op.task_id)?;
        let _slot = self.acquire_slot(&op.task_id).await?;

        let target = op.target_stage_id.as_deref();
        // A queued gesture may find its task already back on the target.
        let displayed = self
            .view
            .board()
            .and_then(|board| board.placement(&op.task_id));
        if displayed == Some(Placement::from_stage(target)) {
            tracing::debug!(task_id = %op.task_id, "task already on target, nothing to do");
            return Ok(DragOutcome::Unchanged);
        }
        let ticket = self.view.begin_move(&op.task_id, target)?;

        let mut fields = Document::new();
        fields.insert(STAGE_ID_FIELD.to_string(), stage_value(target));
        let write = tokio::time::timeout(
            self.settings.write_timeout,
            self.store.update_document(&path, fields),
        )
        .await;

        match write {
            Ok(Ok(())) => match self.view.settle_move(ticket) {
                SettleOutcome::Detached => {
                    tracing::debug!(task_id = %op.task_id, "move persisted after board closed");
                    Ok(DragOutcome::Detached)
                }
                _ => {
                    tracing::info!(
                        task_id = %op.task_id,
                        from = op.source_stage_id.as_deref().unwrap_or("unassigned"),
                        to = target.unwrap_or("unassigned"),
                        "task moved"
                    );
                    Ok(DragOutcome::Committed)
                }
            },
            Ok(Err(source)) => self.fail(
                ticket,
                Error::WriteRejected {
                    task_id: op.task_id.clone(),
                    source,
                },
            ),
            Err(_) => self.fail(
                ticket,
                Error::WriteTimeout {
                    task_id: op.task_id.clone(),
                    timeout_ms: self.settings.write_timeout.as_millis() as u64,
                },
            ),
        }
    }

    fn fail(&self, ticket: crate::view_model::MoveTicket, err: Error) -> Result<DragOutcome> {
        match self.view.rollback_move(ticket) {
            RollbackOutcome::Detached => {
                tracing::debug!(%err, "move failed after board closed");
                Ok(DragOutcome::Detached)
            }
            outcome => {
                tracing::warn!(%err, ?outcome, "move rolled back");
                Err(err)
            }
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn acquire_slot(&self, task_id: &str) -> Result<SlotGuard<'_>> {
        let slot = self
            .lock_slots()
            .entry(task_id.to_string())
            .or_default()
            .clone();
        let guard = match self.settings.overlap {
            OverlapPolicy::Reject => slot.try_lock_owned().ok(),
            OverlapPolicy::Queue => Some(slot.lock_owned().await),
        };
        let guard = SlotGuard {
            controller: self,
            task_id: task_id.to_string(),
            guard,
        };
        if guard.guard.is_none() {
            return Err(Error::DragInFlight(task_id.to_string()));
        }
        Ok(guard)
    }
}

/// Holds a task's slot; forgets the slot once nobody else wants it.
struct SlotGuard<'a> {
    controller: &'a DragController,
    task_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = self.controller.lock_slots();
        if slots
            .get(&self.task_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.task_id);
        }
    }
}
