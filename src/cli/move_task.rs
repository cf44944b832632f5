//! stageboard move command implementation
//!
//! Runs one drag through the controller against a live subscription, so the
//! move is validated against the board the store currently shows.

use serde::Serialize;

use super::Context;
use crate::drag::{DragController, DragOutcome};
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::merger::StreamMerger;
use crate::model::normalize_target;
use crate::output::{emit_success, HumanOutput};

pub struct MoveOptions {
    pub task: String,
    pub target: String,
}

#[derive(Serialize)]
struct MoveReport {
    task_id: String,
    from: Option<String>,
    to: Option<String>,
    outcome: DragOutcome,
}

pub async fn run(ctx: &Context, options: MoveOptions) -> Result<()> {
    let mut events = ctx.open_events()?;
    let store = ctx.store();
    let merger = StreamMerger::new(store.clone());
    let subscription = merger.subscribe(&ctx.project).await?;

    let board = match subscription.first_board().await {
        Ok(board) => board,
        Err(err) => {
            subscription.unsubscribe().await;
            return Err(err);
        }
    };
    let from = board
        .find_task(&options.task)
        .and_then(|task| task.stage_id.clone());
    let to = normalize_target(&options.target);

    let controller =
        DragController::for_subscription(store, &subscription, ctx.config.drag.settings());
    let result = controller.move_task(&options.task, &options.target).await;
    subscription.unsubscribe().await;

    let payload = serde_json::json!({
        "task_id": options.task,
        "from": from,
        "to": to,
    });
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            let kind = match err {
                Error::WriteRejected { .. } | Error::WriteTimeout { .. } => {
                    EventKind::MoveRolledBack
                }
                _ => EventKind::MoveRejected,
            };
            let mut payload = payload;
            payload["reason"] = serde_json::Value::from(err.to_string());
            events.emit(kind, payload)?;
            return Err(err);
        }
    };
    if outcome == DragOutcome::Committed {
        events.emit(EventKind::TaskMoved, payload)?;
    }

    let label = |stage: &Option<String>| stage.clone().unwrap_or_else(|| "unassigned".to_string());
    let mut human = HumanOutput::new(format!(
        "stageboard move: {} -> {}",
        options.task,
        label(&to)
    ));
    human.push_summary("from", label(&from));
    human.push_summary(
        "outcome",
        match outcome {
            DragOutcome::Committed => "committed",
            DragOutcome::Unchanged => "unchanged (already there)",
            DragOutcome::Detached => "written after board closed",
        },
    );

    let report = MoveReport {
        task_id: options.task,
        from,
        to,
        outcome,
    };
    emit_success(ctx.output, "move", &report, Some(&human))
}
