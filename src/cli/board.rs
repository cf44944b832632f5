//! stageboard board command implementation

use serde::Serialize;

use super::Context;
use crate::board::Board;
use crate::error::Result;
use crate::events::EventKind;
use crate::merger::StreamMerger;
use crate::model::Task;
use crate::output::{emit_success, HumanOutput};

#[derive(Serialize)]
pub(super) struct BoardReport<'a> {
    pub project: &'a str,
    pub board: &'a Board,
}

pub async fn run(ctx: &Context) -> Result<()> {
    let mut events = ctx.open_events()?;
    let merger = StreamMerger::new(ctx.store());
    let subscription = merger.subscribe(&ctx.project).await?;
    let board = match subscription.first_board().await {
        Ok(board) => board,
        Err(err) => {
            events.emit(
                EventKind::BoardUnavailable,
                serde_json::json!({ "reason": err.to_string() }),
            )?;
            subscription.unsubscribe().await;
            return Err(err);
        }
    };
    subscription.unsubscribe().await;
    events.emit(EventKind::BoardReady, board_counts(&board))?;

    let report = BoardReport {
        project: &ctx.project,
        board: &board,
    };
    let human = human_board(ctx, &board);
    emit_success(ctx.output, "board", &report, Some(&human))
}

pub(super) fn board_counts(board: &Board) -> serde_json::Value {
    serde_json::json!({
        "tasks": board.task_count(),
        "columns": board.columns.len(),
        "unassigned": board.unassigned_tasks.len(),
    })
}

pub(super) fn human_board(ctx: &Context, board: &Board) -> HumanOutput {
    let mut human = HumanOutput::new(format!("stageboard board: {}", ctx.project));
    human.push_summary("tasks", board.task_count().to_string());
    human.push_summary("columns", board.columns.len().to_string());
    for line in render_board(board, &ctx.config.board.unassigned_label) {
        human.push_detail(line);
    }
    if board.columns.is_empty() {
        human.push_next_step("stageboard stage add <id> --title <title>");
    }
    human
}

/// One line per bucket, unassigned first.
pub(super) fn render_board(board: &Board, unassigned_label: &str) -> Vec<String> {
    let mut lines = vec![render_bucket(unassigned_label, &board.unassigned_tasks)];
    lines.extend(
        board
            .columns
            .iter()
            .map(|column| render_bucket(&column.stage.title, &column.tasks)),
    );
    lines
}

fn render_bucket(label: &str, tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return format!("{label} (0)");
    }
    let entries: Vec<String> = tasks.iter().map(render_task).collect();
    format!("{label} ({}): {}", tasks.len(), entries.join(", "))
}

fn render_task(task: &Task) -> String {
    let mut entry = format!("{} {}", task.id, task.title);
    if let Some(due) = task.due_date {
        entry.push_str(&format!(" [due {due}]"));
    }
    if task.completed {
        entry.push_str(" [done]");
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stage;

    #[test]
    fn render_lists_unassigned_then_columns() {
        let mut late = Task::new("t2", "Ship").in_stage("doing");
        late.due_date = chrono::NaiveDate::from_ymd_opt(2025, 3, 1);
        let board = Board::compute(
            &[Task::new("t1", "Plan"), late],
            &[Stage::new("doing", "Doing"), Stage::new("done", "Done")],
        );
        assert_eq!(
            render_board(&board, "Inbox"),
            vec![
                "Inbox (1): t1 Plan".to_string(),
                "Doing (1): t2 Ship [due 2025-03-01]".to_string(),
                "Done (0)".to_string(),
            ]
        );
    }
}
