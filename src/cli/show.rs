//! stageboard show command implementation

use super::Context;
use crate::detail::{parse_query, resolve};
use crate::error::Result;
use crate::merger::StreamMerger;
use crate::output::{emit_success, HumanOutput};

pub async fn run(ctx: &Context, query: &str) -> Result<()> {
    let merger = StreamMerger::new(ctx.store());
    let subscription = merger.subscribe(&ctx.project).await?;
    let board = subscription.first_board().await;
    subscription.unsubscribe().await;
    let board = board?;

    let selection = resolve(&parse_query(query), board.tasks());

    let mut human = match &selection.task {
        Some(task) => {
            let mut human = HumanOutput::new(format!("stageboard show: {}", task.id));
            human.push_summary("title", task.title.clone());
            human.push_summary("stage", task.stage_id.as_deref().unwrap_or("unassigned"));
            if let Some(due) = task.due_date {
                human.push_summary("due", due.to_string());
            }
            if let Some(description) = &task.description {
                human.push_detail(description.clone());
            }
            human
        }
        None => {
            let mut human = HumanOutput::new("stageboard show: new task");
            human.push_summary(
                "stage",
                selection.creation_stage_id.as_deref().unwrap_or("unassigned"),
            );
            human.push_next_step("stageboard task add <title>");
            human
        }
    };
    if let Some(requested) = selection.requested_task_id.as_deref() {
        if selection.is_dangling() {
            human.push_warning(format!("task {requested} is not on this board"));
        }
    }

    emit_success(ctx.output, "show", &selection, Some(&human))
}
