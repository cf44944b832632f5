//! stageboard task commands

use chrono::NaiveDate;

use super::Context;
use crate::error::{Error, Result};
use crate::model::{normalize_target, Task};
use crate::output::{emit_success, HumanOutput};
use crate::store::EntityStore;

pub struct AddOptions {
    pub title: String,
    pub stage: Option<String>,
    pub due: Option<String>,
    pub description: Option<String>,
}

pub async fn run_add(ctx: &Context, options: AddOptions) -> Result<()> {
    let title = options.title.trim();
    if title.is_empty() {
        return Err(Error::InvalidArgument("task title cannot be empty".to_string()));
    }
    let due_date = options.due.as_deref().map(parse_due).transpose()?;
    let stage_id = options.stage.as_deref().and_then(normalize_target);

    let scope = ctx.scope()?;
    let store = ctx.file_store();
    if let Some(stage_id) = &stage_id {
        let stage_path = scope.stage_document(stage_id)?;
        if store.get_document(&stage_path).await?.is_none() {
            return Err(Error::UnknownStage(stage_id.clone()));
        }
    }

    let mut task = Task::new(String::new(), title);
    task.description = options
        .description
        .map(|description| description.trim().to_string())
        .filter(|description| !description.is_empty());
    task.due_date = due_date;
    task.stage_id = stage_id;

    task.id = store
        .create_document(&scope.tasks_collection(), task.to_document(scope.project_id()))
        .await?;
    tracing::debug!(task_id = %task.id, project = scope.project_id(), "task created");

    let mut human = HumanOutput::new(format!("stageboard task add: {}", task.id));
    human.push_summary("title", task.title.clone());
    human.push_summary("stage", task.stage_id.as_deref().unwrap_or("unassigned"));
    if let Some(due) = task.due_date {
        human.push_summary("due", due.to_string());
    }
    human.push_next_step(format!("stageboard move {} <stage>", task.id));

    emit_success(ctx.output, "task add", &task, Some(&human))
}

fn parse_due(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidArgument(format!("due date '{raw}' is not YYYY-MM-DD")))
}
