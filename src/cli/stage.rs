//! stageboard stage commands

use super::Context;
use crate::error::{Error, Result};
use crate::model::Stage;
use crate::output::{emit_success, HumanOutput};

pub struct AddOptions {
    pub id: String,
    pub title: Option<String>,
}

pub async fn run_add(ctx: &Context, options: AddOptions) -> Result<()> {
    let id = options.id.trim();
    if id.is_empty() || id.eq_ignore_ascii_case(crate::model::UNASSIGNED_TARGET) {
        return Err(Error::InvalidArgument(format!(
            "'{}' cannot be used as a stage id",
            options.id
        )));
    }
    let title = options
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(id);
    let stage = Stage::new(id, title);

    let scope = ctx.scope()?;
    let path = scope.stage_document(id)?;
    ctx.file_store()
        .put_document(&path, stage.to_document())
        .await?;
    tracing::debug!(stage = id, project = scope.project_id(), "stage written");

    let mut human = HumanOutput::new(format!("stageboard stage add: {}", stage.id));
    human.push_summary("project", scope.project_id());
    human.push_summary("title", stage.title.clone());
    human.push_next_step(format!("stageboard task add <title> --stage {}", stage.id));

    emit_success(ctx.output, "stage add", &stage, Some(&human))
}
