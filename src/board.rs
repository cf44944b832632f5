//! Render-ready board derived from a task snapshot and a stage snapshot.
//!
//! [`Board::compute`] is a pure function of its two inputs: same tasks and
//! same stages always give an identical board, whichever stream fired last.
//! Columns follow stage snapshot order and tasks inside a bucket follow task
//! snapshot order. A task whose stage is null, or names a stage that is not
//! in the stage snapshot, lands in `unassigned_tasks`.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::{Stage, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub stage: Stage,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Board {
    pub unassigned_tasks: Vec<Task>,
    pub columns: Vec<Column>,
}

/// Where a task sits on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "stage_id", rename_all = "snake_case")]
pub enum Placement {
    Unassigned,
    Stage(String),
}

impl Placement {
    pub fn from_stage(stage_id: Option<&str>) -> Self {
        match stage_id {
            Some(id) => Placement::Stage(id.to_string()),
            None => Placement::Unassigned,
        }
    }

    pub fn stage_id(&self) -> Option<&str> {
        match self {
            Placement::Unassigned => None,
            Placement::Stage(id) => Some(id),
        }
    }
}

impl Board {
    pub fn compute(tasks: &[Task], stages: &[Stage]) -> Self {
        let mut seen_stages = HashSet::new();
        let mut columns: Vec<Column> = stages
            .iter()
            .filter(|stage| seen_stages.insert(stage.id.as_str()))
            .map(|stage| Column {
                stage: stage.clone(),
                tasks: Vec::new(),
            })
            .collect();

        let mut unassigned_tasks = Vec::new();
        let mut seen_tasks = HashSet::new();
        for task in tasks {
            if !seen_tasks.insert(task.id.as_str()) {
                tracing::warn!(task_id = %task.id, "duplicate task id in snapshot");
                continue;
            }
            let column = task
                .stage_id
                .as_deref()
                .and_then(|stage_id| columns.iter_mut().find(|c| c.stage.id == stage_id));
            match column {
                Some(column) => column.tasks.push(task.clone()),
                None => unassigned_tasks.push(task.clone()),
            }
        }

        Self {
            unassigned_tasks,
            columns,
        }
    }

    /// Every task on the board: unassigned first, then column by column.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.unassigned_tasks
            .iter()
            .chain(self.columns.iter().flat_map(|column| column.tasks.iter()))
    }

    pub fn task_count(&self) -> usize {
        self.unassigned_tasks.len()
            + self
                .columns
                .iter()
                .map(|column| column.tasks.len())
                .sum::<usize>()
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks().find(|task| task.id == task_id)
    }

    pub fn column(&self, stage_id: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.stage.id == stage_id)
    }

    pub fn has_stage(&self, stage_id: &str) -> bool {
        self.column(stage_id).is_some()
    }

    pub fn placement(&self, task_id: &str) -> Option<Placement> {
        if self.unassigned_tasks.iter().any(|task| task.id == task_id) {
            return Some(Placement::Unassigned);
        }
        self.columns
            .iter()
            .find(|column| column.tasks.iter().any(|task| task.id == task_id))
            .map(|column| Placement::Stage(column.stage.id.clone()))
    }

    /// Copy of this board with `task_id` moved to the end of `target`'s
    /// bucket and its `stage_id` rewritten.
    ///
    /// Returns `None` when the task is not on the board or `target` is not
    /// one of its stages.
    pub fn with_task_moved(&self, task_id: &str, target: Option<&str>) -> Option<Board> {
        if let Some(stage_id) = target {
            if !self.has_stage(stage_id) {
                return None;
            }
        }

        let mut board = self.clone();
        let mut task = take_task(&mut board.unassigned_tasks, task_id).or_else(|| {
            board
                .columns
                .iter_mut()
                .find_map(|column| take_task(&mut column.tasks, task_id))
        })?;
        task.stage_id = target.map(str::to_string);

        match target {
            None => board.unassigned_tasks.push(task),
            Some(stage_id) => {
                let column = board
                    .columns
                    .iter_mut()
                    .find(|column| column.stage.id == stage_id)?;
                column.tasks.push(task);
            }
        }
        Some(board)
    }
}

fn take_task(tasks: &mut Vec<Task>, task_id: &str) -> Option<Task> {
    let index = tasks.iter().position(|task| task.id == task_id)?;
    Some(tasks.remove(index))
}
