//! Detail coordinator: which task an editing surface should show.
//!
//! Selection comes from navigation query state (`task=<id>&stage=<id>`).
//! A task id that is not on the current board (deleted, or owned by another
//! project) resolves to no task, which callers render as the empty/creation
//! state.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{normalize_target, Task};

pub const TASK_KEY: &str = "task";
pub const STAGE_KEY: &str = "stage";

/// Key/value navigation state.
pub type QueryState = BTreeMap<String, String>;

/// Parse `task=t1&stage=done` style query strings. A leading `?` is ignored,
/// `+` is a space and `%XX` escapes are decoded. Later keys win.
pub fn parse_query(raw: &str) -> QueryState {
    raw.trim()
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailSelection {
    /// Id named by the query, whether or not it resolved.
    pub requested_task_id: Option<String>,
    pub task: Option<Task>,
    /// Stage a newly created task should start in; `None` is unassigned.
    pub creation_stage_id: Option<String>,
}

impl DetailSelection {
    /// Nothing to edit: render the creation form.
    pub fn is_creation(&self) -> bool {
        self.task.is_none()
    }

    /// The query named a task that is not on the board.
    pub fn is_dangling(&self) -> bool {
        self.requested_task_id.is_some() && self.task.is_none()
    }
}

/// Resolve query state against the current flattened task list.
pub fn resolve<'a>(
    query: &QueryState,
    tasks: impl IntoIterator<Item = &'a Task>,
) -> DetailSelection {
    let requested_task_id = query
        .get(TASK_KEY)
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let task = requested_task_id
        .as_deref()
        .and_then(|id| tasks.into_iter().find(|task| task.id == id))
        .cloned();
    let creation_stage_id = query
        .get(STAGE_KEY)
        .and_then(|stage| normalize_target(stage));

    DetailSelection {
        requested_task_id,
        task,
        creation_stage_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks() -> Vec<Task> {
        vec![
            Task::new("t1", "one").in_stage("doing"),
            Task::new("t2", "two"),
        ]
    }

    #[test]
    fn parse_decodes_plus_and_percent() {
        let query = parse_query("?task=t%201&stage=In+Review&flag");
        assert_eq!(query.get("task").map(String::as_str), Some("t 1"));
        assert_eq!(query.get("stage").map(String::as_str), Some("In Review"));
        assert_eq!(query.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn malformed_escape_is_kept_literally() {
        let query = parse_query("task=100%&stage=%zz");
        assert_eq!(query["task"], "100%");
        assert_eq!(query["stage"], "%zz");
    }

    #[test]
    fn known_task_is_selected() {
        let tasks = tasks();
        let selection = resolve(&parse_query("task=t1"), &tasks);
        assert_eq!(selection.task.map(|task| task.id), Some("t1".to_string()));
    }

    #[test]
    fn missing_task_resolves_to_creation_state() {
        let tasks = tasks();
        let selection = resolve(&parse_query("task=deleted&stage=doing"), &tasks);
        assert!(selection.is_creation());
        assert!(selection.is_dangling());
        assert_eq!(selection.creation_stage_id.as_deref(), Some("doing"));
    }

    #[test]
    fn unassigned_creation_stage_normalizes_to_none() {
        let selection = resolve(&parse_query("stage=unassigned"), &tasks());
        assert!(selection.is_creation());
        assert!(!selection.is_dangling());
        assert_eq!(selection.creation_stage_id, None);
    }
}
