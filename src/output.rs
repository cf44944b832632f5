//! Human and JSON rendering for stageboard commands.
//!
//! Every command builds a serializable payload plus a [`HumanOutput`]; the
//! global `--json` and `--quiet` flags decide which of the two reaches stdout.

use std::fmt;

use serde::Serialize;

use crate::error::{exit_codes, Error, Result};

pub const SCHEMA_VERSION: &str = "stageboard.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Header line followed by optional summary, details, warnings and next steps.
#[derive(Debug, Clone, Default)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    /// An empty value renders the key alone.
    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

impl fmt::Display for HumanOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header)?;
        if !self.summary.is_empty() {
            f.write_str("\n\nSummary:")?;
            for (key, value) in &self.summary {
                if value.is_empty() {
                    write!(f, "\n- {key}")?;
                } else {
                    write!(f, "\n- {key}: {value}")?;
                }
            }
        }
        let sections = [
            ("Details", &self.details),
            ("Warnings", &self.warnings),
            ("Next steps", &self.next_steps),
        ];
        for (title, items) in sections {
            if items.is_empty() {
                continue;
            }
            write!(f, "\n\n{title}:")?;
            for item in items {
                write!(f, "\n- {item}")?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Envelope<'a, B: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(flatten)]
    body: B,
    #[serde(skip_serializing_if = "no_items")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "no_items")]
    next_steps: &'a [String],
}

fn no_items(items: &&[String]) -> bool {
    items.is_empty()
}

#[derive(Serialize)]
struct Success<'a, T: Serialize> {
    data: &'a T,
}

#[derive(Serialize)]
struct Failure {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let (warnings, next_steps) = match human {
            Some(human) => (human.warnings.as_slice(), human.next_steps.as_slice()),
            None => (&[][..], &[][..]),
        };
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            body: Success { data },
            warnings,
            next_steps,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    if let (false, Some(human)) = (options.quiet, human) {
        println!("{human}");
    }
    Ok(())
}

/// Report a failed command on stdout (`--json`) or stderr.
pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    if json {
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            body: Failure {
                error: ErrorBody {
                    message: err.to_string(),
                    code: err.exit_code(),
                    kind: error_kind(err),
                    details: err.details(),
                },
            },
            warnings: &[],
            next_steps: &next_steps,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

fn error_kind(err: &Error) -> &'static str {
    if err.exit_code() == exit_codes::USER_ERROR {
        "user_error"
    } else if err.is_transient_move_failure() {
        "move_failed"
    } else {
        "operation_failed"
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    let step = match err {
        Error::TaskNotFound(_) | Error::UnknownStage(_) => "stageboard board",
        Error::DragInFlight(_) => "retry once the previous move settles",
        Error::WriteRejected { .. } | Error::WriteTimeout { .. } => {
            "the board was restored; retry the move"
        }
        Error::BoardUnavailable(_) => "stageboard init",
        Error::InvalidConfig(_) => "fix .stageboard.toml then retry",
        _ => return Vec::new(),
    };
    vec![step.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_output_lists_sections_in_order() {
        let mut human = HumanOutput::new("stageboard move: t1 -> done");
        human.push_summary("outcome", "committed");
        human.push_summary("unchanged", "");
        human.push_warning("board unavailable");
        human.push_next_step("stageboard board");

        let text = human.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "stageboard move: t1 -> done");
        assert!(lines.contains(&"- outcome: committed"));
        assert!(lines.contains(&"- unchanged"));
        assert!(!lines.contains(&"Details:"));
        let warnings = lines.iter().position(|l| *l == "Warnings:").unwrap();
        let next = lines.iter().position(|l| *l == "Next steps:").unwrap();
        assert!(warnings < next);
    }

    #[test]
    fn move_failures_have_their_own_kind() {
        let timeout = Error::WriteTimeout {
            task_id: "t1".to_string(),
            timeout_ms: 10,
        };
        assert_eq!(error_kind(&timeout), "move_failed");
        assert_eq!(
            error_kind(&Error::TaskNotFound("t1".to_string())),
            "user_error"
        );
        assert_eq!(
            error_kind(&Error::BoardUnavailable("x".to_string())),
            "operation_failed"
        );
        assert_eq!(
            error_next_steps(&timeout),
            vec!["the board was restored; retry the move".to_string()]
        );
        assert!(error_next_steps(&Error::OperationFailed("x".to_string())).is_empty());
    }

    #[test]
    fn envelope_flattens_payload_and_skips_empty_lists() {
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command: "board",
            status: "success",
            body: Success {
                data: &serde_json::json!({ "tasks": 2 }),
            },
            warnings: &[],
            next_steps: &["stageboard board".to_string()],
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["data"]["tasks"], 2);
        assert_eq!(value["status"], "success");
        assert!(value.get("warnings").is_none());
        assert_eq!(value["next_steps"][0], "stageboard board");
    }
}
