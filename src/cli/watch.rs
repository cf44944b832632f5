//! stageboard watch command implementation
//!
//! Prints the board every time it changes, until interrupted or until
//! `--limit` updates have been printed. JSON output is one line per update.

use serde::Serialize;

use super::board::{board_counts, human_board, BoardReport};
use super::Context;
use crate::error::Result;
use crate::events::EventKind;
use crate::merger::StreamMerger;
use crate::view_model::{BoardStatus, BoardView};

#[derive(Serialize)]
struct WatchUpdate<'a> {
    revision: u64,
    #[serde(flatten)]
    status: &'a BoardStatus,
    #[serde(flatten)]
    report: Option<BoardReport<'a>>,
}

pub async fn run(ctx: &Context, limit: Option<usize>) -> Result<()> {
    let mut events = ctx.open_events()?;
    let merger = StreamMerger::new(ctx.store());
    let subscription = merger.subscribe(&ctx.project).await?;
    let mut rx = subscription.watch();
    let mut printed = 0usize;

    loop {
        let view = rx.borrow_and_update().clone();
        if view.status != BoardStatus::Loading {
            print_update(ctx, &view)?;
            match &view.status {
                BoardStatus::Unavailable { reason } => {
                    events.emit(
                        EventKind::BoardUnavailable,
                        serde_json::json!({ "reason": reason }),
                    )?;
                }
                _ => {
                    if let Some(board) = view.board() {
                        events.emit(EventKind::BoardReady, board_counts(board))?;
                    }
                }
            }
            printed += 1;
            if limit.is_some_and(|limit| printed >= limit) {
                break;
            }
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscription.unsubscribe().await;
    Ok(())
}

fn print_update(ctx: &Context, view: &BoardView) -> Result<()> {
    if ctx.output.json {
        let update = WatchUpdate {
            revision: view.revision,
            status: &view.status,
            report: view.board().map(|board| BoardReport {
                project: &ctx.project,
                board,
            }),
        };
        println!("{}", serde_json::to_string(&update)?);
        return Ok(());
    }
    if ctx.output.quiet {
        return Ok(());
    }

    match (&view.status, view.board()) {
        (_, Some(board)) => {
            let mut human = human_board(ctx, board);
            if let BoardStatus::Unavailable { reason } = &view.status {
                human.push_warning(format!("board unavailable: {reason}"));
            }
            println!("{human}\n");
        }
        (BoardStatus::Unavailable { reason }, None) => {
            println!("stageboard board: {} unavailable ({reason})\n", ctx.project);
        }
        _ => {}
    }
    Ok(())
}
