//! stageboard - Live Board Synchronization Library
//!
//! This library keeps a render-ready project board in sync with a streaming
//! document store and lets callers move tasks between stages optimistically.
//!
//! # Core Concepts
//!
//! - **Entity store**: streaming subscriptions that emit full collection
//!   snapshots, plus partial document writes
//! - **Board**: tasks grouped by stage, plus an unassigned bucket, computed
//!   purely from the latest task and stage snapshots
//! - **Optimistic moves**: a drag is shown immediately and withdrawn if the
//!   store refuses the write
//!
//! # Module Organization
//!
//! - `store`: `EntityStore` trait with in-memory and file-backed stores
//! - `model`: task and stage records decoded from store documents
//! - `board`: pure board computation
//! - `merger`: joins the task and stage streams into boards
//! - `view_model`: the observable board state and its pending moves
//! - `drag`: drag transitions with rollback
//! - `detail`: resolves the task a detail view should open
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.stageboard.toml`
//! - `error`: Error types and result aliases
//! - `events`: JSON line board events
//! - `lock`: File locking and atomic writes for the file store

pub mod board;
pub mod cli;
pub mod config;
pub mod detail;
pub mod drag;
pub mod error;
pub mod events;
pub mod lock;
pub mod merger;
pub mod model;
pub mod output;
pub mod store;
pub mod view_model;

pub use board::{Board, Column, Placement};
pub use drag::{DragController, DragOutcome, DragSettings, OverlapPolicy};
pub use error::{Error, Result};
pub use merger::{StreamMerger, Subscription};
pub use view_model::{BoardState, BoardStatus, BoardView, BoardViewModel};
