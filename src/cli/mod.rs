//! Command-line interface for stageboard
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{Event, EventDestination, EventKind, EventSink};
use crate::output::OutputOptions;
use crate::store::{EntityStore, FileStore, ProjectScope};

mod board;
mod init;
mod move_task;
mod show;
mod stage;
mod task;
mod watch;

/// stageboard - live kanban board over a document store
///
/// Tasks and stages live in a shared store; every command works on one
/// project's board. Moves are applied optimistically and rolled back when
/// the store refuses them.
#[derive(Parser, Debug)]
#[command(name = "stageboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Board root holding `.stageboard.toml` (defaults to current directory)
    #[arg(long, global = true, env = "STAGEBOARD_ROOT")]
    pub root: Option<PathBuf>,

    /// Project whose board to use
    #[arg(long, global = true, env = "STAGEBOARD_PROJECT", default_value = "default")]
    pub project: String,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit board events as JSON lines ("-" for stdout, or a file path)
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the config file and data directory
    Init,

    /// Stage management
    #[command(subcommand)]
    Stage(StageCommands),

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Print the current board
    Board,

    /// Move a task to a stage (or "unassigned")
    Move {
        /// Task ID
        task: String,

        /// Target stage ID, or "unassigned"
        target: String,
    },

    /// Resolve which task a detail view would open
    Show {
        /// Navigation query, e.g. "task=<id>&stage=<id>"
        #[arg(long, default_value = "")]
        query: String,
    },

    /// Print the board after every change
    Watch {
        /// Stop after this many board updates
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Stage subcommands
#[derive(Subcommand, Debug)]
pub enum StageCommands {
    /// Add a stage (column) to the project
    Add {
        /// Stage ID
        id: String,

        /// Column title (defaults to the ID)
        #[arg(long)]
        title: Option<String>,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Add a task to the project
    Add {
        /// Task title
        title: String,

        /// Initial stage ID
        #[arg(long)]
        stage: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,

        /// Longer description
        #[arg(long)]
        description: Option<String>,
    },
}

/// Everything a command needs once global flags are resolved.
pub(crate) struct Context {
    pub root: PathBuf,
    pub project: String,
    pub config: Config,
    pub output: OutputOptions,
    events: Option<EventDestination>,
}

impl Context {
    fn resolve(cli: &Cli) -> Result<Self> {
        let root = match &cli.root {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        };
        let config = Config::load_from_root(&root)?;
        let events = EventDestination::parse(cli.events.as_deref());
        let events_to_stdout = matches!(events, Some(EventDestination::Stdout));
        Ok(Self {
            root,
            project: cli.project.trim().to_string(),
            config,
            output: OutputOptions {
                json: cli.json && !events_to_stdout,
                quiet: cli.quiet || events_to_stdout,
            },
            events,
        })
    }

    pub fn scope(&self) -> Result<ProjectScope> {
        ProjectScope::new(&self.project)
    }

    pub fn file_store(&self) -> FileStore {
        self.config.store.open(&self.root)
    }

    pub fn store(&self) -> Arc<dyn EntityStore> {
        Arc::new(self.file_store())
    }

    pub fn open_events(&self) -> Result<EventLog> {
        let sink = match &self.events {
            Some(destination) => Some(destination.open()?),
            None => None,
        };
        Ok(EventLog {
            project: self.project.clone(),
            sink,
        })
    }
}

/// Optional event sink bound to the current project.
pub(crate) struct EventLog {
    project: String,
    sink: Option<EventSink>,
}

impl EventLog {
    pub fn emit<T: serde::Serialize>(&mut self, kind: EventKind, data: T) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let event = Event::new(kind, self.project.clone()).with_data(data)?;
        sink.emit(&event)
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::Io)
}

impl Commands {
    /// Name reported in the JSON envelope, subcommand included.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Init => "init",
            Commands::Stage(StageCommands::Add { .. }) => "stage add",
            Commands::Task(TaskCommands::Add { .. }) => "task add",
            Commands::Board => "board",
            Commands::Move { .. } => "move",
            Commands::Show { .. } => "show",
            Commands::Watch { .. } => "watch",
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let ctx = Context::resolve(&self)?;
        match self.command {
            Commands::Init => init::run(&ctx),
            Commands::Stage(StageCommands::Add { id, title }) => {
                runtime()?.block_on(stage::run_add(&ctx, stage::AddOptions { id, title }))
            }
            Commands::Task(TaskCommands::Add {
                title,
                stage,
                due,
                description,
            }) => runtime()?.block_on(task::run_add(
                &ctx,
                task::AddOptions {
                    title,
                    stage,
                    due,
                    description,
                },
            )),
            Commands::Board => runtime()?.block_on(board::run(&ctx)),
            Commands::Move { task, target } => {
                runtime()?.block_on(move_task::run(&ctx, move_task::MoveOptions { task, target }))
            }
            Commands::Show { query } => runtime()?.block_on(show::run(&ctx, &query)),
            Commands::Watch { limit } => runtime()?.block_on(watch::run(&ctx, limit)),
        }
    }
}
