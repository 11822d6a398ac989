//! Tally CLI - offline-first time tracking from the terminal
//!
//! Captures always succeed locally; anything the server has not seen yet
//! stays queued until a sync pass drains it.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tally_core::models::{Entity, ProjectDraft, TaskDraft, TimeEntryDraft};
use tally_core::sync::{ConnectivityMonitor, SyncEngine};
use tally_core::{EntityKind, HttpRemoteApi, RemoteConfig, SyncStatus};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Track time, tasks, and projects — offline first")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a time entry
    #[command(alias = "entry")]
    Add {
        /// Span start, e.g. "2024-01-01 09:00"
        #[arg(long)]
        start: Option<String>,
        /// Span end
        #[arg(long)]
        end: Option<String>,
        /// Server id of the project worked on
        #[arg(long)]
        project: Option<i64>,
        /// Free-form note
        note: Vec<String>,
    },
    /// Capture a task
    Task {
        /// Task name
        name: Vec<String>,
        /// Workflow status (default: open)
        #[arg(long)]
        status: Option<String>,
        /// Priority (default: normal)
        #[arg(long)]
        priority: Option<String>,
        /// Due date, e.g. "2024-05-01"
        #[arg(long)]
        due: Option<String>,
        /// Server id of the owning project
        #[arg(long)]
        project: Option<i64>,
    },
    /// Capture a project
    Project {
        /// Project name
        name: Vec<String>,
        /// Mark the project billable
        #[arg(long)]
        billable: bool,
        /// Hourly rate
        #[arg(long)]
        rate: Option<f64>,
        /// Client name
        #[arg(long)]
        client: Option<String>,
    },
    /// List local records
    List {
        /// What to list
        #[arg(value_enum, default_value_t = ListKind::Entries)]
        kind: ListKind,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the sync status banner
    Status,
    /// Run a sync pass now
    Sync,
    /// Keep probing connectivity and print every status change
    Watch {
        /// Probe interval in seconds
        #[arg(long, default_value = "30")]
        interval: u64,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ListKind {
    Entries,
    Tasks,
    Projects,
}

impl ListKind {
    const fn entity_kind(self) -> EntityKind {
        match self {
            Self::Entries => EntityKind::TimeEntry,
            Self::Tasks => EntityKind::Task,
            Self::Projects => EntityKind::Project,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Task name cannot be empty")]
    EmptyTaskName,
    #[error("Project name cannot be empty")]
    EmptyProjectName,
    #[error("Sync is not configured. Set TALLY_API_URL to enable `tally sync`.")]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tally=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Add {
            start,
            end,
            project,
            note,
        } => run_add(start, end, project, &note, &db_path).await?,
        Commands::Task {
            name,
            status,
            priority,
            due,
            project,
        } => run_task(&name, status, priority, due, project, &db_path).await?,
        Commands::Project {
            name,
            billable,
            rate,
            client,
        } => run_project(&name, billable, rate, client, &db_path).await?,
        Commands::List { kind, json } => run_list(kind, json, &db_path).await?,
        Commands::Status => run_status(&db_path).await?,
        Commands::Sync => run_sync(&db_path).await?,
        Commands::Watch { interval } => run_watch(interval, &db_path).await?,
    }

    Ok(())
}

async fn run_add(
    start: Option<String>,
    end: Option<String>,
    project: Option<i64>,
    note_parts: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    observe_connectivity(&engine).await;

    let draft = TimeEntryDraft {
        start_time: start.as_deref().map(Into::into),
        end_time: end.as_deref().map(Into::into),
        project_id: project,
        note: join_words(note_parts),
    };

    let entry = engine.create_time_entry(draft).await?;
    println!("{}", entry.meta.local_id);
    Ok(())
}

async fn run_task(
    name_parts: &[String],
    status: Option<String>,
    priority: Option<String>,
    due: Option<String>,
    project: Option<i64>,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = join_words(name_parts).ok_or(CliError::EmptyTaskName)?;

    let engine = open_engine(db_path).await?;
    observe_connectivity(&engine).await;

    let task = engine
        .create_task(TaskDraft {
            name,
            status,
            priority,
            due_date: due.as_deref().map(Into::into),
            project_id: project,
        })
        .await?;
    println!("{}", task.meta.local_id);
    Ok(())
}

async fn run_project(
    name_parts: &[String],
    billable: bool,
    rate: Option<f64>,
    client: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = join_words(name_parts).ok_or(CliError::EmptyProjectName)?;

    let engine = open_engine(db_path).await?;
    observe_connectivity(&engine).await;

    let project = engine
        .create_project(ProjectDraft {
            name,
            billable: Some(billable),
            hourly_rate: rate,
            client,
        })
        .await?;
    println!("{}", project.meta.local_id);
    Ok(())
}

async fn run_list(kind: ListKind, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let entities = engine.list_offline(kind.entity_kind()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
    } else {
        for line in format_entity_lines(&entities) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_status(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;

    // Read-only: probe without triggering a pass
    let online = engine.probe_remote().await;
    let pending = engine.pending_count().await?;
    let status = SyncStatus {
        online,
        pending,
        syncing: false,
    };

    println!("{}", status.banner());
    Ok(())
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    if RemoteConfig::from_env().is_none() {
        return Err(CliError::SyncNotConfigured);
    }

    let engine = open_engine(db_path).await?;
    let online = engine.probe_remote().await;

    match engine.set_online(online).await? {
        Some(report) => {
            println!(
                "Synced {}, failed {}, pending {}",
                report.synced, report.failed, report.pending
            );
        }
        None => {
            let pending = engine.pending_count().await?;
            println!("offline — {pending} pending");
        }
    }

    Ok(())
}

async fn run_watch(interval_secs: u64, db_path: &Path) -> Result<(), CliError> {
    if RemoteConfig::from_env().is_none() {
        return Err(CliError::SyncNotConfigured);
    }

    let engine = open_engine(db_path).await?;
    let mut statuses = engine.subscribe();

    let monitor = ConnectivityMonitor::new(engine.clone(), Duration::from_secs(interval_secs));
    tokio::spawn(monitor.run());

    println!("{}", render_status(engine.status()));
    while statuses.changed().await.is_ok() {
        let status = *statuses.borrow_and_update();
        println!("{}", render_status(status));
    }

    Ok(())
}

fn render_status(status: SyncStatus) -> String {
    format!(
        "[{}] online={} pending={}",
        status.banner(),
        status.online,
        status.pending
    )
}

fn format_entity_lines(entities: &[Entity]) -> Vec<String> {
    entities
        .iter()
        .map(|entity| {
            let id = entity.local_id().to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let summary = entity_summary(entity, 44);
            let sync = if entity.meta().synced {
                "synced"
            } else {
                "pending"
            };
            format!("{short_id:<13}  {summary:<44}  {sync}")
        })
        .collect()
}

fn entity_summary(entity: &Entity, max_chars: usize) -> String {
    let raw = match entity {
        Entity::TimeEntry(entry) => {
            let span = match (&entry.start_time, &entry.end_time) {
                (Some(start), Some(end)) => format!("{start} → {end}"),
                (Some(start), None) => format!("{start} → …"),
                _ => "(no span)".to_string(),
            };
            match &entry.note {
                Some(note) => format!("{span}  {note}"),
                None => span,
            }
        }
        Entity::Task(task) => format!("{} ({}, {})", task.name, task.status, task.priority),
        Entity::Project(project) => {
            if project.billable {
                format!("{} [billable]", project.name)
            } else {
                project.name.clone()
            }
        }
    };

    truncate_chars(&raw, max_chars)
}

fn truncate_chars(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        raw.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = raw.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn join_words(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Observe current reachability once; an offline→online transition drains
/// the queue before the new capture goes online-first.
async fn observe_connectivity(engine: &SyncEngine<HttpRemoteApi>) {
    let online = engine.probe_remote().await;
    if let Err(error) = engine.set_online(online).await {
        tracing::warn!("Startup sync attempt failed: {error}");
    }
}

async fn open_engine(db_path: &Path) -> Result<SyncEngine<HttpRemoteApi>, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let remote = match RemoteConfig::from_env() {
        Some(config) => Some(HttpRemoteApi::new(config)?),
        None => {
            tracing::info!("Running in local-only mode (no TALLY_API_URL)");
            None
        }
    };

    Ok(SyncEngine::open(db_path, remote).await?)
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TALLY_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}
