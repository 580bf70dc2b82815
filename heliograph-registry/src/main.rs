//! heliograph-registry - document registry command-line entry point
//!
//! Runs one registry operation against the local database and prints the
//! result as JSON on stdout. Lifecycle events accepted during the operation
//! are relayed as JSON lines (stdout, or `--events-out`). Logs go to stderr
//! and, if configured, a log file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use heliograph_common::config::{LoggingConfig, TomlConfig};
use heliograph_common::events::{EventBus, EventEnvelope};
use heliograph_registry::config::{resolve_database_path, RegistrySettings};
use heliograph_registry::db::audit;
use heliograph_registry::models::{
    Author, DocumentStatus, ListQuery, RegistrationRequest, TransitionRequest,
};
use heliograph_registry::RegistryContext;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Command-line arguments for heliograph-registry
#[derive(Parser, Debug)]
#[command(name = "heliograph-registry")]
#[command(about = "Document identity and lifecycle registry")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "HELIOGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the configuration
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Append relayed events to this file instead of stdout
    #[arg(long)]
    events_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a document (JSON request file, or flags)
    Register {
        /// RegistrationRequest as JSON; "-" reads stdin
        #[arg(long, conflicts_with_all = ["title", "source"])]
        file: Option<PathBuf>,
        #[arg(long)]
        doi: Option<String>,
        #[arg(long)]
        content_hash: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        /// Author name, repeatable
        #[arg(long = "author")]
        authors: Vec<String>,
        #[arg(long)]
        source: Option<String>,
        /// Submitting user (random if omitted)
        #[arg(long)]
        user_id: Option<Uuid>,
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Move a document to another lifecycle state
    Transition {
        document_id: Uuid,
        #[arg(long)]
        to: DocumentStatus,
        #[arg(long)]
        worker: String,
        /// Only apply if the document is currently in this state
        #[arg(long)]
        expected: Option<DocumentStatus>,
        /// Required with --to failed
        #[arg(long)]
        error: Option<String>,
        /// Artifact pointer as key=value, repeatable
        #[arg(long = "artifact", value_parser = parse_key_value)]
        artifacts: Vec<(String, String)>,
    },

    /// Show a document with provenance and audit trail
    Show { document_id: Uuid },

    /// List documents, newest first
    List {
        #[arg(long)]
        status: Option<DocumentStatus>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long)]
        include_deleted: bool,
        /// Continue from a previous page's next_cursor
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Soft-delete a document (or remove it with --permanent)
    Delete {
        document_id: Uuid,
        #[arg(long)]
        permanent: bool,
    },

    /// Undo a soft delete
    Restore { document_id: Uuid },

    /// Print a document's state audit trail
    Audit { document_id: Uuid },
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "heliograph_registry={level},heliograph_common={level},sqlx=warn",
            level = logging.level
        ))
    });

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Write every event delivered so far as one JSON line each
fn relay_events(rx: &mut broadcast::Receiver<EventEnvelope>, out: &mut dyn Write) -> Result<usize> {
    let mut relayed = 0;
    loop {
        match rx.try_recv() {
            Ok(envelope) => {
                writeln!(out, "{}", serde_json::to_string(&envelope)?)?;
                relayed += 1;
            }
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event relay fell behind, events dropped");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    out.flush()?;
    Ok(relayed)
}

fn read_request(path: &Path) -> Result<RegistrationRequest> {
    let mut raw = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin().read_to_string(&mut raw)?;
    } else {
        File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .read_to_string(&mut raw)?;
    }
    serde_json::from_str(&raw).context("Invalid registration request JSON")
}

async fn run(ctx: &RegistryContext, command: Command) -> Result<()> {
    match command {
        Command::Register {
            file,
            doi,
            content_hash,
            title,
            year,
            authors,
            source,
            user_id,
            correlation_id,
        } => {
            let request = match file {
                Some(path) => read_request(&path)?,
                None => {
                    let (Some(title), Some(source)) = (title, source) else {
                        bail!("register needs --file, or --title and --source");
                    };
                    RegistrationRequest {
                        doi,
                        content_hash,
                        title,
                        year,
                        authors: authors.into_iter().map(Author::new).collect(),
                        source,
                        user_id: user_id.unwrap_or_else(Uuid::new_v4),
                        correlation_id,
                        ..Default::default()
                    }
                }
            };
            let outcome = ctx.registration().register(&request).await?;
            print_json(&outcome)
        }

        Command::Transition {
            document_id,
            to,
            worker,
            expected,
            error,
            artifacts,
        } => {
            let request = TransitionRequest {
                target_state: to,
                expected_state: expected,
                worker_id: worker,
                error_message: error,
                artifact_pointer_updates: artifacts.into_iter().collect::<BTreeMap<_, _>>(),
                correlation_id: None,
            };
            let outcome = ctx.lifecycle().transition(document_id, &request).await?;
            print_json(&outcome)
        }

        Command::Show { document_id } => {
            let detail = ctx.lifecycle().get_document_detail(document_id).await?;
            print_json(&detail)
        }

        Command::List {
            status,
            limit,
            include_deleted,
            cursor,
        } => {
            let query = ListQuery {
                status,
                limit: Some(limit),
                offset: None,
                include_deleted,
            };
            let page = ctx.lifecycle().list_page(&query, cursor.as_deref()).await?;
            print_json(&page)
        }

        Command::Delete {
            document_id,
            permanent,
        } => {
            let lifecycle = ctx.lifecycle();
            if permanent {
                lifecycle.hard_delete(document_id).await?;
                print_json(&serde_json::json!({ "document_id": document_id, "deleted": "permanent" }))
            } else {
                let document = lifecycle.soft_delete(document_id).await?;
                print_json(&document)
            }
        }

        Command::Restore { document_id } => {
            let document = ctx.lifecycle().restore(document_id).await?;
            print_json(&document)
        }

        Command::Audit { document_id } => {
            let mut conn = ctx.db.acquire().await?;
            let trail = audit::list_audit(&mut conn, document_id).await?;
            print_json(&trail)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config decides the log level, so it is loaded before tracing starts
    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting heliograph-registry v{}", env!("CARGO_PKG_VERSION"));

    let db_path = resolve_database_path(args.database.as_deref(), &config);
    let pool = heliograph_registry::db::init_database_pool(&db_path, &config.registry)
        .await
        .context("Failed to initialize database")?;

    let bus = EventBus::new(config.registry.event_bus_capacity);
    let mut events = bus.subscribe();
    let ctx = RegistryContext::with_event_bus(pool, bus, RegistrySettings::from_config(&config));

    let result = run(&ctx, args.command).await;

    let mut out: Box<dyn Write> = match &args.events_out {
        Some(path) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let relayed = relay_events(&mut events, out.as_mut())?;

    let metrics = ctx.metrics.snapshot();
    info!(
        relayed,
        elapsed_ms = (chrono::Utc::now() - ctx.startup_time).num_milliseconds(),
        queued = metrics.registrations_queued,
        duplicates = metrics.duplicates_total(),
        conflicts = metrics.transition_conflicts,
        lock_retries = metrics.lock_retries,
        "Operation complete"
    );

    ctx.shutdown().await;
    result
}
