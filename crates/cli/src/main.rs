//! swcache-admin: operator tooling for the offline action queue and the
//! cache generations.
//!
//! Every command prints pretty JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use swcache_client::{FetchClient, FetchConfig, OfflineActionQueue};
use swcache_core::{ActionType, AppConfig, CacheDb, ResponseStore, VersionedStore};

#[derive(Parser, Debug)]
#[command(name = "swcache-admin")]
#[command(about = "Inspect and repair the swcache queue and cache generations")]
#[command(version)]
struct Args {
    /// Database path (default: db_path from configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Offline action queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Cache generations
    Generations {
        #[command(subcommand)]
        command: GenerationsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// List pending actions, oldest first
    List,
    /// Queue an action for the next drain
    Add {
        raffle_id: String,
        /// draw, start, pause, resume, close, cancel or another URL-safe name
        action_type: String,
        /// JSON payload sent as the request body on replay
        #[arg(long)]
        params: Option<String>,
    },
    /// Drop a pending action without replaying it
    Remove { id: i64 },
    /// Replay every pending action against the configured origin
    Drain,
}

#[derive(Subcommand, Debug)]
enum GenerationsCommand {
    /// List generations with their entry counts
    List,
    /// Delete every generation except one
    Prune {
        /// Generation to keep (default: cache_name from configuration)
        #[arg(long)]
        keep: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    let config = AppConfig::load()?;
    let db_path = args.db.unwrap_or_else(|| config.db_path.clone());
    let db = Arc::new(
        CacheDb::open(&db_path)
            .await
            .with_context(|| format!("opening {}", db_path.display()))?,
    );

    let output = match args.command {
        Command::Queue { command } => run_queue(command, &config, db).await?,
        Command::Generations { command } => run_generations(command, &config, db).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_queue(command: QueueCommand, config: &AppConfig, db: Arc<CacheDb>) -> Result<Value> {
    let queue = OfflineActionQueue::from_config(db, config)?;

    let output = match command {
        QueueCommand::List => serde_json::to_value(queue.pending().await?)?,
        QueueCommand::Add { raffle_id, action_type, params } => {
            let action_type: ActionType = action_type.parse()?;
            let params = match params {
                Some(raw) => serde_json::from_str(&raw).context("--params must be JSON")?,
                None => Value::Null,
            };
            serde_json::to_value(queue.enqueue(&raffle_id, action_type, params).await?)?
        }
        QueueCommand::Remove { id } => {
            if !queue.remove(id).await? {
                bail!("no queued action with id {id}");
            }
            serde_json::json!({ "removed": id })
        }
        QueueCommand::Drain => {
            let transport = FetchClient::new(FetchConfig::from_app_config(config)?)?;
            serde_json::to_value(queue.drain(&transport).await?)?
        }
    };

    Ok(output)
}

async fn run_generations(command: GenerationsCommand, config: &AppConfig, db: Arc<CacheDb>) -> Result<Value> {
    let output = match command {
        GenerationsCommand::List => serde_json::to_value(db.generations().await?)?,
        GenerationsCommand::Prune { keep } => {
            let keep = keep.unwrap_or_else(|| config.cache_name.clone());
            let store = VersionedStore::open(db, keep).await?;
            let report = store.evict_stale().await?;
            if !report.is_clean() {
                tracing::warn!(failed = report.failed.len(), "some generations could not be deleted");
            }
            serde_json::to_value(report)?
        }
    };

    Ok(output)
}
