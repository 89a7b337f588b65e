use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod args;

#[cfg(test)]
mod tests;

pub use args::{CacheArgs, CacheCommand, EnqueueArgs, RunArgs, SyncArgs};

#[derive(Debug, Parser)]
#[command(name = "healthsync")]
#[command(about = "Offline-first outbox and sync engine host", version)]
pub struct Cli {
    /// Directory holding the local state database.
    #[arg(long, default_value = ".healthsync")]
    pub root: PathBuf,

    /// TOML config file. Defaults to `<root>/healthsync.toml` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bearer token for the remote authority. Falls back to `HEALTHSYNC_TOKEN`.
    #[arg(long)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Queue a mutation. Always succeeds offline.
    Enqueue(EnqueueArgs),
    /// List queued mutations in submission order.
    Pending,
    Status,
    /// Run one drain now.
    Sync(SyncArgs),
    Cache(CacheArgs),
    /// Keep the engine running until ctrl-c.
    Run(RunArgs),
}

impl Commands {
    /// Operation name reported in error payloads.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Enqueue(_) => "outbox.enqueue",
            Self::Pending => "outbox.pending",
            Self::Status => "engine.status",
            Self::Sync(_) => "sync.drain",
            Self::Cache(args) => match args.command {
                CacheCommand::Put { .. } => "cache.put",
                CacheCommand::List { .. } => "cache.list",
            },
            Self::Run(_) => "engine.run",
        }
    }
}
