use clap::{Args, Subcommand};
use healthsync_core::models::MutationAction;

#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Mutation category, e.g. `appointment` or `cart_item`.
    #[arg(long = "type")]
    pub entry_type: String,
    #[arg(long)]
    pub action: MutationAction,
    /// JSON payload.
    #[arg(long, default_value = "{}")]
    pub payload: String,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Skip the reachability probe and treat the host as online.
    #[arg(long, default_value_t = false)]
    pub assume_online: bool,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Replace records in a cache partition. `records` is a JSON object or array.
    Put {
        partition: String,
        records: String,
        #[arg(long, default_value = "id")]
        key_field: String,
    },
    List {
        partition: String,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, default_value_t = 5_000)]
    pub probe_interval_ms: u64,
    /// Stop after this many seconds; runs until ctrl-c when omitted.
    #[arg(long)]
    pub max_seconds: Option<u64>,
}
