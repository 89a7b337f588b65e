use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use healthsync_core::models::{
    ConnectivityState, DrainOutcome, OutboxEntry, Reachability, SyncStatus,
};
use healthsync_core::{
    Credential, CredentialProvider, HttpRemoteAuthority, RemoteAuthority, SqliteStore,
    StaticCredential, StoreBackend, SyncConfig, SyncEngine,
};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{CacheCommand, Cli, Commands, EnqueueArgs};

mod run;
mod support;


use self::run::run_engine;
pub(crate) use self::support::report_failure;
use self::support::print_json;

const DB_FILE: &str = "healthsync.db";
const CONFIG_FILE: &str = "healthsync.toml";
const TOKEN_ENV: &str = "HEALTHSYNC_TOKEN";

pub(crate) fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.root, cli.config.as_deref())?;
    let token = cli
        .token
        .clone()
        .or_else(|| std::env::var(TOKEN_ENV).ok())
        .filter(|token| !token.trim().is_empty());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(dispatch(&cli.root, config, token, cli.command))
}

async fn dispatch(
    root: &Path,
    config: SyncConfig,
    token: Option<String>,
    command: Commands,
) -> Result<()> {
    let remote = HttpRemoteAuthority::new(&config.remote_base_url, config.request_timeout())
        .context("failed to build remote client")?;
    let engine = open_engine(root, config, token, remote.clone()).await?;

    match command {
        Commands::Enqueue(args) => print_json(&enqueue(&engine, args).await?),
        Commands::Pending => print_json(&engine.pending().await?),
        Commands::Status => print_json(&status(&engine).await?),
        Commands::Sync(args) => {
            if args.assume_online {
                engine.report_reachability(Reachability::Online);
            } else {
                engine.report_reachability(remote.probe().await);
            }
            let outcome = engine.sync_now().await;
            print_json(&SyncReport {
                outcome,
                connectivity: engine.connectivity_state(),
            })
        }
        Commands::Cache(args) => match args.command {
            CacheCommand::Put {
                partition,
                records,
                key_field,
            } => print_json(&cache_put(&engine, &partition, &records, &key_field).await?),
            CacheCommand::List { partition } => {
                let cache = engine.cache(&partition).await?;
                print_json(&cache.get_cached_data::<Value>().await?)
            }
        },
        Commands::Run(args) => {
            let report = run_engine(Arc::new(engine), remote, &args).await?;
            print_json(&report)
        }
    }
}

pub(super) async fn open_engine(
    root: &Path,
    config: SyncConfig,
    token: Option<String>,
    remote: HttpRemoteAuthority,
) -> Result<SyncEngine> {
    let db_path = root.join(DB_FILE);
    let store: Arc<dyn StoreBackend> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?,
    );
    let credentials: Arc<dyn CredentialProvider> = match token {
        Some(token) => Arc::new(StaticCredential::new(
            Credential::new(token, None).context("invalid token")?,
        )),
        None => Arc::new(StaticCredential::none()),
    };
    let remote: Arc<dyn RemoteAuthority> = Arc::new(remote);
    SyncEngine::builder(store, remote, credentials)
        .config(config)
        .build()
        .await
        .context("failed to start sync engine")
}

fn load_config(root: &Path, explicit: Option<&Path>) -> Result<SyncConfig> {
    let implicit = root.join(CONFIG_FILE);
    let path: Option<PathBuf> = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None if implicit.is_file() => Some(implicit),
        None => None,
    };
    SyncConfig::load(path.as_deref()).context("failed to load config")
}

pub(super) async fn enqueue(engine: &SyncEngine, args: EnqueueArgs) -> Result<OutboxEntry> {
    let payload: Value = serde_json::from_str(&args.payload)
        .with_context(|| format!("payload is not valid JSON: {}", args.payload))?;
    let entry = engine
        .enqueue(&args.entry_type, args.action, payload)
        .await
        .context("failed to queue mutation")?;
    Ok(entry)
}

pub(super) async fn cache_put(
    engine: &SyncEngine,
    partition: &str,
    records: &str,
    key_field: &str,
) -> Result<CachePutReport> {
    let parsed: Value =
        serde_json::from_str(records).context("cache records are not valid JSON")?;
    let records = match parsed {
        Value::Array(records) => records,
        Value::Object(record) => vec![Value::Object(record)],
        _ => bail!("cache records must be a JSON object or array"),
    };
    let cache = engine.cache(partition).await?;
    let written = cache.cache_json(&records, key_field).await?;
    Ok(CachePutReport {
        partition: cache.partition().to_string(),
        written,
        total: cache.record_count().await?,
    })
}

pub(super) async fn status(engine: &SyncEngine) -> Result<StatusReport> {
    Ok(StatusReport {
        connectivity: engine.connectivity_state(),
        pending: engine.pending().await?.len(),
        sync: engine.status(),
        outbox_partition: engine.config().outbox_partition.clone(),
        remote_base_url: engine.config().remote_base_url.clone(),
    })
}

#[derive(Debug, Serialize)]
pub(super) struct StatusReport {
    connectivity: ConnectivityState,
    pending: usize,
    sync: SyncStatus,
    outbox_partition: String,
    remote_base_url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CachePutReport {
    partition: String,
    written: usize,
    total: u64,
}

#[derive(Debug, Serialize)]
struct SyncReport {
    outcome: DrainOutcome,
    connectivity: ConnectivityState,
}
