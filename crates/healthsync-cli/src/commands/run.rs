use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use healthsync_core::models::{ConnectivityState, TriggerSource};
use healthsync_core::{BackgroundRegistration, HttpRemoteAuthority, SyncEngine};
use tracing::info;

use crate::cli::RunArgs;

#[derive(Debug, serde::Serialize, Default)]
pub(super) struct RunReport {
    probes: u64,
    drains_completed: u64,
    removed: usize,
    by_source: Vec<(TriggerSource, usize)>,
    background: Option<BackgroundRegistration>,
    final_state: ConnectivityState,
}

impl RunReport {
    fn record(&mut self, source: TriggerSource, removed: usize) {
        self.drains_completed += 1;
        self.removed += removed;
        match self.by_source.iter_mut().find(|(seen, _)| *seen == source) {
            Some((_, total)) => *total += removed,
            None => self.by_source.push((source, removed)),
        }
    }
}

/// Runs the engine's automatic triggers, feeding reachability from periodic
/// probes, until ctrl-c or the optional deadline.
pub(super) async fn run_engine(
    engine: Arc<SyncEngine>,
    remote: HttpRemoteAuthority,
    args: &RunArgs,
) -> Result<RunReport> {
    if args.probe_interval_ms == 0 {
        bail!("--probe-interval-ms must be greater than zero");
    }
    let mut report = RunReport {
        background: Some(engine.register_background().await),
        ..RunReport::default()
    };
    let (_subscription, mut completions) = engine.observers().subscribe_channel();
    let tasks = engine.start()?;

    let deadline = async {
        match args.max_seconds {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let mut probe = tokio::time::interval(Duration::from_millis(args.probe_interval_ms));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received; shutting down");
                break;
            }
            () = &mut deadline => {
                info!("run deadline reached; shutting down");
                break;
            }
            _ = probe.tick() => {
                report.probes += 1;
                engine.report_reachability(remote.probe().await);
            }
            Some(completed) = completions.recv() => {
                info!(
                    source = %completed.source,
                    removed = completed.removed,
                    remaining = completed.remaining,
                    "sync completed"
                );
                report.record(completed.source, completed.removed);
            }
        }
    }

    tasks.shutdown().await;
    while let Ok(completed) = completions.try_recv() {
        report.record(completed.source, completed.removed);
    }
    report.final_state = engine.connectivity_state();
    Ok(report)
}
