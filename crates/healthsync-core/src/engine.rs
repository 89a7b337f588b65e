//! Coordinator that owns one outbox, one monitor and one processor, and runs the
//! automatic triggers around them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::background::{BackgroundRegistration, BackgroundScheduler, register_background_sync};
use crate::cache::ReferenceCache;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::credential::CredentialProvider;
use crate::error::{Result, SyncError};
use crate::models::{
    ConnectivityState, DrainOutcome, MutationAction, OutboxEntry, Reachability, SyncStatus,
    TriggerSource,
};
use crate::outbox::Outbox;
use crate::processor::{SyncObservers, SyncProcessor};
use crate::remote::RemoteAuthority;
use crate::store::StoreBackend;

pub struct SyncEngineBuilder {
    store: Arc<dyn StoreBackend>,
    remote: Arc<dyn RemoteAuthority>,
    credentials: Arc<dyn CredentialProvider>,
    config: SyncConfig,
    initial_reachability: Reachability,
    background: Option<Arc<dyn BackgroundScheduler>>,
}

impl SyncEngineBuilder {
    #[must_use]
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn initial_reachability(mut self, reachability: Reachability) -> Self {
        self.initial_reachability = reachability;
        self
    }

    #[must_use]
    pub fn background_scheduler(mut self, scheduler: Arc<dyn BackgroundScheduler>) -> Self {
        self.background = Some(scheduler);
        self
    }

    pub async fn build(self) -> Result<SyncEngine> {
        self.config.validate()?;
        let outbox = Arc::new(
            Outbox::open(Arc::clone(&self.store), self.config.outbox_partition.clone()).await?,
        );
        let monitor = Arc::new(ConnectivityMonitor::new(self.initial_reachability));
        let processor = Arc::new(SyncProcessor::new(
            Arc::clone(&outbox),
            self.remote,
            self.credentials,
            Arc::clone(&monitor),
        ));
        processor.refresh_pending_count().await?;
        Ok(SyncEngine {
            config: self.config,
            store: self.store,
            outbox,
            monitor,
            processor,
            background: self.background,
            started: AtomicBool::new(false),
        })
    }
}

pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<dyn StoreBackend>,
    outbox: Arc<Outbox>,
    monitor: Arc<ConnectivityMonitor>,
    processor: Arc<SyncProcessor>,
    background: Option<Arc<dyn BackgroundScheduler>>,
    started: AtomicBool,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("outbox", &self.outbox)
            .field("connectivity", &self.monitor.state())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn builder(
        store: Arc<dyn StoreBackend>,
        remote: Arc<dyn RemoteAuthority>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            store,
            remote,
            credentials,
            config: SyncConfig::default(),
            initial_reachability: Reachability::Offline,
            background: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Queue-first write path, used whether online or offline.
    pub async fn enqueue(
        &self,
        entry_type: &str,
        action: MutationAction,
        payload: impl Serialize,
    ) -> Result<OutboxEntry> {
        let entry = self.outbox.enqueue(entry_type, action, payload).await?;
        if let Err(err) = self.processor.refresh_pending_count().await {
            warn!(error = %err, "pending count refresh after enqueue failed");
        }
        Ok(entry)
    }

    pub async fn pending(&self) -> Result<Vec<OutboxEntry>> {
        self.outbox.list_pending().await
    }

    /// User-initiated drain.
    pub async fn sync_now(&self) -> DrainOutcome {
        self.processor.drain(TriggerSource::Manual).await
    }

    pub async fn handle_background_wakeup(&self) -> DrainOutcome {
        self.processor.drain(TriggerSource::Background).await
    }

    pub async fn register_background(&self) -> BackgroundRegistration {
        register_background_sync(
            self.background.as_deref(),
            &self.config.background_tag,
            self.config.background_min_interval(),
        )
        .await
    }

    /// Returns `true` for an offline to online edge. The drain it triggers is
    /// requested by the running listener once the debounce window passes.
    pub fn report_reachability(&self, reachability: Reachability) -> bool {
        self.monitor.report(reachability)
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn connectivity_state(&self) -> ConnectivityState {
        self.monitor.state()
    }

    pub fn observers(&self) -> &Arc<SyncObservers> {
        self.processor.observers()
    }

    pub fn status(&self) -> SyncStatus {
        self.processor.status()
    }

    pub async fn cache(&self, name: &str) -> Result<ReferenceCache> {
        ReferenceCache::open(Arc::clone(&self.store), name).await
    }

    /// Spawns the online-transition listener, the periodic foreground drain and the
    /// pending-count refresher on the current runtime.
    ///
    /// The triggers run at most once per engine. A second call fails even after
    /// [`EngineTasks::shutdown`].
    pub fn start(self: &Arc<Self>) -> Result<EngineTasks> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SyncError::Internal(
                "sync engine triggers already started".to_string(),
            ));
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        // Subscribed before spawning so changes made right after `start` are seen.
        let edges = self.monitor.subscribe_online_edges();
        let revisions = self.outbox.subscribe_revisions();
        let handles = vec![
            tokio::spawn(Arc::clone(self).run_online_listener(edges, shutdown_rx.clone())),
            tokio::spawn(Arc::clone(self).run_periodic_sync(shutdown_rx.clone())),
            tokio::spawn(Arc::clone(self).run_pending_refresher(revisions, shutdown_rx)),
        ];
        info!(
            debounce_ms = self.config.online_debounce_ms,
            periodic_ms = self.config.periodic_sync_interval_ms,
            poll_ms = self.config.pending_poll_interval_ms,
            "sync engine started"
        );
        Ok(EngineTasks { shutdown, handles })
    }

    async fn run_online_listener(
        self: Arc<Self>,
        mut edges: watch::Receiver<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let quiet = self.config.online_debounce();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                settled = self.monitor.next_settled_online(&mut edges, quiet) => {
                    if !settled {
                        break;
                    }
                    let outcome = self.processor.drain(TriggerSource::OnlineTransition).await;
                    debug!(?outcome, "online transition drain finished");
                }
            }
        }
    }

    async fn run_periodic_sync(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.periodic_sync_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let outcome = self.processor.drain(TriggerSource::Periodic).await;
                    debug!(?outcome, "periodic drain finished");
                }
            }
        }
    }

    async fn run_pending_refresher(
        self: Arc<Self>,
        mut revisions: watch::Receiver<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.config.pending_poll_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    revisions.borrow_and_update();
                }
            }
            if let Err(err) = self.processor.refresh_pending_count().await {
                warn!(error = %err, "pending count refresh failed");
            }
        }
    }
}

/// Handles for the engine's background tasks. Dropping this without calling
/// [`EngineTasks::shutdown`] also stops the tasks at their next wake-up.
#[derive(Debug)]
pub struct EngineTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl EngineTasks {
    /// Signals every task and waits for them. An in-flight drain is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "engine task ended abnormally");
            }
        }
        info!("sync engine stopped");
    }
}
