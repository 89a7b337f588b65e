//! Reconciliation state machine: `Idle -> Draining -> Idle`.
//!
//! A drain snapshots the outbox, submits the snapshot as one batch and removes
//! exactly the ids the remote authority confirmed. There is no backoff state; a
//! failed drain returns to `Idle` and waits for the next trigger.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connectivity::ConnectivityMonitor;
use crate::credential::{Credential, CredentialProvider};
use crate::error::Result;
use crate::models::{
    BatchItem, DrainOutcome, SkipReason, SyncCompleted, SyncPhase, SyncStatus, TriggerSource,
};
use crate::outbox::Outbox;
use crate::remote::RemoteAuthority;

mod observers;

pub use observers::{SubscriptionId, SyncObservers};

pub struct SyncProcessor {
    outbox: Arc<Outbox>,
    remote: Arc<dyn RemoteAuthority>,
    credentials: Arc<dyn CredentialProvider>,
    monitor: Arc<ConnectivityMonitor>,
    observers: Arc<SyncObservers>,
    status: Mutex<SyncStatus>,
}

impl std::fmt::Debug for SyncProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProcessor")
            .field("outbox", &self.outbox)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Restores `Idle` on every exit path of a drain.
struct DrainGuard<'a> {
    status: &'a Mutex<SyncStatus>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        lock_status(self.status).phase = SyncPhase::Idle;
    }
}

impl SyncProcessor {
    pub fn new(
        outbox: Arc<Outbox>,
        remote: Arc<dyn RemoteAuthority>,
        credentials: Arc<dyn CredentialProvider>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            outbox,
            remote,
            credentials,
            monitor,
            observers: Arc::new(SyncObservers::new()),
            status: Mutex::new(SyncStatus::default()),
        }
    }

    pub fn observers(&self) -> &Arc<SyncObservers> {
        &self.observers
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    pub fn status(&self) -> SyncStatus {
        lock_status(&self.status).clone()
    }

    pub fn phase(&self) -> SyncPhase {
        lock_status(&self.status).phase
    }

    /// One drain attempt. Never returns an error: failures end the drain with the
    /// outbox untouched and are reported in the outcome and the logs.
    pub async fn drain(&self, source: TriggerSource) -> DrainOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!(%source, "drain skipped: already draining");
            return DrainOutcome::Skipped {
                reason: SkipReason::AlreadyDraining,
            };
        };
        if !self.monitor.is_online() {
            debug!(%source, "drain skipped: offline");
            return DrainOutcome::Skipped {
                reason: SkipReason::Offline,
            };
        }
        let Some(credential) = self
            .credentials
            .current()
            .filter(|credential| credential.is_valid_at(Utc::now()))
        else {
            warn!(%source, "drain skipped: no valid credential");
            return DrainOutcome::Skipped {
                reason: SkipReason::MissingCredential,
            };
        };

        let drain_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        lock_status(&self.status).last_attempt_at = Some(Utc::now());

        let outcome = match self.submit_snapshot(&drain_id, &credential).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    drain_id = %drain_id,
                    %source,
                    code = err.code(),
                    error = %err,
                    "drain failed; outbox left for the next trigger"
                );
                DrainOutcome::Failed {
                    class: err.class(),
                    message: err.to_string(),
                }
            }
        };
        self.record_outcome(&outcome);

        let remaining = match self.refresh_pending_count().await {
            Ok(remaining) => remaining,
            Err(err) => {
                warn!(drain_id = %drain_id, error = %err, "pending count refresh failed");
                self.monitor.state().pending_count
            }
        };

        if let DrainOutcome::Completed { removed, .. } = outcome {
            self.observers.publish(&SyncCompleted {
                removed,
                remaining,
                source,
            });
        }
        info!(
            drain_id = %drain_id,
            %source,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            removed = outcome.removed(),
            remaining,
            "drain finished"
        );
        outcome
    }

    /// Recomputes the outbox cardinality and publishes it on the monitor.
    pub async fn refresh_pending_count(&self) -> Result<u64> {
        let pending = self.outbox.pending_count().await?;
        self.monitor.set_pending_count(pending);
        Ok(pending)
    }

    async fn submit_snapshot(&self, drain_id: &str, credential: &Credential) -> Result<DrainOutcome> {
        let snapshot = self.outbox.list_pending().await?;
        if snapshot.is_empty() {
            debug!(drain_id, "outbox empty; nothing to submit");
            return Ok(DrainOutcome::Empty);
        }

        let items = snapshot.iter().map(BatchItem::from).collect::<Vec<_>>();
        let submitted = items.iter().map(|item| item.id).collect::<HashSet<_>>();
        debug!(drain_id, submitted = items.len(), "submitting outbox snapshot");
        let ack = self.remote.submit_batch(credential, &items).await?;

        let mut confirmed = HashSet::new();
        let mut removed = 0;
        for id in ack.committed_ids {
            if !submitted.contains(&id) {
                warn!(drain_id, id, "remote confirmed an id outside the snapshot; ignored");
                continue;
            }
            if !confirmed.insert(id) {
                continue;
            }
            if self.outbox.remove(id).await? {
                removed += 1;
            }
        }

        Ok(DrainOutcome::Completed {
            submitted: items.len(),
            acknowledged: confirmed.len(),
            removed,
        })
    }

    fn try_begin(&self) -> Option<DrainGuard<'_>> {
        let mut status = lock_status(&self.status);
        if status.phase == SyncPhase::Draining {
            return None;
        }
        status.phase = SyncPhase::Draining;
        Some(DrainGuard {
            status: &self.status,
        })
    }

    fn record_outcome(&self, outcome: &DrainOutcome) {
        let mut status = lock_status(&self.status);
        match outcome {
            DrainOutcome::Completed { removed, .. } => {
                status.last_success_at = Some(Utc::now());
                status.last_error = None;
                status.drains_completed = status.drains_completed.saturating_add(1);
                status.entries_confirmed = status
                    .entries_confirmed
                    .saturating_add(u64::try_from(*removed).unwrap_or(u64::MAX));
            }
            DrainOutcome::Empty => {
                status.last_success_at = Some(Utc::now());
                status.last_error = None;
                status.drains_completed = status.drains_completed.saturating_add(1);
            }
            DrainOutcome::Failed { message, .. } => {
                status.last_error = Some(message.clone());
            }
            DrainOutcome::Skipped { .. } => {}
        }
    }
}

fn lock_status(status: &Mutex<SyncStatus>) -> MutexGuard<'_, SyncStatus> {
    match status.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
