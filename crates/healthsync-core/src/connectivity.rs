//! Observable reachability plus pending count. The monitor performs no I/O; hosts
//! feed it signals through [`ConnectivityMonitor::report`].

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::{ConnectivityState, Reachability};

#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    online_edges: watch::Sender<u64>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Reachability) -> Self {
        let (state, _) = watch::channel(ConnectivityState {
            is_online: initial.is_online(),
            pending_count: 0,
        });
        let (online_edges, _) = watch::channel(0);
        Self {
            state,
            online_edges,
        }
    }

    /// Applies a host signal. Returns `true` only for an offline to online edge;
    /// repeated signals in the same direction change nothing.
    pub fn report(&self, reachability: Reachability) -> bool {
        let online = reachability.is_online();
        let mut came_online = false;
        let changed = self.state.send_if_modified(|state| {
            if state.is_online == online {
                return false;
            }
            came_online = online;
            state.is_online = online;
            true
        });
        if changed {
            info!(online, "reachability changed");
        }
        if came_online {
            self.online_edges
                .send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        }
        came_online
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().is_online
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn set_pending_count(&self, pending_count: u64) {
        self.state.send_if_modified(|state| {
            if state.pending_count == pending_count {
                return false;
            }
            state.pending_count = pending_count;
            true
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Epoch counter bumped on every offline to online edge.
    pub fn subscribe_online_edges(&self) -> watch::Receiver<u64> {
        self.online_edges.subscribe()
    }

    /// Waits for the next online edge, then for `quiet` to pass without another
    /// edge. Returns `true` if the monitor is still online at that point, `false`
    /// if the monitor was dropped.
    pub(crate) async fn next_settled_online(
        &self,
        edges: &mut watch::Receiver<u64>,
        quiet: Duration,
    ) -> bool {
        loop {
            if edges.changed().await.is_err() {
                return false;
            }
            edges.borrow_and_update();
            if !quiet.is_zero() {
                loop {
                    tokio::select! {
                        changed = edges.changed() => {
                            if changed.is_err() {
                                return false;
                            }
                            edges.borrow_and_update();
                            debug!("online edge collapsed into pending transition");
                        }
                        () = tokio::time::sleep(quiet) => break,
                    }
                }
            }
            if self.is_online() {
                return true;
            }
        }
    }
}
