use serde::{Deserialize, Serialize};

/// Host reachability signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reachability {
    Online,
    Offline,
}

impl Reachability {
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// `pending_count` mirrors the outbox cardinality at the last recompute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConnectivityState {
    pub is_online: bool,
    pub pending_count: u64,
}
