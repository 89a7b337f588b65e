use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorClass;

use super::{MutationAction, OutboxEntry};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Draining,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    OnlineTransition,
    Manual,
    Periodic,
    Background,
}

impl TriggerSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnlineTransition => "online_transition",
            Self::Manual => "manual",
            Self::Periodic => "periodic",
            Self::Background => "background",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyDraining,
    Offline,
    MissingCredential,
}

/// Result of one drain attempt. Failures are reported here, never as `Err`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrainOutcome {
    Skipped {
        reason: SkipReason,
    },
    Empty,
    Completed {
        submitted: usize,
        acknowledged: usize,
        removed: usize,
    },
    Failed {
        class: ErrorClass,
        message: String,
    },
}

impl DrainOutcome {
    pub fn removed(&self) -> usize {
        match self {
            Self::Completed { removed, .. } => *removed,
            _ => 0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Wire shape of one queued mutation inside a reconciliation batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub action: MutationAction,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl From<&OutboxEntry> for BatchItem {
    fn from(entry: &OutboxEntry) -> Self {
        Self {
            id: entry.id,
            entry_type: entry.entry_type.clone(),
            action: entry.action,
            payload: entry.payload.clone(),
            timestamp: entry.created_at,
        }
    }
}

/// Ids the remote authority durably committed.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BatchAck {
    #[serde(default)]
    pub committed_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCompleted {
    pub removed: usize,
    pub remaining: u64,
    pub source: TriggerSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub drains_completed: u64,
    pub entries_confirmed: u64,
}
