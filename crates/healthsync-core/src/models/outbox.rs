use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for MutationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationAction {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unsupported mutation action: {other}")),
        }
    }
}

/// A queued mutation. Entries are immutable once stored; `id` is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub action: MutationAction,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_action_round_trips_through_str() {
        for action in [
            MutationAction::Create,
            MutationAction::Update,
            MutationAction::Delete,
        ] {
            assert_eq!(action.as_str().parse::<MutationAction>(), Ok(action));
        }
        assert_eq!(" Update ".parse::<MutationAction>(), Ok(MutationAction::Update));
        assert!("merge".parse::<MutationAction>().is_err());
    }

    #[test]
    fn outbox_entry_serializes_type_field_name() {
        let entry = OutboxEntry {
            id: 7,
            entry_type: "appointment".to_string(),
            action: MutationAction::Create,
            payload: serde_json::json!({"slot": "09:00"}),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["type"], "appointment");
        assert_eq!(value["action"], "create");
        assert!(value.get("entry_type").is_none());
    }
}
