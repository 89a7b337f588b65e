use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("authentication failure: {0}")]
    Auth(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse taxonomy used to decide whether a failure reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Persistence,
    Transport,
    Auth,
    Invalid,
    Internal,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persistence => "persistence",
            Self::Transport => "transport",
            Self::Auth => "auth",
            Self::Invalid => "invalid",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub class: ErrorClass,
    pub message: String,
    pub operation: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl SyncError {
    pub(crate) fn mutex_poisoned(name: &str) -> Self {
        Self::Internal(format!("{name} lock poisoned"))
    }

    pub(crate) fn partition_not_open(partition: &str) -> Self {
        Self::Persistence(format!("partition is not open: {partition}"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Persistence(_) | Self::Io(_) | Self::Sqlite(_) => ErrorClass::Persistence,
            Self::Transport(_) | Self::Http(_) => ErrorClass::Transport,
            Self::Auth(_) => ErrorClass::Auth,
            Self::Validation(_) | Self::Json(_) | Self::Config(_) => ErrorClass::Invalid,
            Self::Internal(_) => ErrorClass::Internal,
        }
    }

    pub fn to_payload(&self, operation: impl Into<String>) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            class: self.class(),
            message: self.to_string(),
            operation: operation.into(),
            trace_id: Uuid::new_v4().to_string(),
            details: None,
        }
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking store task failed: {err}"))
    }
}
