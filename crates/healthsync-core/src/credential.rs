use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};

/// Bearer credential attached to every batch submission. Session management lives
/// outside the engine; the engine only asks whether one is usable right now.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(SyncError::Auth("credential token must not be empty".to_string()));
        }
        Ok(Self { token, expires_at })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    /// `None` when no session is established.
    fn current(&self) -> Option<Credential>;
}

#[derive(Debug, Clone)]
pub struct StaticCredential(Option<Credential>);

impl StaticCredential {
    pub fn new(credential: Credential) -> Self {
        Self(Some(credential))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredential {
    fn current(&self) -> Option<Credential> {
        self.0.clone()
    }
}

/// Credential slot the host updates as sessions start, refresh and end.
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl SharedCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, credential: Option<Credential>) {
        match self.inner.write() {
            Ok(mut slot) => *slot = credential,
            Err(poisoned) => *poisoned.into_inner() = credential,
        }
    }
}

impl CredentialProvider for SharedCredential {
    fn current(&self) -> Option<Credential> {
        match self.inner.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn debug_output_redacts_token() {
        let credential = Credential::new("secret-token", None).expect("credential");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn expiry_is_checked_against_the_given_instant() {
        let now = Utc::now();
        let credential =
            Credential::new("t", Some(now + Duration::minutes(5))).expect("credential");
        assert!(credential.is_valid_at(now));
        assert!(!credential.is_valid_at(now + Duration::minutes(5)));
        assert!(Credential::new("t", None).expect("no expiry").is_valid_at(now));
    }

    #[test]
    fn blank_tokens_are_rejected() {
        assert!(matches!(Credential::new("   ", None), Err(SyncError::Auth(_))));
    }

    #[test]
    fn shared_credential_tracks_updates() {
        let shared = SharedCredential::new();
        assert!(shared.current().is_none());
        shared.set(Some(Credential::new("a", None).expect("a")));
        assert_eq!(shared.current().map(|c| c.token().to_string()), Some("a".to_string()));
        shared.set(None);
        assert!(shared.current().is_none());
    }
}
