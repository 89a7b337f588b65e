//! Best-effort request that the host platform wakes the engine for a drain while
//! the application is not in the foreground.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// Host capability for periodic background work.
#[async_trait]
pub trait BackgroundScheduler: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn register(&self, tag: &str, min_interval: Duration) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum BackgroundRegistration {
    Registered,
    Unsupported,
    Failed(String),
}

impl BackgroundRegistration {
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered)
    }
}

/// Never fails. Without a scheduler, or when registration is refused, syncing
/// continues on foreground triggers only.
pub async fn register_background_sync(
    scheduler: Option<&dyn BackgroundScheduler>,
    tag: &str,
    min_interval: Duration,
) -> BackgroundRegistration {
    let Some(scheduler) = scheduler else {
        info!(tag, "no background scheduler; foreground sync only");
        return BackgroundRegistration::Unsupported;
    };
    if !scheduler.is_supported() {
        info!(tag, "background sync unsupported on this host; foreground sync only");
        return BackgroundRegistration::Unsupported;
    }
    match scheduler.register(tag, min_interval).await {
        Ok(()) => {
            info!(
                tag,
                min_interval_ms = u64::try_from(min_interval.as_millis()).unwrap_or(u64::MAX),
                "background sync registered"
            );
            BackgroundRegistration::Registered
        }
        Err(err) => {
            warn!(tag, error = %err, "background sync registration failed; foreground sync only");
            BackgroundRegistration::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::SyncError;

    struct FakeScheduler {
        supported: bool,
        refuse: bool,
        registered: Mutex<Vec<(String, Duration)>>,
    }

    impl FakeScheduler {
        fn new(supported: bool, refuse: bool) -> Self {
            Self {
                supported,
                refuse,
                registered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BackgroundScheduler for FakeScheduler {
        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn register(&self, tag: &str, min_interval: Duration) -> Result<()> {
            if self.refuse {
                return Err(SyncError::Internal("permission denied".to_string()));
            }
            self.registered
                .lock()
                .expect("registered lock")
                .push((tag.to_string(), min_interval));
            Ok(())
        }
    }

    #[tokio::test]
    async fn registers_when_supported() {
        let scheduler = FakeScheduler::new(true, false);
        let outcome =
            register_background_sync(Some(&scheduler), "outbox", Duration::from_secs(900)).await;
        assert!(outcome.is_registered());
        assert_eq!(
            scheduler.registered.lock().expect("lock").as_slice(),
            &[("outbox".to_string(), Duration::from_secs(900))]
        );
    }

    #[tokio::test]
    async fn degrades_without_crashing() {
        let none = register_background_sync(None, "outbox", Duration::from_secs(60)).await;
        assert_eq!(none, BackgroundRegistration::Unsupported);

        let unsupported = FakeScheduler::new(false, false);
        let outcome =
            register_background_sync(Some(&unsupported), "outbox", Duration::from_secs(60)).await;
        assert_eq!(outcome, BackgroundRegistration::Unsupported);
        assert!(unsupported.registered.lock().expect("lock").is_empty());

        let refusing = FakeScheduler::new(true, true);
        let outcome =
            register_background_sync(Some(&refusing), "outbox", Duration::from_secs(60)).await;
        assert!(matches!(outcome, BackgroundRegistration::Failed(reason) if reason.contains("permission denied")));
    }
}
