use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::outbox::DEFAULT_OUTBOX_PARTITION;

mod env;

use env::{EnvSource, ProcessEnv, read_env_u64, read_non_empty_env};

const ENV_REMOTE_BASE_URL: &str = "HEALTHSYNC_REMOTE_BASE_URL";
const ENV_REQUEST_TIMEOUT_MS: &str = "HEALTHSYNC_REQUEST_TIMEOUT_MS";
const ENV_PENDING_POLL_INTERVAL_MS: &str = "HEALTHSYNC_PENDING_POLL_INTERVAL_MS";
const ENV_PERIODIC_SYNC_INTERVAL_MS: &str = "HEALTHSYNC_PERIODIC_SYNC_INTERVAL_MS";
const ENV_ONLINE_DEBOUNCE_MS: &str = "HEALTHSYNC_ONLINE_DEBOUNCE_MS";
const ENV_OUTBOX_PARTITION: &str = "HEALTHSYNC_OUTBOX_PARTITION";
const ENV_BACKGROUND_TAG: &str = "HEALTHSYNC_BACKGROUND_TAG";
const ENV_BACKGROUND_MIN_INTERVAL_MS: &str = "HEALTHSYNC_BACKGROUND_MIN_INTERVAL_MS";

const DEFAULT_REMOTE_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_PENDING_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_PERIODIC_SYNC_INTERVAL_MS: u64 = 60_000;
const DEFAULT_ONLINE_DEBOUNCE_MS: u64 = 750;
const DEFAULT_BACKGROUND_TAG: &str = "healthsync-outbox";
const DEFAULT_BACKGROUND_MIN_INTERVAL_MS: u64 = 15 * 60 * 1_000;

/// Engine settings, layered as defaults, then an optional TOML file, then
/// `HEALTHSYNC_*` environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub remote_base_url: String,
    pub request_timeout_ms: u64,
    pub pending_poll_interval_ms: u64,
    pub periodic_sync_interval_ms: u64,
    pub online_debounce_ms: u64,
    pub outbox_partition: String,
    pub background_tag: String,
    pub background_min_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_base_url: DEFAULT_REMOTE_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            pending_poll_interval_ms: DEFAULT_PENDING_POLL_INTERVAL_MS,
            periodic_sync_interval_ms: DEFAULT_PERIODIC_SYNC_INTERVAL_MS,
            online_debounce_ms: DEFAULT_ONLINE_DEBOUNCE_MS,
            outbox_partition: DEFAULT_OUTBOX_PARTITION.to_string(),
            background_tag: DEFAULT_BACKGROUND_TAG.to_string(),
            background_min_interval_ms: DEFAULT_BACKGROUND_MIN_INTERVAL_MS,
        }
    }
}

impl SyncConfig {
    /// Defaults, then `path` when given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&ProcessEnv);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            SyncError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| SyncError::Config(err.to_string()))
    }

    fn apply_env(&mut self, env: &dyn EnvSource) {
        if let Some(url) = read_non_empty_env(env, ENV_REMOTE_BASE_URL) {
            self.remote_base_url = url;
        }
        if let Some(partition) = read_non_empty_env(env, ENV_OUTBOX_PARTITION) {
            self.outbox_partition = partition;
        }
        if let Some(tag) = read_non_empty_env(env, ENV_BACKGROUND_TAG) {
            self.background_tag = tag;
        }
        // Zero disables the debounce window; every other interval must be positive.
        for (name, slot, min_value) in [
            (ENV_REQUEST_TIMEOUT_MS, &mut self.request_timeout_ms, 1),
            (
                ENV_PENDING_POLL_INTERVAL_MS,
                &mut self.pending_poll_interval_ms,
                1,
            ),
            (
                ENV_PERIODIC_SYNC_INTERVAL_MS,
                &mut self.periodic_sync_interval_ms,
                1,
            ),
            (ENV_ONLINE_DEBOUNCE_MS, &mut self.online_debounce_ms, 0),
            (
                ENV_BACKGROUND_MIN_INTERVAL_MS,
                &mut self.background_min_interval_ms,
                1,
            ),
        ] {
            if let Some(value) = read_env_u64(env, name, min_value) {
                *slot = value;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.remote_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "remote_base_url must be an http(s) url: {base}"
            )));
        }
        for (name, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("pending_poll_interval_ms", self.pending_poll_interval_ms),
            ("periodic_sync_interval_ms", self.periodic_sync_interval_ms),
            ("background_min_interval_ms", self.background_min_interval_ms),
        ] {
            if value == 0 {
                return Err(SyncError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.outbox_partition.starts_with(crate::cache::CACHE_NAMESPACE) {
            return Err(SyncError::Config(format!(
                "outbox_partition must not use the {} namespace",
                crate::cache::CACHE_NAMESPACE
            )));
        }
        crate::store::validate_partition_name(&self.outbox_partition)
            .map_err(|err| SyncError::Config(err.to_string()))?;
        if self.background_tag.trim().is_empty() {
            return Err(SyncError::Config("background_tag must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pending_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pending_poll_interval_ms)
    }

    pub fn periodic_sync_interval(&self) -> Duration {
        Duration::from_millis(self.periodic_sync_interval_ms)
    }

    /// Zero disables the quiet window; the drain is requested on the edge itself.
    pub fn online_debounce(&self) -> Duration {
        Duration::from_millis(self.online_debounce_ms)
    }

    pub fn background_min_interval(&self) -> Duration {
        Duration::from_millis(self.background_min_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.pending_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.outbox_partition, "outbox");
    }

    #[test]
    fn toml_overrides_only_named_fields() {
        let config = SyncConfig::from_toml_str(
            r#"
            remote_base_url = "https://api.example.test"
            online_debounce_ms = 200
            "#,
        )
        .expect("parse");
        assert_eq!(config.remote_base_url, "https://api.example.test");
        assert_eq!(config.online_debounce_ms, 200);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        let err = SyncConfig::from_toml_str("retry_ceiling = 3").expect_err("unknown key");
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn env_overrides_apply_trimmed_values_and_ignore_garbage() {
        let mut config = SyncConfig::default();
        let env = HashMap::from([
            (ENV_REMOTE_BASE_URL, "  https://sync.example.test  "),
            (ENV_PERIODIC_SYNC_INTERVAL_MS, " 30000 "),
            (ENV_REQUEST_TIMEOUT_MS, "fast"),
            (ENV_PENDING_POLL_INTERVAL_MS, "0"),
            (ENV_OUTBOX_PARTITION, "   "),
        ]);
        config.apply_env(&env);

        assert_eq!(config.remote_base_url, "https://sync.example.test");
        assert_eq!(config.periodic_sync_interval_ms, 30_000);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.pending_poll_interval_ms, DEFAULT_PENDING_POLL_INTERVAL_MS);
        assert_eq!(config.outbox_partition, DEFAULT_OUTBOX_PARTITION);
    }

    #[test]
    fn env_zero_debounce_disables_the_window() {
        let mut config = SyncConfig::default();
        let env = HashMap::from([
            (ENV_ONLINE_DEBOUNCE_MS, "0"),
            (ENV_BACKGROUND_MIN_INTERVAL_MS, "0"),
        ]);
        config.apply_env(&env);

        assert_eq!(config.online_debounce_ms, 0);
        assert_eq!(config.online_debounce(), Duration::ZERO);
        assert_eq!(
            config.background_min_interval_ms,
            DEFAULT_BACKGROUND_MIN_INTERVAL_MS
        );
        config.validate().expect("zero debounce from env validates");
    }

    #[test]
    fn validate_rejects_zero_intervals_and_bad_partitions() {
        let zero = SyncConfig {
            periodic_sync_interval_ms: 0,
            ..SyncConfig::default()
        };
        assert!(zero.validate().is_err());

        let cache_named = SyncConfig {
            outbox_partition: "cache.outbox".to_string(),
            ..SyncConfig::default()
        };
        assert!(cache_named.validate().is_err());

        let bad_url = SyncConfig {
            remote_base_url: "ftp://nowhere".to_string(),
            ..SyncConfig::default()
        };
        assert!(bad_url.validate().is_err());

        let no_debounce = SyncConfig {
            online_debounce_ms: 0,
            ..SyncConfig::default()
        };
        no_debounce.validate().expect("zero debounce is allowed");
    }
}
