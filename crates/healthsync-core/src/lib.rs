// Public fallible APIs in this crate share one concrete error contract (`SyncError`).
// Repeating per-function `# Errors` boilerplate obscures behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod background;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod credential;
pub mod engine;
pub mod error;
pub mod models;
pub mod outbox;
pub mod processor;
pub mod remote;
pub mod store;

pub use background::{BackgroundRegistration, BackgroundScheduler, register_background_sync};
pub use cache::{CacheRecord, ReferenceCache};
pub use config::SyncConfig;
pub use connectivity::ConnectivityMonitor;
pub use credential::{Credential, CredentialProvider, SharedCredential, StaticCredential};
pub use engine::{EngineTasks, SyncEngine, SyncEngineBuilder};
pub use error::{ErrorClass, ErrorPayload, Result, SyncError};
pub use outbox::Outbox;
pub use processor::{SubscriptionId, SyncObservers, SyncProcessor};
pub use remote::{HttpRemoteAuthority, RemoteAuthority};
pub use store::{MemoryStore, SqliteStore, StoreBackend};
