mod connectivity;
mod outbox;
mod sync;

pub use connectivity::{ConnectivityState, Reachability};
pub use outbox::{MutationAction, OutboxEntry};
pub use sync::{
    BatchAck, BatchItem, DrainOutcome, SkipReason, SyncCompleted, SyncPhase, SyncStatus,
    TriggerSource,
};
