use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::models::SyncCompleted;

type Callback = Arc<dyn Fn(&SyncCompleted) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Explicit publish/subscribe list for drain completions.
#[derive(Default)]
pub struct SyncObservers {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, Callback)>>,
}

impl std::fmt::Debug for SyncObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncObservers")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl SyncObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SyncCompleted) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SyncCompleted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |event| {
            let _ = tx.send(*event);
        });
        (id, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Callbacks run outside the lock, so they may subscribe or unsubscribe.
    pub(crate) fn publish(&self, event: &SyncCompleted) {
        let snapshot = self
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect::<Vec<_>>();
        for callback in snapshot {
            callback(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Callback)>> {
        match self.callbacks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
