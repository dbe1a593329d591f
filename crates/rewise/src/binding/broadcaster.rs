//! Re-publishes store snapshots on a broadcast channel.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::store::{AnalysisStore, StateSnapshot, Unsubscribe};
use crate::sync::lock;

/// Fans store changes out to any number of async subscribers.
pub struct StoreBroadcaster {
    sender: Arc<broadcast::Sender<StateSnapshot>>,
    subscription: Mutex<Option<Unsubscribe>>,
}

impl StoreBroadcaster {
    /// Subscribes to `store` and forwards every snapshot.
    pub fn attach(store: &AnalysisStore, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let sender = Arc::new(sender);

        let forward = Arc::clone(&sender);
        let subscription = store.add_state_change_listener(move |snapshot| {
            // Ignore errors - no active receivers is fine
            let _ = forward.send(snapshot.clone());
        });

        Self {
            sender,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Creates a new receiver for store snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stops forwarding. Existing receivers see the channel close once the
    /// broadcaster is dropped.
    pub fn detach(&self) {
        if let Some(subscription) = lock(&self.subscription, "Broadcaster subscription").take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for StoreBroadcaster {
    fn drop(&mut self) {
        self.detach();
    }
}
