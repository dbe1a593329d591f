use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::store::state::StateSnapshot;
use crate::sync::lock;

pub(crate) type Listener = Arc<dyn Fn(&StateSnapshot) + Send + Sync>;

pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners, "Store listeners").push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut listeners = lock(&self.listeners, "Store listeners");
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.listeners, "Store listeners").len()
    }

    /// Calls every listener once. The registry lock is not held while
    /// listeners run, so they may subscribe or unsubscribe.
    pub(crate) fn notify(&self, snapshot: &StateSnapshot) {
        let listeners: Vec<(u64, Listener)> = lock(&self.listeners, "Store listeners").clone();

        for (id, listener) in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(snapshot))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("State listener {} failed: {}", id, message);
            }
        }
    }
}

/// Removes a state listener when [`Unsubscribe::unsubscribe`] is called.
///
/// Dropping the handle leaves the listener registered.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Unsubscribe {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Unsubscribe {
    pub(crate) fn new(id: u64, registry: Weak<ListenerRegistry>) -> Self {
        Self { id, registry }
    }

    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}
