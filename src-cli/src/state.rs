//! Shared state for one CLI invocation.

use std::sync::Arc;

use rewise::{AnalysisSession, AnalysisStore, ClientConfig, StoreBroadcaster};

/// Everything a run needs, wired to a single store.
pub struct AppState {
    pub config: ClientConfig,

    /// Store the session writes into and the printer reads from.
    pub store: Arc<AnalysisStore>,

    /// Snapshot fan-out for the progress printer.
    pub broadcaster: Arc<StoreBroadcaster>,

    pub session: AnalysisSession,
}

impl AppState {
    pub fn new(config: ClientConfig) -> Self {
        let store = Arc::new(AnalysisStore::new());
        let broadcaster = Arc::new(StoreBroadcaster::attach(&store, config.broadcast_capacity));
        let session = AnalysisSession::new(config.clone(), Arc::clone(&store));

        Self {
            config,
            store,
            broadcaster,
            session,
        }
    }
}
