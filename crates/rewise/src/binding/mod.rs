//! Adapters between the analysis store and presentation code.

pub mod broadcaster;
pub mod session;
pub mod view;

pub use broadcaster::StoreBroadcaster;
pub use session::{AnalysisSession, SessionStart, StoreSync, FINAL_STEP_ID};
pub use view::AnalysisView;
