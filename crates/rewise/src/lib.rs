pub mod binding;
pub mod channel;
pub mod config;
pub mod error;
pub mod geo;
pub mod logging;
pub mod processor;
pub mod protocol;
pub mod store;
mod sync;
pub mod transform;

pub use binding::{AnalysisSession, AnalysisView, SessionStart, StoreBroadcaster, StoreSync};
pub use channel::{ChannelEvent, ChannelState, ConnectionChannel};
pub use config::{load_config, ClientConfig, GeolocationConfig};
pub use error::{ChannelError, ConfigError, ProcessorError, Result, RewiseError};
pub use geo::{resolve_location, FixedLocation, LocationError, LocationProvider, NoLocation};
pub use logging::{init_logging, LogFormat};
pub use processor::{ProcessorState, TaskHandler, TaskProcessor, TerminalReason};
pub use protocol::{
    ErrorMessage, GeoLocation, ProcessComplete, StepStatus, StepUpdate, TaskRequest,
    WebSocketMessage,
};
pub use store::{AnalysisStore, GlobalState, InputData, ProcessingStep, StateSnapshot};
pub use transform::{DisposalPath, FinalAnalysisResult, Priority, Recommendation};
