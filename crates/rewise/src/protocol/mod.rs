//! Wire types exchanged with the upstream analysis service.

pub mod message;
pub mod request;

pub use message::{
    classify, ErrorMessage, Inbound, ProcessComplete, StepStatus, StepUpdate, WebSocketMessage,
};
pub use request::{GeoLocation, TaskRequest};
