pub mod diagnostics;
pub mod handler;
pub mod runner;

pub use diagnostics::Diagnostics;
pub use handler::{NoopHandler, TaskHandler};
pub use runner::{ProcessorState, TaskProcessor, TerminalReason};
