//! Shared test utilities for rewise integration tests.
//!
//! This module provides:
//! - `MockUpstream`, a scripted local WebSocket server standing in for the
//!   analysis service
//! - `Recording`, a handler that keeps every callback in delivery order
//! - Builders for wire frames and analysis results

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
