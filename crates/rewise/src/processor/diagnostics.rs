//! Per-run diagnostic trail, gated by `debugLogging`.
//!
//! Nothing here influences control flow. The subscriber's formatter adds the
//! timestamp prefix.

use tracing::{info, warn};

use crate::protocol::{ErrorMessage, ProcessComplete, StepUpdate, TaskRequest};

const TARGET: &str = "rewise::task";

#[derive(Debug, Clone)]
pub struct Diagnostics {
    enabled: bool,
    run_id: String,
}

impl Diagnostics {
    pub fn new(enabled: bool, run_id: &str) -> Self {
        Self {
            enabled,
            run_id: run_id.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn connecting(&self, endpoint: &str) {
        if self.enabled {
            info!(target: TARGET, run_id = %self.run_id, endpoint, "Connecting to processing endpoint");
        }
    }

    pub fn connected(&self) {
        if self.enabled {
            info!(target: TARGET, run_id = %self.run_id, "Connection open");
        }
    }

    pub fn connect_failed(&self, error: &dyn std::fmt::Display) {
        if self.enabled {
            warn!(target: TARGET, run_id = %self.run_id, error = %error, "Connection failed");
        }
    }

    pub fn request_sent(&self, request: &TaskRequest) {
        if self.enabled {
            info!(
                target: TARGET,
                run_id = %self.run_id,
                has_description = request.text_description.is_some(),
                has_image = request.image_url.is_some(),
                has_location = request.user_location.is_some(),
                "Request sent"
            );
        }
    }

    pub fn send_failed(&self, error: &dyn std::fmt::Display) {
        if self.enabled {
            warn!(target: TARGET, run_id = %self.run_id, error = %error, "Failed to send request");
        }
    }

    pub fn step(&self, step: &StepUpdate) {
        if !self.enabled {
            return;
        }

        info!(
            target: TARGET,
            run_id = %self.run_id,
            step = %step.step,
            status = %step.status,
            title = %step.title,
            "Step update received"
        );
        info!(target: TARGET, run_id = %self.run_id, step = %step.step, description = %step.description, "Step detail");

        match &step.result {
            Some(result) => {
                let keys = result.as_object().map(|o| o.len()).unwrap_or(0);
                info!(target: TARGET, run_id = %self.run_id, step = %step.step, keys, "Step carries a result payload");
            }
            None => {
                info!(target: TARGET, run_id = %self.run_id, step = %step.step, "Step has no result payload");
            }
        }

        if let Some(error) = &step.error {
            warn!(target: TARGET, run_id = %self.run_id, step = %step.step, error = %error, "Step reported an error");
        }
    }

    pub fn complete(&self, message: &ProcessComplete) {
        if self.enabled {
            info!(target: TARGET, run_id = %self.run_id, message = %message.message, "Process complete");
        }
    }

    pub fn upstream_error(&self, message: &ErrorMessage) {
        if self.enabled {
            warn!(target: TARGET, run_id = %self.run_id, error = %message.error, "Upstream reported an error");
        }
    }

    pub fn unrecognized(&self, kind: Option<&str>) {
        if self.enabled {
            warn!(target: TARGET, run_id = %self.run_id, kind = kind.unwrap_or("<missing>"), "Unrecognized message type");
        }
    }

    pub fn malformed(&self, reason: &str) {
        if self.enabled {
            warn!(target: TARGET, run_id = %self.run_id, reason, "Dropping malformed message");
        }
    }

    pub fn after_terminal(&self) {
        if self.enabled {
            info!(target: TARGET, run_id = %self.run_id, "Ignoring message received after the run ended");
        }
    }

    pub fn closed(&self, reason: Option<&str>) {
        if self.enabled {
            info!(target: TARGET, run_id = %self.run_id, reason = reason.unwrap_or(""), "Connection closed");
        }
    }
}
