use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of one upstream processing step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Progress report for a single step of the upstream pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepUpdate {
    /// Step identifier, stable across updates of the same step.
    pub step: String,
    pub title: String,
    pub status: StepStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub timestamp: String,
}

impl StepUpdate {
    /// Parses the RFC 3339 timestamp, if it is one.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessComplete {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorMessage {
    pub error: String,
    pub timestamp: String,
}

/// Upstream frames, discriminated by their `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebSocketMessage {
    StepUpdate(StepUpdate),
    ProcessComplete(ProcessComplete),
    Error(ErrorMessage),
}

const KNOWN_TYPES: [&str; 3] = ["step_update", "process_complete", "error"];

/// Outcome of classifying one parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(WebSocketMessage),
    /// The frame's `type` is missing or not one of the known tags.
    Unrecognized(Option<String>),
    /// The frame carries a known tag but does not match its shape.
    Malformed(String),
}

/// Sorts a JSON frame into a known message, an unknown tag, or a malformed frame.
pub fn classify(value: Value) -> Inbound {
    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => return Inbound::Unrecognized(None),
    };

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Inbound::Unrecognized(Some(kind));
    }

    match serde_json::from_value::<WebSocketMessage>(value) {
        Ok(message) => Inbound::Message(message),
        Err(e) => Inbound::Malformed(format!("{} frame: {}", kind, e)),
    }
}
