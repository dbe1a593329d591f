use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{StepStatus, StepUpdate, TaskRequest};

/// The store's projection of a step update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStep {
    pub id: String,
    pub title: String,
    pub status: StepStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl From<&StepUpdate> for ProcessingStep {
    fn from(update: &StepUpdate) -> Self {
        Self {
            id: update.step.clone(),
            title: update.title.clone(),
            status: update.status,
            description: update.description.clone(),
            result: update.result.clone(),
            error: update.error.clone(),
            timestamp: if update.timestamp.is_empty() {
                None
            } else {
                Some(update.timestamp.clone())
            },
        }
    }
}

/// The request that produced the current state, kept for same-run detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputData {
    pub image: Option<String>,
    pub description: Option<String>,
}

impl InputData {
    /// Returns true if `request` carries the same image and description.
    pub fn matches(&self, request: &TaskRequest) -> bool {
        self.image == request.image_url && self.description == request.text_description
    }
}

impl From<&TaskRequest> for InputData {
    fn from(request: &TaskRequest) -> Self {
        Self {
            image: request.image_url.clone(),
            description: request.text_description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    pub analysis_result: Option<Value>,
    pub input_data: Option<InputData>,
    pub is_analysis_complete: bool,
    /// Insertion order is first-seen order.
    pub processing_steps: Vec<ProcessingStep>,
}

/// A copy of the state as of one mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Count of mutations applied so far; increases by one per mutation.
    pub revision: u64,
    #[serde(flatten)]
    pub state: GlobalState,
}

impl Deref for StateSnapshot {
    type Target = GlobalState;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}
