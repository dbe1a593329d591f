use serde_json::Value;

use crate::store::{AnalysisStore, InputData, ProcessingStep, StateSnapshot};
use crate::transform::{self, FinalAnalysisResult, ItemSummary, Recommendation};

/// Read accessor over one store snapshot, with the derived view-models.
#[derive(Debug, Clone)]
pub struct AnalysisView {
    snapshot: StateSnapshot,
    result: Option<FinalAnalysisResult>,
}

impl AnalysisView {
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        let result = snapshot
            .analysis_result
            .as_ref()
            .map(FinalAnalysisResult::from_value);
        Self { snapshot, result }
    }

    pub fn current(store: &AnalysisStore) -> Self {
        Self::from_snapshot(store.snapshot())
    }

    pub fn revision(&self) -> u64 {
        self.snapshot.revision
    }

    pub fn analysis_result(&self) -> Option<&Value> {
        self.snapshot.analysis_result.as_ref()
    }

    pub fn input_data(&self) -> Option<&InputData> {
        self.snapshot.input_data.as_ref()
    }

    pub fn is_analysis_complete(&self) -> bool {
        self.snapshot.is_analysis_complete
    }

    pub fn processing_steps(&self) -> &[ProcessingStep] {
        &self.snapshot.processing_steps
    }

    pub fn item_summary(&self) -> Option<ItemSummary> {
        self.result.as_ref().map(transform::item_summary)
    }

    pub fn primary_recommendation(&self) -> Option<String> {
        self.result.as_ref().map(transform::primary_recommendation)
    }

    /// Empty until a result is available.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.result
            .as_ref()
            .map(transform::recommendations)
            .unwrap_or_default()
    }
}
