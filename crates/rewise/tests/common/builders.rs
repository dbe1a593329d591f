//! Builders for upstream frames and analysis payloads.

#![allow(dead_code)]

use chrono::Utc;
use serde_json::{json, Value};

/// Builder for `step_update` frames.
pub struct StepFrame {
    step: String,
    title: String,
    status: String,
    description: String,
    result: Option<Value>,
    error: Option<String>,
}

impl StepFrame {
    pub fn new(step: &str) -> Self {
        Self {
            step: step.to_string(),
            title: format!("{} step", step),
            status: "running".to_string(),
            description: String::new(),
            result: None,
            error: None,
        }
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn build(self) -> Value {
        let mut frame = json!({
            "type": "step_update",
            "step": self.step,
            "title": self.title,
            "status": self.status,
            "description": self.description,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Some(result) = self.result {
            frame["result"] = result;
        }
        if let Some(error) = self.error {
            frame["error"] = Value::String(error);
        }
        frame
    }
}

pub fn process_complete(message: &str) -> Value {
    json!({
        "type": "process_complete",
        "message": message,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

pub fn error_frame(error: &str) -> Value {
    json!({
        "type": "error",
        "error": error,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// An analysis payload with the given path scores, all paths successful.
pub fn analysis_result(creative: u8, recycling: u8, secondhand: u8) -> Value {
    json!({
        "item_analysis": {
            "category": "家具",
            "brand": "无品牌",
            "condition": "轻微磨损",
            "material": "实木",
            "estimated_age": "5年",
            "description": "一把旧木椅"
        },
        "creative_solution": { "success": true, "recommendation_score": creative },
        "recycling_solution": { "success": true, "recommendation_score": recycling },
        "secondhand_solution": { "success": true, "recommendation_score": secondhand },
        "primary_recommendation": "建议捐赠"
    })
}
