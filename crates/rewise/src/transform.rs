//! Derives display-ready records from a final analysis result.
//!
//! The upstream payload is treated leniently: fields the UI does not need
//! are ignored, and missing or oddly-typed ones fall back to defaults.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const FALLBACK_CATEGORY: &str = "未知类别";
const FALLBACK_BRAND: &str = "未知品牌";
const FALLBACK_CONDITION: &str = "状况未知";
const FALLBACK_AGE: &str = "使用年限未知";
const FALLBACK_DESCRIPTION: &str = "暂无描述";
const FALLBACK_PRIMARY: &str = "暂无推荐方案";

/// Typed view of the fields this crate reads from the upstream result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FinalAnalysisResult {
    #[serde(default)]
    pub item_analysis: ItemAnalysis,
    #[serde(default)]
    pub creative_solution: Option<PathSolution>,
    #[serde(default)]
    pub recycling_solution: Option<PathSolution>,
    #[serde(default)]
    pub secondhand_solution: Option<PathSolution>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub primary_recommendation: Option<String>,
}

impl FinalAnalysisResult {
    /// Reads the typed view out of a raw payload. A payload that is not an
    /// object yields the empty view.
    pub fn from_value(value: &Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Analysis result has an unexpected shape: {}", e);
                Self::default()
            }
        }
    }

    fn solution(&self, path: DisposalPath) -> Option<&PathSolution> {
        match path {
            DisposalPath::Creative => self.creative_solution.as_ref(),
            DisposalPath::Recycling => self.recycling_solution.as_ref(),
            DisposalPath::Secondhand => self.secondhand_solution.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemAnalysis {
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub material: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub estimated_age: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
}

/// One disposal path as reported upstream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PathSolution {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient_score")]
    pub recommendation_score: Option<f64>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let score = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    // "NaN" and "inf" parse as floats but are not scores.
    Ok(score.filter(|s| s.is_finite()))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(matches!(value, Some(Value::Bool(true))))
}

/// The three ways an item can be disposed of, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposalPath {
    Creative,
    Recycling,
    Secondhand,
}

impl DisposalPath {
    pub const ALL: [DisposalPath; 3] = [
        DisposalPath::Creative,
        DisposalPath::Recycling,
        DisposalPath::Secondhand,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            DisposalPath::Creative => "creative",
            DisposalPath::Recycling => "recycling",
            DisposalPath::Secondhand => "secondhand",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DisposalPath::Creative => "创意改造",
            DisposalPath::Recycling => "回收捐赠",
            DisposalPath::Secondhand => "二手交易",
        }
    }

    pub fn subtitle(&self) -> &'static str {
        match self {
            DisposalPath::Creative => "发挥创意，让旧物焕发新生",
            DisposalPath::Recycling => "环保回收，传递爱心",
            DisposalPath::Secondhand => "闲置变现，物尽其用",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            DisposalPath::Creative => "🎨",
            DisposalPath::Recycling => "♻️",
            DisposalPath::Secondhand => "💰",
        }
    }

    /// Detail page that presents this path.
    pub fn route(&self) -> &'static str {
        match self {
            DisposalPath::Creative => "/creative",
            DisposalPath::Recycling => "/recycle",
            DisposalPath::Secondhand => "/secondhand",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Highest,
    High,
    Medium,
}

impl Priority {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Priority::Highest
        } else if score >= 60.0 {
            Priority::High
        } else {
            Priority::Medium
        }
    }
}

/// Display metadata that differs per disposal path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDisplay {
    pub icon: &'static str,
    pub route: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: &'static str,
    pub path: DisposalPath,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub score: f64,
    pub priority: Priority,
    pub display: PathDisplay,
}

impl Recommendation {
    fn new(path: DisposalPath, score: f64) -> Self {
        Self {
            id: path.id(),
            path,
            title: path.title(),
            subtitle: path.subtitle(),
            score,
            priority: Priority::from_score(score),
            display: PathDisplay {
                icon: path.icon(),
                route: path.route(),
            },
        }
    }
}

/// Builds one record per successful path, highest score first.
///
/// Ties keep display order.
pub fn recommendations(result: &FinalAnalysisResult) -> Vec<Recommendation> {
    let mut list: Vec<Recommendation> = DisposalPath::ALL
        .iter()
        .filter_map(|path| {
            let solution = result.solution(*path)?;
            if !solution.success {
                return None;
            }
            Some(Recommendation::new(
                *path,
                solution.recommendation_score.unwrap_or(0.0),
            ))
        })
        .collect();

    list.sort_by(|a, b| b.score.total_cmp(&a.score));
    list
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub category: String,
    pub brand: String,
    pub condition: String,
    pub age: String,
    pub description: String,
}

pub fn item_summary(result: &FinalAnalysisResult) -> ItemSummary {
    let item = &result.item_analysis;
    let or = |field: &Option<String>, fallback: &str| {
        field.clone().unwrap_or_else(|| fallback.to_string())
    };

    ItemSummary {
        category: or(&item.category, FALLBACK_CATEGORY),
        brand: or(&item.brand, FALLBACK_BRAND),
        condition: or(&item.condition, FALLBACK_CONDITION),
        age: or(&item.estimated_age, FALLBACK_AGE),
        description: or(&item.description, FALLBACK_DESCRIPTION),
    }
}

pub fn primary_recommendation(result: &FinalAnalysisResult) -> String {
    result
        .primary_recommendation
        .clone()
        .unwrap_or_else(|| FALLBACK_PRIMARY.to_string())
}
