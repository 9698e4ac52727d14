//! Shapes of the structured model outputs and of the finished analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Neutral score used for every signal axis when scoring fails
pub const NEUTRAL_SIGNAL: f32 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub overview: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub implications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type", alias = "entity_type", default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_mentions")]
    pub mentions: u32,
    #[serde(default)]
    pub importance: f32,
}

fn default_entity_type() -> String {
    "concept".to_string()
}

fn default_mentions() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(alias = "from")]
    pub source: String,
    #[serde(alias = "to")]
    pub target: String,
    #[serde(alias = "type", alias = "rel_type")]
    pub relation: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_strength")]
    pub strength: f32,
}

fn default_strength() -> f32 {
    0.5
}

/// Six-axis document scoring on a 0-100 scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub urgency: f32,
    pub impact: f32,
    pub risk: f32,
    pub opportunity: f32,
    pub complexity: f32,
    pub sentiment: f32,
}

impl SignalScores {
    pub fn neutral() -> Self {
        Self {
            urgency: NEUTRAL_SIGNAL,
            impact: NEUTRAL_SIGNAL,
            risk: NEUTRAL_SIGNAL,
            opportunity: NEUTRAL_SIGNAL,
            complexity: NEUTRAL_SIGNAL,
            sentiment: NEUTRAL_SIGNAL,
        }
    }

    pub fn clamped(self) -> Self {
        let c = |v: f32| if v.is_finite() { v.clamp(0.0, 100.0) } else { NEUTRAL_SIGNAL };
        Self {
            urgency: c(self.urgency),
            impact: c(self.impact),
            risk: c(self.risk),
            opportunity: c(self.opportunity),
            complexity: c(self.complexity),
            sentiment: c(self.sentiment),
        }
    }
}

impl Default for SignalScores {
    fn default() -> Self {
        Self::neutral()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    /// Written by a model call
    Model,
    /// Section too short to be worth a call
    Truncated,
    /// The model call failed and the truncation was used instead
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section_id: String,
    pub title: String,
    pub summary: String,
    pub source: SummarySource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VizRecommendation {
    pub viz_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindMapNode {
    pub label: String,
    #[serde(default)]
    pub children: Vec<MindMapNode>,
}

/// A JSON list the model may return bare or wrapped in a single-key object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListPayload<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(
            alias = "entities",
            alias = "relationships",
            alias = "recommendations"
        )]
        items: Vec<T>,
    },
}

impl<T> ListPayload<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListPayload::Bare(items) | ListPayload::Wrapped { items } => items,
        }
    }
}

/// The finished analysis handed back to the caller, who owns persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub document_id: Option<String>,
    pub title: String,
    pub tldr: String,
    pub executive_summary: ExecutiveSummary,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub signals: SignalScores,
    pub section_summaries: Vec<SectionSummary>,
    pub recommendations: Vec<VizRecommendation>,
    /// Advisory stages that fell back to their documented default
    pub degraded_stages: Vec<String>,
    /// Best-effort sum over every call of the run; not billing grade
    pub tokens_used: u64,
    pub analyzed_at: DateTime<Utc>,
}
