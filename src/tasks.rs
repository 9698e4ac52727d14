//! Static per-task model configuration.
//!
//! Each logical task the pipeline issues (tldr, entity extraction, ...) has a
//! primary and a fallback model plus its own sampling settings and system
//! prompt. The table is built once at start-up and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const FAST_MODEL: &str = "openai/gpt-4o-mini";
const STRONG_MODEL: &str = "anthropic/claude-3.5-sonnet";
const FALLBACK_MODEL: &str = "meta-llama/llama-3.1-70b-instruct";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Tldr,
    ExecutiveSummary,
    EntityExtraction,
    RelationshipDetection,
    SignalAnalysis,
    SectionSummary,
    VizRecommendation,
    MindMapGeneration,
}

impl TaskType {
    pub const ALL: [TaskType; 8] = [
        TaskType::Tldr,
        TaskType::ExecutiveSummary,
        TaskType::EntityExtraction,
        TaskType::RelationshipDetection,
        TaskType::SignalAnalysis,
        TaskType::SectionSummary,
        TaskType::VizRecommendation,
        TaskType::MindMapGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Tldr => "tldr",
            TaskType::ExecutiveSummary => "executive_summary",
            TaskType::EntityExtraction => "entity_extraction",
            TaskType::RelationshipDetection => "relationship_detection",
            TaskType::SignalAnalysis => "signal_analysis",
            TaskType::SectionSummary => "section_summary",
            TaskType::VizRecommendation => "viz_recommendation",
            TaskType::MindMapGeneration => "mind_map_generation",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub primary_model: String,
    pub fallback_model: String,
    /// `None` lets the context budgeter size the output
    pub max_tokens: Option<u32>,
    pub temperature: f32,
    pub system_prompt: String,
}

/// Partial override read from `[tasks.<name>]` in the config file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskOverride {
    pub primary_model: Option<String>,
    pub fallback_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TaskRegistry {
    configs: HashMap<TaskType, TaskConfig>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}

impl TaskRegistry {
    pub fn defaults() -> Self {
        let configs = TaskType::ALL
            .iter()
            .map(|t| (*t, default_task_config(*t)))
            .collect();
        Self { configs }
    }

    pub fn with_overrides(overrides: &HashMap<TaskType, TaskOverride>) -> Self {
        let mut registry = Self::defaults();
        for (task, ov) in overrides {
            let cfg = registry
                .configs
                .entry(*task)
                .or_insert_with(|| default_task_config(*task));
            if let Some(m) = &ov.primary_model {
                cfg.primary_model = m.clone();
            }
            if let Some(m) = &ov.fallback_model {
                cfg.fallback_model = m.clone();
            }
            if ov.max_tokens.is_some() {
                cfg.max_tokens = ov.max_tokens;
            }
            if let Some(t) = ov.temperature {
                cfg.temperature = t;
            }
            if let Some(p) = &ov.system_prompt {
                cfg.system_prompt = p.clone();
            }
        }
        registry
    }

    pub fn get(&self, task: TaskType) -> &TaskConfig {
        // Every variant is inserted by `defaults()`
        &self.configs[&task]
    }
}

fn default_task_config(task: TaskType) -> TaskConfig {
    let (primary, max_tokens, temperature, prompt) = match task {
        TaskType::Tldr => (
            FAST_MODEL,
            Some(300),
            0.3,
            "You write a TL;DR of the document in two or three plain sentences. \
             Respond with the summary text only, no headings or markdown.",
        ),
        TaskType::ExecutiveSummary => (
            STRONG_MODEL,
            Some(1500),
            0.3,
            "You write executive summaries. Respond with a single JSON object: \
             {\"overview\": string, \"key_points\": [string], \"implications\": [string]}. \
             No commentary outside the JSON.",
        ),
        TaskType::EntityExtraction => (
            FAST_MODEL,
            None,
            0.1,
            "You extract named entities (people, organizations, places, products, concepts). \
             Respond with a JSON array of objects: \
             {\"name\": string, \"type\": string, \"description\": string, \"mentions\": integer, \"importance\": number between 0 and 1}. \
             No commentary outside the JSON.",
        ),
        TaskType::RelationshipDetection => (
            FAST_MODEL,
            None,
            0.1,
            "You find relationships between the listed entities as they appear in the document. \
             Respond with a JSON array of objects: \
             {\"source\": string, \"target\": string, \"relation\": string, \"description\": string, \"strength\": number between 0 and 1}. \
             Only use entity names from the provided list. No commentary outside the JSON.",
        ),
        TaskType::SignalAnalysis => (
            FAST_MODEL,
            Some(400),
            0.2,
            "You score the document on six axes from 0 to 100: urgency, impact, risk, \
             opportunity, complexity, sentiment (0 = very negative, 100 = very positive). \
             Respond with a single JSON object with exactly those six integer fields.",
        ),
        TaskType::SectionSummary => (
            FAST_MODEL,
            Some(250),
            0.3,
            "You summarize one section of a larger document in one or two sentences. \
             Respond with the summary text only.",
        ),
        TaskType::VizRecommendation => (
            FAST_MODEL,
            Some(800),
            0.4,
            "You recommend visualizations for a document analysis. Respond with a JSON array of objects: \
             {\"viz_type\": string, \"title\": string, \"rationale\": string, \"priority\": integer 1-5}. \
             Allowed viz_type values: radar_chart, network_graph, entity_bar_chart, timeline, mind_map, heatmap.",
        ),
        TaskType::MindMapGeneration => (
            STRONG_MODEL,
            None,
            0.4,
            "You build a mind map of the document. Respond with a single JSON object \
             {\"label\": string, \"children\": [ ...same shape... ]} at most three levels deep.",
        ),
    };

    TaskConfig {
        primary_model: primary.to_string(),
        fallback_model: FALLBACK_MODEL.to_string(),
        max_tokens,
        temperature,
        system_prompt: prompt.to_string(),
    }
}
