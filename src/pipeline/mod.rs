//! Multi-stage document analysis.
//!
//! Stages run in a fixed order. Independent calls inside a stage run
//! concurrently and hand back plain values that are merged once, so no
//! branch ever writes shared state. Essential stages (tldr, executive
//! summary) abort the run on failure; advisory stages fall back to a
//! documented default, each in its own explicit branch below.

pub mod prompts;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use strsim::jaro_winkler;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::ContextBudgeter;
use crate::cascade::Cascade;
use crate::clients::{ChatTransport, HttpChatClient, ModelCatalog};
use crate::config::{Config, PipelineConfig};
use crate::continuation::ContinuationEngine;
use crate::document::{Document, Section};
use crate::error::{DocsightError, Result};
use crate::schemas::{
    AnalysisResult, Entity, ExecutiveSummary, ListPayload, MindMapNode, Relationship,
    SectionSummary, SignalScores, SummarySource, VizRecommendation,
};
use crate::tasks::TaskType;

pub use types::{AnalysisState, ProgressEvent, ProgressSink, Stage};
use types::ProgressReporter;

/// Similarity at which a relationship endpoint is matched to an entity name
const ENTITY_MATCH_THRESHOLD: f64 = 0.92;

/// Value produced by an advisory stage, with a marker when the default was used.
struct Advisory<T> {
    value: T,
    tokens: u64,
    defaulted: bool,
}

impl<T> Advisory<T> {
    fn ok(value: T, tokens: u64) -> Self {
        Self {
            value,
            tokens,
            defaulted: false,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            tokens: 0,
            defaulted: true,
        }
    }
}

pub struct Analyzer {
    cascade: Arc<Cascade>,
    cfg: PipelineConfig,
}

impl Analyzer {
    pub fn new(cascade: Arc<Cascade>, cfg: PipelineConfig) -> Self {
        Self { cascade, cfg }
    }

    /// Wire the full stack over the configured HTTP provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(HttpChatClient::new(&config.provider)?);
        Ok(Self::with_transport(config, client.clone(), client))
    }

    /// Wire the full stack over any transport; tests pass scripted fakes here.
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn ChatTransport>,
        catalog: Arc<dyn ModelCatalog>,
    ) -> Self {
        let budgeter = Arc::new(ContextBudgeter::new(catalog, config.budget.clone()));
        let engine = Arc::new(ContinuationEngine::new(
            transport,
            budgeter,
            config.continuation.max_rounds,
        ));
        let cascade = Arc::new(Cascade::new(
            engine,
            Arc::new(config.task_registry()),
            config.cascade.retry_budget,
        ));
        Self::new(cascade, config.pipeline.clone())
    }

    pub async fn analyze_document(
        &self,
        doc: &Document,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<AnalysisResult> {
        let mut reporter = ProgressReporter::new(progress);
        reporter.report(Stage::Initialization, format!("analyzing '{}'", doc.title), None);
        doc.validate()?;

        let run_id = Uuid::new_v4();
        let body = prompts::clip(&doc.text, self.cfg.max_input_chars);
        let mut tokens_used = 0u64;
        let mut degraded: Vec<String> = Vec::new();

        reporter.report(Stage::PriorityAnalysis, "summarizing", None);
        let ((tldr, t1), (executive_summary, t2)) =
            tokio::try_join!(self.tldr(doc, body), self.executive_summary(doc, body))?;
        tokens_used += t1 + t2;

        let mut state = AnalysisState {
            tldr: Some(tldr.clone()),
            executive_summary: Some(executive_summary.clone()),
            ..Default::default()
        };
        reporter.report(Stage::EarlyResults, "summaries ready", Some(state.clone()));

        reporter.report(Stage::DetailedAnalysis, "extracting entities and signals", None);
        let (entities, signals) = tokio::join!(self.entities(body), self.signals(doc, body));
        tokens_used += entities.tokens + signals.tokens;
        if entities.defaulted {
            degraded.push(TaskType::EntityExtraction.to_string());
        }
        if signals.defaulted {
            degraded.push(TaskType::SignalAnalysis.to_string());
        }
        let entities = entities.value;
        let signals = signals.value;
        state.entities = Some(entities.clone());
        state.signals = Some(signals);

        reporter.report(
            Stage::Relationships,
            format!("relating {} entities", entities.len()),
            Some(state.clone()),
        );
        let relationships = self.relationships(body, &entities).await;
        tokens_used += relationships.tokens;
        if relationships.defaulted {
            degraded.push(TaskType::RelationshipDetection.to_string());
        }
        let relationships = relationships.value;
        state.relationships = Some(relationships.clone());

        let sections = doc.flatten_sections();
        reporter.report(
            Stage::Sections,
            format!("summarizing {} sections", sections.len()),
            Some(state.clone()),
        );
        let section_results = self.section_summaries(&doc.title, &sections).await;
        let mut section_summaries = Vec::with_capacity(section_results.len());
        for r in section_results {
            tokens_used += r.tokens;
            if r.defaulted {
                degraded.push(format!("{}:{}", TaskType::SectionSummary, r.value.section_id));
            }
            section_summaries.push(r.value);
        }
        state.section_summaries = Some(section_summaries.clone());

        reporter.report(Stage::Recommendations, "recommending visualizations", Some(state.clone()));
        let recommendations = self
            .recommendations(doc, &signals, entities.len(), relationships.len(), sections.len())
            .await;
        tokens_used += recommendations.tokens;
        if recommendations.defaulted {
            degraded.push(TaskType::VizRecommendation.to_string());
        }
        let recommendations = recommendations.value;
        state.recommendations = Some(recommendations.clone());

        reporter.report(Stage::Complete, "analysis complete", Some(state));
        info!(
            "run {} finished: {} entities, {} relationships, {} sections, {} tokens, degraded: {:?}",
            run_id,
            entities.len(),
            relationships.len(),
            section_summaries.len(),
            tokens_used,
            degraded
        );

        Ok(AnalysisResult {
            run_id,
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            tldr,
            executive_summary,
            entities,
            relationships,
            signals,
            section_summaries,
            recommendations,
            degraded_stages: degraded,
            tokens_used,
            analyzed_at: Utc::now(),
        })
    }

    // Essential stages: errors propagate, tagged with the stage and task.

    async fn tldr(&self, doc: &Document, body: &str) -> Result<(String, u64)> {
        let stage = format!("{}:{}", Stage::PriorityAnalysis, TaskType::Tldr);
        let result = self
            .cascade
            .call(TaskType::Tldr, &prompts::tldr(&doc.title, body))
            .await
            .map_err(|e| e.in_stage(stage.clone()))?;
        let text = result.content.trim();
        if text.is_empty() {
            return Err(DocsightError::InvalidResponse {
                message: "empty tldr".to_string(),
                snippet: String::new(),
            }
            .in_stage(stage));
        }
        Ok((text.to_string(), result.tokens_used))
    }

    async fn executive_summary(&self, doc: &Document, body: &str) -> Result<(ExecutiveSummary, u64)> {
        self.cascade
            .call_json(
                TaskType::ExecutiveSummary,
                &prompts::executive_summary(&doc.title, body),
            )
            .await
            .map_err(|e| {
                e.in_stage(format!(
                    "{}:{}",
                    Stage::PriorityAnalysis,
                    TaskType::ExecutiveSummary
                ))
            })
    }

    // Advisory stages: each failure branch names its default.

    async fn entities(&self, body: &str) -> Advisory<Vec<Entity>> {
        match self
            .cascade
            .call_json::<ListPayload<Entity>>(TaskType::EntityExtraction, &prompts::entities(body))
            .await
        {
            Ok((payload, tokens)) => Advisory::ok(dedupe_entities(payload.into_vec()), tokens),
            Err(e) => {
                warn!("entity extraction failed, continuing with no entities: {}", e);
                Advisory::fallback(Vec::new())
            }
        }
    }

    async fn signals(&self, doc: &Document, body: &str) -> Advisory<SignalScores> {
        match self
            .cascade
            .call_json::<SignalScores>(TaskType::SignalAnalysis, &prompts::signals(&doc.title, body))
            .await
        {
            Ok((scores, tokens)) => Advisory::ok(scores.clamped(), tokens),
            Err(e) => {
                warn!("signal analysis failed, using neutral scores: {}", e);
                Advisory::fallback(SignalScores::neutral())
            }
        }
    }

    async fn relationships(&self, body: &str, entities: &[Entity]) -> Advisory<Vec<Relationship>> {
        if entities.is_empty() {
            debug!("no entities, skipping relationship detection");
            return Advisory::ok(Vec::new(), 0);
        }
        match self
            .cascade
            .call_json::<ListPayload<Relationship>>(
                TaskType::RelationshipDetection,
                &prompts::relationships(body, entities),
            )
            .await
        {
            Ok((payload, tokens)) => {
                Advisory::ok(anchor_relationships(payload.into_vec(), entities), tokens)
            }
            Err(e) => {
                warn!("relationship detection failed, continuing with none: {}", e);
                Advisory::fallback(Vec::new())
            }
        }
    }

    async fn section_summaries(&self, doc_title: &str, sections: &[&Section]) -> Vec<Advisory<SectionSummary>> {
        let permits = Arc::new(Semaphore::new(self.cfg.section_concurrency.max(1)));
        let tasks = sections.iter().map(|section| {
            let permits = permits.clone();
            async move {
                if section.content.chars().count() < self.cfg.section_min_chars {
                    return Advisory::ok(
                        self.truncated_summary(section, SummarySource::Truncated),
                        0,
                    );
                }
                let _permit = permits.acquire().await;
                let prompt = prompts::section(
                    doc_title,
                    &section.title,
                    prompts::clip(&section.content, self.cfg.max_input_chars),
                );
                match self.cascade.call(TaskType::SectionSummary, &prompt).await {
                    Ok(result) if !result.content.trim().is_empty() => Advisory::ok(
                        SectionSummary {
                            section_id: section.id.clone(),
                            title: section.title.clone(),
                            summary: result.content.trim().to_string(),
                            source: SummarySource::Model,
                        },
                        result.tokens_used,
                    ),
                    Ok(_) => {
                        warn!("empty summary for section {}, truncating instead", section.id);
                        Advisory::fallback(self.truncated_summary(section, SummarySource::Fallback))
                    }
                    Err(e) => {
                        warn!("summary for section {} failed, truncating instead: {}", section.id, e);
                        Advisory::fallback(self.truncated_summary(section, SummarySource::Fallback))
                    }
                }
            }
        });
        join_all(tasks).await
    }

    fn truncated_summary(&self, section: &Section, source: SummarySource) -> SectionSummary {
        let content = section.content.trim();
        let clipped = prompts::clip(content, self.cfg.section_summary_chars);
        let summary = if clipped.len() < content.len() {
            format!("{}...", clipped.trim_end())
        } else {
            clipped.to_string()
        };
        SectionSummary {
            section_id: section.id.clone(),
            title: section.title.clone(),
            summary,
            source,
        }
    }

    async fn recommendations(
        &self,
        doc: &Document,
        signals: &SignalScores,
        entity_count: usize,
        relationship_count: usize,
        section_count: usize,
    ) -> Advisory<Vec<VizRecommendation>> {
        let prompt = prompts::recommendations(
            &doc.title,
            signals,
            entity_count,
            relationship_count,
            section_count,
        );
        match self
            .cascade
            .call_json::<ListPayload<VizRecommendation>>(TaskType::VizRecommendation, &prompt)
            .await
        {
            Ok((payload, tokens)) => {
                let mut recs = payload.into_vec();
                if recs.is_empty() {
                    debug!("model recommended nothing, using heuristic recommendations");
                    recs = default_recommendations(entity_count, relationship_count);
                }
                recs.sort_by_key(|r| r.priority);
                Advisory::ok(recs, tokens)
            }
            Err(e) => {
                warn!("visualization recommendation failed, using heuristics: {}", e);
                Advisory::fallback(default_recommendations(entity_count, relationship_count))
            }
        }
    }

    /// Mind map for a finished analysis. Advisory: a failed call yields a
    /// tree of the document title over its top-level sections.
    pub async fn generate_mind_map(&self, doc: &Document, analysis: &AnalysisResult) -> MindMapNode {
        let section_titles: Vec<&str> = doc.sections.iter().map(|s| s.title.as_str()).collect();
        let prompt = prompts::mind_map(&doc.title, &analysis.tldr, &analysis.entities, &section_titles);
        match self
            .cascade
            .call_json::<MindMapNode>(TaskType::MindMapGeneration, &prompt)
            .await
        {
            Ok((node, _)) => node,
            Err(e) => {
                warn!("mind map generation failed, using section outline: {}", e);
                outline_mind_map(doc)
            }
        }
    }
}

/// Drop blank names and keep the first of each case-insensitive duplicate.
fn dedupe_entities(entities: Vec<Entity>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|e| !e.name.trim().is_empty())
        .filter(|e| seen.insert(e.name.trim().to_lowercase()))
        .collect()
}

fn canonical_entity<'a>(name: &str, entities: &'a [Entity]) -> Option<&'a str> {
    let wanted = name.trim().to_lowercase();
    if let Some(e) = entities.iter().find(|e| e.name.to_lowercase() == wanted) {
        return Some(e.name.as_str());
    }
    entities
        .iter()
        .map(|e| (e, jaro_winkler(&e.name.to_lowercase(), &wanted)))
        .filter(|(_, score)| *score >= ENTITY_MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(e, _)| e.name.as_str())
}

/// Keep relationships whose endpoints match extracted entities, renamed to
/// the entity spelling; drop self-loops.
fn anchor_relationships(relationships: Vec<Relationship>, entities: &[Entity]) -> Vec<Relationship> {
    relationships
        .into_iter()
        .filter_map(|mut rel| {
            let source = canonical_entity(&rel.source, entities)?;
            let target = canonical_entity(&rel.target, entities)?;
            if source == target {
                return None;
            }
            rel.source = source.to_string();
            rel.target = target.to_string();
            rel.strength = rel.strength.clamp(0.0, 1.0);
            Some(rel)
        })
        .collect()
}

/// Recommendations used when the model gives none: the signal radar always,
/// a network graph with any relationship, an entity chart from three entities.
pub fn default_recommendations(entity_count: usize, relationship_count: usize) -> Vec<VizRecommendation> {
    let mut recs = vec![VizRecommendation {
        viz_type: "radar_chart".to_string(),
        title: "Document signals".to_string(),
        rationale: "Shows the six signal scores side by side".to_string(),
        priority: 1,
    }];
    if relationship_count > 0 {
        recs.push(VizRecommendation {
            viz_type: "network_graph".to_string(),
            title: "Entity relationships".to_string(),
            rationale: format!("{relationship_count} relationships between extracted entities"),
            priority: 2,
        });
    }
    if entity_count >= 3 {
        recs.push(VizRecommendation {
            viz_type: "entity_bar_chart".to_string(),
            title: "Most mentioned entities".to_string(),
            rationale: format!("{entity_count} entities extracted"),
            priority: 3,
        });
    }
    recs
}

fn outline_mind_map(doc: &Document) -> MindMapNode {
    MindMapNode {
        label: doc.title.clone(),
        children: doc
            .sections
            .iter()
            .map(|s| MindMapNode {
                label: s.title.clone(),
                children: Vec::new(),
            })
            .collect(),
    }
}
