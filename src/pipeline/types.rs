use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::schemas::{
    Entity, ExecutiveSummary, Relationship, SectionSummary, SignalScores, VizRecommendation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Initialization,
    PriorityAnalysis,
    EarlyResults,
    DetailedAnalysis,
    Relationships,
    Sections,
    Recommendations,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initialization => "initialization",
            Stage::PriorityAnalysis => "priority-analysis",
            Stage::EarlyResults => "early-results",
            Stage::DetailedAnalysis => "detailed-analysis",
            Stage::Relationships => "relationships",
            Stage::Sections => "sections",
            Stage::Recommendations => "recommendations",
            Stage::Complete => "complete",
        }
    }

    pub fn percent(&self) -> u8 {
        match self {
            Stage::Initialization => 0,
            Stage::PriorityAnalysis => 10,
            Stage::EarlyResults => 30,
            Stage::DetailedAnalysis => 40,
            Stage::Relationships => 60,
            Stage::Sections => 75,
            Stage::Recommendations => 90,
            Stage::Complete => 100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of what a run knows so far. Always an owned copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tldr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<ExecutiveSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Relationship>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<SignalScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_summaries: Option<Vec<SectionSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<VizRecommendation>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent_complete: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<AnalysisState>,
}

/// One-way receiver of progress events. Delivery is fire-and-forget.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Forwards events into a channel; a dropped receiver is ignored.
impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Emits events in non-decreasing percentage order.
pub(crate) struct ProgressReporter<'a> {
    sink: Option<&'a dyn ProgressSink>,
    last_percent: u8,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: Option<&'a dyn ProgressSink>) -> Self {
        Self {
            sink,
            last_percent: 0,
        }
    }

    pub(crate) fn report(
        &mut self,
        stage: Stage,
        message: impl Into<String>,
        partial: Option<AnalysisState>,
    ) {
        let percent = stage.percent().max(self.last_percent);
        self.last_percent = percent;
        let message = message.into();
        tracing::info!("[{:>3}%] {}: {}", percent, stage, message);
        if let Some(sink) = self.sink {
            sink.emit(ProgressEvent {
                stage,
                percent_complete: percent,
                message,
                partial,
            });
        }
    }
}
