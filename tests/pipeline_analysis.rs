mod common;

use std::sync::{Arc, Mutex};

use common::{FixedCatalog, SAMPLE_DOC, ScriptedTransport, canned, stop, test_config, transport_error};
use docsight::error::DocsightError;
use docsight::schemas::{NEUTRAL_SIGNAL, SummarySource};
use docsight::tasks::TaskType;
use docsight::{Analyzer, Document, ProgressEvent, Stage};

fn analyzer(transport: Arc<ScriptedTransport>) -> Analyzer {
    Analyzer::with_transport(&test_config(), transport, FixedCatalog::new(32_000))
}

fn sample() -> Document {
    Document::from_markdown(SAMPLE_DOC, "Acquisition")
}

#[tokio::test]
async fn full_run_fills_every_field() {
    let transport = ScriptedTransport::happy();
    let result = analyzer(transport.clone())
        .analyze_document(&sample(), None)
        .await
        .unwrap();

    assert!(!result.tldr.is_empty());
    assert_eq!(result.executive_summary.overview, "Acme Corp plans to acquire Globex.");
    let names: Vec<&str> = result.entities.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Acme Corp", "Globex"]);
    assert_eq!(result.relationships.len(), 1);
    assert_eq!(result.relationships[0].relation, "acquires");
    assert_eq!(result.signals.impact, 80.0);
    assert_eq!(result.recommendations[0].viz_type, "radar_chart");
    assert!(result.degraded_stages.is_empty(), "{:?}", result.degraded_stages);
    assert!(result.tokens_used > 0);

    // "Risks" is too short for a model call
    assert_eq!(result.section_summaries.len(), 3);
    let sources: Vec<SummarySource> = result.section_summaries.iter().map(|s| s.source).collect();
    assert_eq!(
        sources,
        vec![SummarySource::Model, SummarySource::Truncated, SummarySource::Model]
    );
    assert_eq!(transport.calls_for(TaskType::SectionSummary), 2);
    assert_eq!(transport.calls_for(TaskType::MindMapGeneration), 0);
}

#[tokio::test]
async fn progress_is_monotone_and_ends_complete() {
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::default();
    let sink = {
        let events = events.clone();
        move |event: ProgressEvent| events.lock().unwrap().push(event)
    };

    analyzer(ScriptedTransport::happy())
        .analyze_document(&sample(), Some(&sink))
        .await
        .unwrap();

    let events = events.lock().unwrap();
    let percents: Vec<u8> = events.iter().map(|e| e.percent_complete).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(percents.first(), Some(&0));
    assert_eq!(percents.last(), Some(&100));

    let early = events
        .iter()
        .find(|e| e.stage == Stage::EarlyResults)
        .and_then(|e| e.partial.clone())
        .unwrap();
    assert!(early.tldr.is_some());
    assert!(early.executive_summary.is_some());
    assert!(early.entities.is_none());

    let last = events.last().unwrap();
    assert_eq!(last.stage, Stage::Complete);
    let full = last.partial.clone().unwrap();
    assert!(full.recommendations.is_some());
    assert!(full.section_summaries.is_some());
}

#[tokio::test]
async fn entity_failure_degrades_and_skips_relationships() {
    let transport = ScriptedTransport::with_handler(|task, req| match task {
        Some(TaskType::EntityExtraction) => Err(transport_error(Some(502), "bad gateway")),
        _ => Ok(canned(task, req)),
    });
    let result = analyzer(transport.clone())
        .analyze_document(&sample(), None)
        .await
        .unwrap();

    assert!(result.entities.is_empty());
    assert!(result.relationships.is_empty());
    assert_eq!(transport.calls_for(TaskType::RelationshipDetection), 0);
    assert_eq!(result.degraded_stages, vec!["entity_extraction".to_string()]);
    assert!(!result.tldr.is_empty());
}

#[tokio::test]
async fn zero_entities_means_no_relationship_call() {
    let transport = ScriptedTransport::with_handler(|task, req| match task {
        Some(TaskType::EntityExtraction) => stop("[]"),
        _ => Ok(canned(task, req)),
    });
    let result = analyzer(transport.clone())
        .analyze_document(&sample(), None)
        .await
        .unwrap();

    assert!(result.entities.is_empty());
    assert!(result.relationships.is_empty());
    assert_eq!(transport.calls_for(TaskType::RelationshipDetection), 0);
    assert!(result.degraded_stages.is_empty());
}

#[tokio::test]
async fn advisory_failures_use_documented_defaults() {
    let transport = ScriptedTransport::with_handler(|task, req| match task {
        Some(TaskType::SignalAnalysis) => stop("no idea"),
        Some(TaskType::VizRecommendation) => Err(transport_error(None, "timeout")),
        Some(TaskType::SectionSummary) => Err(transport_error(Some(500), "boom")),
        _ => Ok(canned(task, req)),
    });
    let result = analyzer(transport)
        .analyze_document(&sample(), None)
        .await
        .unwrap();

    assert_eq!(result.signals.urgency, NEUTRAL_SIGNAL);
    assert_eq!(result.signals.sentiment, NEUTRAL_SIGNAL);

    let viz: Vec<&str> = result.recommendations.iter().map(|r| r.viz_type.as_str()).collect();
    assert_eq!(viz, vec!["radar_chart", "network_graph"]);

    let fallback = &result.section_summaries[0];
    assert_eq!(fallback.source, SummarySource::Fallback);
    assert!(fallback.summary.starts_with("Acme Corp has agreed"));

    assert!(result.degraded_stages.contains(&"signal_analysis".to_string()));
    assert!(result.degraded_stages.contains(&"viz_recommendation".to_string()));
    assert!(
        result
            .degraded_stages
            .iter()
            .any(|s| s.starts_with("section_summary:"))
    );
}

#[tokio::test]
async fn tldr_exhaustion_aborts_the_run() {
    let transport = ScriptedTransport::with_handler(|task, req| match task {
        Some(TaskType::Tldr) => Err(transport_error(Some(429), "rate limited")),
        _ => Ok(canned(task, req)),
    });
    let err = analyzer(transport.clone())
        .analyze_document(&sample(), None)
        .await
        .unwrap_err();

    assert!(err.is_cascade_exhaustion());
    assert!(!err.is_decode_failure());
    match &err {
        DocsightError::Stage { stage, .. } => assert_eq!(stage, "priority-analysis:tldr"),
        other => panic!("expected stage error, got {other:?}"),
    }
    assert_eq!(transport.calls_for(TaskType::EntityExtraction), 0);
}

#[tokio::test]
async fn executive_summary_decode_failure_is_distinguishable() {
    let transport = ScriptedTransport::with_handler(|task, req| match task {
        Some(TaskType::ExecutiveSummary) => stop("Sorry, I can't summarize that."),
        _ => Ok(canned(task, req)),
    });
    let err = analyzer(transport)
        .analyze_document(&sample(), None)
        .await
        .unwrap_err();

    assert!(err.is_decode_failure());
    assert!(!err.is_cascade_exhaustion());
    assert!(err.to_string().contains("priority-analysis:executive_summary"));
}

#[tokio::test]
async fn empty_document_fails_before_any_call() {
    let transport = ScriptedTransport::happy();
    let doc = Document::from_markdown("  \n\n", "Blank");
    let err = analyzer(transport.clone())
        .analyze_document(&doc, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DocsightError::Validation { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn mind_map_uses_model_or_section_outline() {
    let doc = sample();
    let happy = analyzer(ScriptedTransport::happy());
    let result = happy.analyze_document(&doc, None).await.unwrap();
    let map = happy.generate_mind_map(&doc, &result).await;
    assert_eq!(map.label, "Acquisition");
    assert_eq!(map.children.len(), 2);

    let failing = analyzer(ScriptedTransport::with_handler(|task, req| match task {
        Some(TaskType::MindMapGeneration) => Err(transport_error(Some(503), "down")),
        _ => Ok(canned(task, req)),
    }));
    let map = failing.generate_mind_map(&doc, &result).await;
    assert_eq!(map.label, "Acquisition");
    let labels: Vec<&str> = map.children.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["Acquisition Plan", "Next Steps"]);
}

#[tokio::test]
async fn channel_sink_receives_every_stage() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
    analyzer(ScriptedTransport::happy())
        .analyze_document(&sample(), Some(&tx))
        .await
        .unwrap();
    drop(tx);

    let mut stages = Vec::new();
    while let Some(event) = rx.recv().await {
        stages.push(event.stage);
    }
    assert_eq!(
        stages,
        vec![
            Stage::Initialization,
            Stage::PriorityAnalysis,
            Stage::EarlyResults,
            Stage::DetailedAnalysis,
            Stage::Relationships,
            Stage::Sections,
            Stage::Recommendations,
            Stage::Complete,
        ]
    );
}
