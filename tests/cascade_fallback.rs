mod common;

use std::sync::Arc;

use common::{FixedCatalog, ScriptedTransport, stop, transport_error};
use docsight::budget::ContextBudgeter;
use docsight::cascade::Cascade;
use docsight::config::BudgetConfig;
use docsight::continuation::ContinuationEngine;
use docsight::error::DocsightError;
use docsight::schemas::SignalScores;
use docsight::tasks::{TaskRegistry, TaskType};

fn cascade(transport: Arc<ScriptedTransport>, retry_budget: u32) -> Cascade {
    let budgeter = Arc::new(ContextBudgeter::new(
        FixedCatalog::new(16_000),
        BudgetConfig::default(),
    ));
    let engine = Arc::new(ContinuationEngine::new(transport, budgeter, 3));
    Cascade::new(engine, Arc::new(TaskRegistry::defaults()), retry_budget)
}

#[tokio::test]
async fn budget_of_two_makes_exactly_four_attempts() {
    let transport =
        ScriptedTransport::with_handler(|_, _| Err(transport_error(Some(503), "overloaded")));
    let err = cascade(transport.clone(), 2)
        .call(TaskType::Tldr, "summarize")
        .await
        .unwrap_err();

    assert_eq!(transport.call_count(), 4);
    match err {
        DocsightError::ExhaustedCascade {
            task,
            attempts,
            last_error,
        } => {
            assert_eq!(task, "tldr");
            assert_eq!(attempts, 4);
            assert!(last_error.contains("503"), "{last_error}");
        }
        other => panic!("expected exhausted cascade, got {other:?}"),
    }

    let registry = TaskRegistry::defaults();
    let cfg = registry.get(TaskType::Tldr);
    let models: Vec<String> = transport.calls().into_iter().map(|c| c.model).collect();
    assert_eq!(
        models,
        vec![
            cfg.primary_model.clone(),
            cfg.fallback_model.clone(),
            cfg.primary_model.clone(),
            cfg.fallback_model.clone(),
        ]
    );
}

#[tokio::test]
async fn budgets_zero_and_one_both_make_a_single_sweep() {
    for budget in [0, 1] {
        let transport =
            ScriptedTransport::with_handler(|_, _| Err(transport_error(None, "timeout")));
        let err = cascade(transport.clone(), budget)
            .call(TaskType::SectionSummary, "section")
            .await
            .unwrap_err();
        assert!(err.is_cascade_exhaustion());
        assert_eq!(transport.call_count(), 2, "budget {budget}");
    }
}

#[tokio::test]
async fn fallback_answers_when_primary_fails() {
    let registry = TaskRegistry::defaults();
    let primary = registry.get(TaskType::Tldr).primary_model.clone();
    let transport = ScriptedTransport::with_handler(move |_, req| {
        if req.model == primary {
            Err(transport_error(Some(500), "primary down"))
        } else {
            stop("from the fallback")
        }
    });

    let result = cascade(transport.clone(), 2)
        .call(TaskType::Tldr, "summarize")
        .await
        .unwrap();
    assert_eq!(result.content, "from the fallback");
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn requests_carry_task_prompt_and_settings() {
    let transport = ScriptedTransport::with_handler(|_, _| stop("ok"));
    cascade(transport.clone(), 2)
        .call(TaskType::Tldr, "the user prompt")
        .await
        .unwrap();

    let registry = TaskRegistry::defaults();
    let cfg = registry.get(TaskType::Tldr);
    let call = &transport.calls()[0];
    assert_eq!(call.messages.len(), 2);
    assert_eq!(call.messages[0].content, cfg.system_prompt);
    assert_eq!(call.messages[1].content, "the user prompt");
    assert_eq!(call.max_tokens, cfg.max_tokens);
    assert_eq!(call.temperature, cfg.temperature);
}

#[tokio::test]
async fn decode_failure_is_not_retried() {
    let transport = ScriptedTransport::with_handler(|_, _| stop("I cannot score this document."));
    let err = cascade(transport.clone(), 2)
        .call_json::<SignalScores>(TaskType::SignalAnalysis, "score")
        .await
        .unwrap_err();

    assert!(err.is_decode_failure());
    assert!(!err.is_cascade_exhaustion());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn fenced_json_is_decoded_with_token_count() {
    let transport = ScriptedTransport::with_handler(|_, _| {
        stop("Scores:\n```json\n{\"urgency\": 10, \"impact\": 20, \"risk\": 30, \"opportunity\": 40, \"complexity\": 50, \"sentiment\": 60}\n```")
    });
    let (scores, tokens) = cascade(transport, 1)
        .call_json::<SignalScores>(TaskType::SignalAnalysis, "score")
        .await
        .unwrap();
    assert_eq!(scores.risk, 30.0);
    assert_eq!(tokens, 10);
}
