#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docsight::clients::{CallRequest, CallResult, ChatTransport, FinishReason, ModelCatalog, ModelMetadata};
use docsight::config::Config;
use docsight::error::{DocsightError, Result};
use docsight::tasks::{TaskRegistry, TaskType};

type Handler = Box<dyn Fn(Option<TaskType>, &CallRequest) -> Result<CallResult> + Send + Sync>;

/// Transport that answers from a handler and records every request.
pub struct ScriptedTransport {
    handler: Handler,
    queue: Mutex<VecDeque<Result<CallResult>>>,
    calls: Mutex<Vec<CallRequest>>,
    registry: TaskRegistry,
}

impl ScriptedTransport {
    pub fn with_handler<F>(handler: F) -> Arc<Self>
    where
        F: Fn(Option<TaskType>, &CallRequest) -> Result<CallResult> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            queue: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            registry: TaskRegistry::defaults(),
        })
    }

    /// Replies are consumed in order; once empty, every call fails.
    pub fn queued(replies: Vec<Result<CallResult>>) -> Arc<Self> {
        let t = Self::with_handler(|_, _| Err(transport_error(None, "script exhausted")));
        *t.queue.lock().unwrap() = replies.into();
        t
    }

    /// Answers every task with a well-formed canned reply.
    pub fn happy() -> Arc<Self> {
        Self::with_handler(|task, req| Ok(canned(task, req)))
    }

    pub fn calls(&self) -> Vec<CallRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, task: TaskType) -> usize {
        self.calls()
            .iter()
            .filter(|c| self.task_of(c) == Some(task))
            .count()
    }

    fn task_of(&self, request: &CallRequest) -> Option<TaskType> {
        let system = &request.messages.first()?.content;
        TaskType::ALL
            .into_iter()
            .find(|t| &self.registry.get(*t).system_prompt == system)
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, request: &CallRequest) -> Result<CallResult> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(reply) = self.queue.lock().unwrap().pop_front() {
            return reply;
        }
        (self.handler)(self.task_of(request), request)
    }
}

/// Catalog with one fixed answer for every model.
pub struct FixedCatalog {
    pub meta: Option<ModelMetadata>,
}

impl FixedCatalog {
    pub fn new(context_length: u32) -> Arc<Self> {
        Arc::new(Self {
            meta: Some(ModelMetadata {
                context_length,
                max_completion_tokens: None,
            }),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { meta: None })
    }
}

#[async_trait]
impl ModelCatalog for FixedCatalog {
    async fn model_metadata(&self, model: &str) -> Result<ModelMetadata> {
        self.meta.ok_or_else(|| DocsightError::Validation {
            message: format!("unknown model {model}"),
        })
    }
}

pub fn reply(content: &str, finish_reason: FinishReason) -> CallResult {
    CallResult {
        content: content.to_string(),
        tokens_used: 10,
        model: "scripted".to_string(),
        finish_reason,
    }
}

pub fn stop(content: &str) -> Result<CallResult> {
    Ok(reply(content, FinishReason::Stop))
}

pub fn transport_error(status: Option<u16>, message: &str) -> DocsightError {
    DocsightError::Transport {
        status,
        message: message.to_string(),
    }
}

pub fn canned(task: Option<TaskType>, request: &CallRequest) -> CallResult {
    let content = match task {
        Some(TaskType::Tldr) => "Acme Corp is buying Globex to expand into logistics.".to_string(),
        Some(TaskType::ExecutiveSummary) => r#"```json
{"overview": "Acme Corp plans to acquire Globex.", "key_points": ["Deal closes in Q4"], "implications": ["Integration risk"]}
```"#
            .to_string(),
        Some(TaskType::EntityExtraction) => r#"[
  {"name": "Acme Corp", "type": "organization", "mentions": 4, "importance": 0.9},
  {"name": "Globex", "type": "organization", "mentions": 3, "importance": 0.7},
  {"name": "acme corp", "type": "organization"}
]"#
        .to_string(),
        Some(TaskType::RelationshipDetection) => {
            r#"Here you go: [{"source": "Acme Corp", "target": "Globex", "relation": "acquires", "strength": 0.8}]"#
                .to_string()
        }
        Some(TaskType::SignalAnalysis) => r#"{"urgency": 70, "impact": 80, "risk": 65, "opportunity": 75, "complexity": 60, "sentiment": 55}"#
            .to_string(),
        Some(TaskType::SectionSummary) => "The section covers deal terms.".to_string(),
        Some(TaskType::VizRecommendation) => r#"{"recommendations": [
  {"viz_type": "network_graph", "title": "Deal parties", "rationale": "Two organizations", "priority": 2},
  {"viz_type": "radar_chart", "title": "Signals", "rationale": "Six axes", "priority": 1}
]}"#
        .to_string(),
        Some(TaskType::MindMapGeneration) => {
            r#"{"label": "Acquisition", "children": [{"label": "Acme Corp"}, {"label": "Globex"}]}"#.to_string()
        }
        None => "unexpected request".to_string(),
    };
    CallResult {
        content,
        tokens_used: 10,
        model: request.model.clone(),
        finish_reason: FinishReason::Stop,
    }
}

/// Config with no network settings in play and a single sweep per cascade.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.cascade.retry_budget = 1;
    config
}

pub const SAMPLE_DOC: &str = "\
# Acquisition Plan

Acme Corp has agreed to acquire Globex in an all-stock deal. The board expects the \
transaction to close in the fourth quarter, pending regulatory approval in two \
jurisdictions. Integration planning starts immediately and will be led by a joint \
steering committee drawn from both companies.

## Risks

Short note on risks.

# Next Steps

Finance will prepare the pro-forma statements, legal will file with regulators and \
communications will brief staff at both companies. A detailed timeline follows once \
the steering committee meets for the first time next month, at which point budgets \
and owners for every workstream will be confirmed.
";
