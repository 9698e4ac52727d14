//! Primary/fallback model cascade with bounded whole-cascade retries.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::clients::traits::{CallResult, ChatMessage};
use crate::continuation::{CompletionRequest, ContinuationEngine};
use crate::decoder;
use crate::error::{DocsightError, Result};
use crate::tasks::{TaskRegistry, TaskType};

pub struct Cascade {
    engine: Arc<ContinuationEngine>,
    tasks: Arc<TaskRegistry>,
    retry_budget: u32,
}

impl Cascade {
    pub fn new(engine: Arc<ContinuationEngine>, tasks: Arc<TaskRegistry>, retry_budget: u32) -> Self {
        Self {
            engine,
            tasks,
            retry_budget,
        }
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Run `prompt` for `task` with the configured retry budget.
    pub async fn call(&self, task: TaskType, prompt: &str) -> Result<CallResult> {
        self.call_with_fallback(task, prompt, self.retry_budget).await
    }

    /// Cascade plus JSON decoding; decode failures are not retried.
    pub async fn call_json<T: DeserializeOwned>(&self, task: TaskType, prompt: &str) -> Result<(T, u64)> {
        let result = self.call(task, prompt).await?;
        let value = decoder::parse_json(&result)?;
        Ok((value, result.tokens_used))
    }

    /// Primary, then fallback on any failure; the pair is one sweep.
    ///
    /// `retry_budget` is the number of sweeps, so with both models failing a
    /// budget of 2 makes exactly four attempts: primary, fallback, primary,
    /// fallback. Budgets of 0 and 1 both make a single sweep. Every failure
    /// is retried alike; 4xx and 5xx are not told apart.
    pub async fn call_with_fallback(
        &self,
        task: TaskType,
        prompt: &str,
        retry_budget: u32,
    ) -> Result<CallResult> {
        let cfg = self.tasks.get(task);
        let messages = vec![
            ChatMessage::system(cfg.system_prompt.clone()),
            ChatMessage::user(prompt),
        ];
        let sweeps = retry_budget.max(1);
        let mut attempts = 0u32;
        let mut last_error: Option<DocsightError> = None;

        for sweep in 1..=sweeps {
            for model in [&cfg.primary_model, &cfg.fallback_model] {
                attempts += 1;
                let request = CompletionRequest {
                    model: model.clone(),
                    messages: messages.clone(),
                    max_tokens: cfg.max_tokens,
                    temperature: cfg.temperature,
                };
                match self.engine.complete(&request).await {
                    Ok(result) => {
                        debug!(
                            "{} answered by {} (sweep {}, attempt {}, {} tokens)",
                            task, result.model, sweep, attempts, result.tokens_used
                        );
                        return Ok(result);
                    }
                    Err(e) => {
                        warn!(
                            "{} attempt {} with {} failed (sweep {}/{}): {}",
                            task, attempts, model, sweep, sweeps, e
                        );
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(DocsightError::ExhaustedCascade {
            task: task.to_string(),
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }
}
