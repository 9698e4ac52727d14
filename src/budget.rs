//! Output-token budgeting against a model's context window.
//!
//! Model metadata is fetched from the provider on first use and cached for the
//! lifetime of the budgeter. One budgeter is built at start-up and shared, so
//! in practice the cache is process-wide. Limits change rarely, so there is no
//! invalidation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clients::traits::{ChatMessage, ModelCatalog, ModelMetadata};
use crate::config::BudgetConfig;

pub struct ContextBudgeter {
    catalog: Arc<dyn ModelCatalog>,
    cfg: BudgetConfig,
    cache: RwLock<HashMap<String, ModelMetadata>>,
}

impl ContextBudgeter {
    pub fn new(catalog: Arc<dyn ModelCatalog>, cfg: BudgetConfig) -> Self {
        Self {
            catalog,
            cfg,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Coarse token estimate: characters divided by `chars_per_token`, rounded up.
    pub fn estimate_tokens(&self, text: &str) -> u32 {
        estimate_tokens(text, self.cfg.chars_per_token)
    }

    pub fn estimate_messages(&self, messages: &[ChatMessage]) -> u32 {
        messages
            .iter()
            .map(|m| self.estimate_tokens(&m.content))
            .fold(0u32, u32::saturating_add)
    }

    /// Metadata for `model`, fetched and cached on first use.
    ///
    /// A failed lookup yields the conservative default and is not cached, so a
    /// transient provider error does not pin the default for the whole process.
    pub async fn metadata(&self, model: &str) -> ModelMetadata {
        if let Some(meta) = self.cache.read().await.get(model) {
            return *meta;
        }

        match self.catalog.model_metadata(model).await {
            Ok(meta) => {
                debug!(
                    "cached metadata for {} (context={}, max_completion={:?})",
                    model, meta.context_length, meta.max_completion_tokens
                );
                self.cache.write().await.insert(model.to_string(), meta);
                meta
            }
            Err(e) => {
                warn!(
                    "model metadata lookup for {} failed, assuming {} context tokens: {}",
                    model, self.cfg.default_context_length, e
                );
                ModelMetadata {
                    context_length: self.cfg.default_context_length,
                    max_completion_tokens: None,
                }
            }
        }
    }

    /// Output-token ceiling for one request.
    ///
    /// An explicit `requested` value is honored as-is. Otherwise the ceiling is
    /// `context_length - safety_buffer - estimated_input_tokens`, floored at
    /// zero and capped by the provider's declared completion limit.
    pub async fn compute_max_tokens(
        &self,
        model: &str,
        estimated_input_tokens: u32,
        requested: Option<u32>,
    ) -> u32 {
        if let Some(requested) = requested {
            return requested;
        }
        let meta = self.metadata(model).await;
        let budget = available_tokens(meta, self.cfg.safety_buffer, estimated_input_tokens);
        if budget == 0 {
            warn!(
                "input of ~{} tokens leaves no output budget for {}",
                estimated_input_tokens, model
            );
        }
        budget
    }
}

pub fn estimate_tokens(text: &str, chars_per_token: u32) -> u32 {
    let per = chars_per_token.max(1) as usize;
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(per)).unwrap_or(u32::MAX)
}

fn available_tokens(meta: ModelMetadata, safety_buffer: u32, input: u32) -> u32 {
    let available = meta
        .context_length
        .saturating_sub(safety_buffer)
        .saturating_sub(input);
    match meta.max_completion_tokens {
        Some(ceiling) => available.min(ceiling),
        None => available,
    }
}
