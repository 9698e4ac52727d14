use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use crate::clients::traits::{
    CallRequest, CallResult, ChatTransport, FinishReason, ModelCatalog, ModelMetadata,
};
use crate::config::ProviderConfig;
use crate::error::{DocsightError, Result};

/// Longest provider error body kept in a transport error
const ERROR_BODY_CAP: usize = 500;

/// Client for an OpenAI-compatible chat-completions provider.
///
/// Headers are fixed at construction. `send` is purely mechanical: one
/// request, one response, no retries and no interpretation of the content.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelList {
    Wrapped { data: Vec<ModelEntry> },
    Bare(Vec<ModelEntry>),
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    context_length: Option<u32>,
    #[serde(default)]
    top_provider: Option<TopProvider>,
}

#[derive(Deserialize)]
struct TopProvider {
    #[serde(default)]
    max_completion_tokens: Option<u32>,
}

impl HttpChatClient {
    pub fn new(cfg: &ProviderConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &cfg.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e| {
                DocsightError::Config {
                    message: format!("API key is not a valid header value: {}", e),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Ok(v) = HeaderValue::from_str(&cfg.referer) {
            headers.insert("HTTP-Referer", v);
        }
        if let Ok(v) = HeaderValue::from_str(&cfg.title) {
            headers.insert("X-Title", v);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| DocsightError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

async fn error_for_status(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    let body: String = body.trim().chars().take(ERROR_BODY_CAP).collect();
    Err(DocsightError::Transport {
        status: Some(status.as_u16()),
        message: format!("{} failed: {}", context, body),
    })
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn send(&self, request: &CallRequest) -> Result<CallResult> {
        debug!(
            "chat completion (model={}, messages={}, max_tokens={:?})",
            request.model,
            request.messages.len(),
            request.max_tokens
        );

        let resp = self
            .client
            .post(self.url("chat/completions"))
            .json(request)
            .send()
            .await
            .map_err(|e| DocsightError::Transport {
                status: None,
                message: e.to_string(),
            })?;
        let resp = error_for_status(resp, "chat completion").await?;

        let body: CompletionResponse = resp.json().await.map_err(|e| DocsightError::Transport {
            status: None,
            message: format!("unreadable completion body: {}", e),
        })?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DocsightError::Transport {
                status: None,
                message: "completion response contained no choices".to_string(),
            })?;

        Ok(CallResult {
            content: choice.message.content.unwrap_or_default(),
            tokens_used: body.usage.map(|u| u.total_tokens).unwrap_or(0),
            model: body.model.unwrap_or_else(|| request.model.clone()),
            finish_reason: FinishReason::from_provider(choice.finish_reason.as_deref()),
        })
    }
}

#[async_trait]
impl ModelCatalog for HttpChatClient {
    async fn model_metadata(&self, model: &str) -> Result<ModelMetadata> {
        let resp = self
            .client
            .get(self.url("models"))
            .send()
            .await
            .map_err(|e| DocsightError::Transport {
                status: None,
                message: e.to_string(),
            })?;
        let resp = error_for_status(resp, "model listing").await?;
        let list: ModelList = resp.json().await.map_err(|e| DocsightError::Transport {
            status: None,
            message: format!("unreadable model list: {}", e),
        })?;
        let entries = match list {
            ModelList::Wrapped { data } => data,
            ModelList::Bare(entries) => entries,
        };

        let entry = entries
            .into_iter()
            .find(|e| e.id == model)
            .ok_or_else(|| DocsightError::Validation {
                message: format!("model {} not listed by provider", model),
            })?;
        let context_length = entry.context_length.ok_or_else(|| DocsightError::Validation {
            message: format!("model {} has no context_length", model),
        })?;

        Ok(ModelMetadata {
            context_length,
            max_completion_tokens: entry.top_provider.and_then(|t| t.max_completion_tokens),
        })
    }
}
