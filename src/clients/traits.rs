use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One chat-completion request; one request maps to exactly one transport call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Other,
}

impl FinishReason {
    /// Maps a provider `finish_reason` string. Absent or unknown values are `Other`.
    pub fn from_provider(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") => FinishReason::Stop,
            Some("length") | Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub content: String,
    pub tokens_used: u64,
    pub model: String,
    pub finish_reason: FinishReason,
}

impl CallResult {
    /// True when the provider cut the output short and no continuation recovered it.
    pub fn is_possibly_incomplete(&self) -> bool {
        self.finish_reason == FinishReason::Length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub context_length: u32,
    pub max_completion_tokens: Option<u32>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &CallRequest) -> Result<CallResult>;
}

#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn model_metadata(&self, model: &str) -> Result<ModelMetadata>;
}
