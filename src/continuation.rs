//! Continuation of truncated completions.
//!
//! A completion cut off by the provider's token limit (`finish_reason =
//! length`) is resumed by replaying the conversation with everything produced
//! so far as an assistant turn and asking the model to carry on. Fragments are
//! joined with [`stitch`]. When the model restarts from the beginning instead
//! of continuing, the text accumulated so far is kept as final: that trades
//! completeness for a guaranteed end to the loop.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::budget::ContextBudgeter;
use crate::clients::traits::{CallRequest, CallResult, ChatMessage, ChatTransport, FinishReason};
use crate::error::{DocsightError, Result};

pub const CONTINUE_PROMPT: &str = "Continue precisely from where you left off. \
Do not repeat any text already provided.";

/// Leading characters compared when looking for a restart
const RESTART_PROBE_CHARS: usize = 80;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A logical completion before budgeting: the engine fills in `max_tokens`
/// per round from the budgeter unless the caller fixed it.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    AwaitingContinuation { round: u32 },
    Done,
}

pub struct ContinuationEngine {
    transport: Arc<dyn ChatTransport>,
    budgeter: Arc<ContextBudgeter>,
    max_rounds: u32,
}

impl ContinuationEngine {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        budgeter: Arc<ContextBudgeter>,
        max_rounds: u32,
    ) -> Self {
        Self {
            transport,
            budgeter,
            max_rounds,
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<CallResult> {
        let mut state = State::Initial;
        let mut content = String::new();
        let mut tokens_used = 0u64;
        let mut model = request.model.clone();
        let mut finish_reason = FinishReason::Other;

        while state != State::Done {
            let messages = match state {
                State::Initial => request.messages.clone(),
                _ => continuation_messages(&request.messages, &content),
            };
            let estimated = self.budgeter.estimate_messages(&messages);
            let max_tokens = self
                .budgeter
                .compute_max_tokens(&request.model, estimated, request.max_tokens)
                .await;
            if max_tokens == 0 {
                if let State::AwaitingContinuation { round } = state {
                    warn!(
                        "continuation exhausted at round {}: no output budget left for {}",
                        round, request.model
                    );
                    finish_reason = FinishReason::Length;
                    break;
                }
                return Err(DocsightError::Validation {
                    message: format!(
                        "prompt of ~{} tokens leaves no output budget for {}",
                        estimated, request.model
                    ),
                });
            }

            let call = CallRequest {
                model: request.model.clone(),
                messages,
                max_tokens: Some(max_tokens),
                temperature: request.temperature,
            };
            let result = self.transport.send(&call).await?;

            tokens_used += result.tokens_used;
            model = result.model;
            finish_reason = result.finish_reason;

            state = match state {
                State::Initial => {
                    content = result.content;
                    self.after_round(0, finish_reason)
                }
                State::AwaitingContinuation { round } => {
                    if is_restart(&content, &result.content) {
                        warn!(
                            "model {} restarted instead of continuing (round {}), keeping {} chars",
                            model,
                            round,
                            content.len()
                        );
                        // the kept text is still the truncated one
                        finish_reason = FinishReason::Length;
                        State::Done
                    } else {
                        content = stitch(&content, &result.content);
                        self.after_round(round, finish_reason)
                    }
                }
                State::Done => State::Done,
            };
        }

        Ok(CallResult {
            content,
            tokens_used,
            model,
            finish_reason,
        })
    }

    fn after_round(&self, round: u32, finish_reason: FinishReason) -> State {
        if finish_reason != FinishReason::Length {
            return State::Done;
        }
        if round >= self.max_rounds {
            warn!(
                "continuation exhausted after {} rounds; returning possibly incomplete content",
                round
            );
            return State::Done;
        }
        debug!("completion truncated, requesting continuation {}", round + 1);
        State::AwaitingContinuation { round: round + 1 }
    }
}

fn continuation_messages(original: &[ChatMessage], accumulated: &str) -> Vec<ChatMessage> {
    let mut messages = original.to_vec();
    messages.push(ChatMessage::assistant(accumulated));
    messages.push(ChatMessage::user(CONTINUE_PROMPT));
    messages
}

/// Join a continuation fragment onto the accumulated text.
///
/// A clean continuation is appended verbatim; markdown fences split across
/// fragments are left for the decoder. A fragment that restarts the output
/// leaves `existing` unchanged.
pub fn stitch(existing: &str, incoming: &str) -> String {
    if is_restart(existing, incoming) {
        return existing.to_string();
    }
    let mut out = String::with_capacity(existing.len() + incoming.len());
    out.push_str(existing);
    out.push_str(incoming);
    out
}

/// Does `incoming` begin by re-emitting `existing`?
///
/// Checked verbatim, then on NFC/whitespace-normalized text against the
/// leading [`RESTART_PROBE_CHARS`] characters of `existing`, which catches a
/// restart that drifts from the original further in.
pub fn is_restart(existing: &str, incoming: &str) -> bool {
    if existing.trim().is_empty() {
        return false;
    }
    if incoming.starts_with(existing) {
        return true;
    }
    let existing = normalize(existing);
    let incoming = normalize(incoming);
    let probe: String = existing.chars().take(RESTART_PROBE_CHARS).collect();
    !probe.is_empty() && incoming.starts_with(&probe)
}

fn normalize(text: &str) -> String {
    let composed: String = text.nfc().collect();
    WHITESPACE_RE.replace_all(composed.trim(), " ").into_owned()
}
