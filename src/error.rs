//! Domain-specific error types for docsight

use thiserror::Error;

/// Main error type for the docsight orchestrator
#[derive(Error, Debug)]
pub enum DocsightError {
    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport { status: Option<u16>, message: String },

    #[error("Cascade exhausted for task {task} after {attempts} attempts: {last_error}")]
    ExhaustedCascade {
        task: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid response: {message} (content: {snippet})")]
    InvalidResponse { message: String, snippet: String },

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<DocsightError>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DocsightError {
    /// Wraps an error with the name of the pipeline stage that produced it.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        DocsightError::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any `Stage` wrappers.
    pub fn root(&self) -> &DocsightError {
        match self {
            DocsightError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the model answered but nothing parseable was found.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self.root(), DocsightError::InvalidResponse { .. })
    }

    /// True when every model/retry combination failed.
    pub fn is_cascade_exhaustion(&self) -> bool {
        matches!(self.root(), DocsightError::ExhaustedCascade { .. })
    }
}

impl From<anyhow::Error> for DocsightError {
    fn from(err: anyhow::Error) -> Self {
        DocsightError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DocsightError {
    fn from(err: serde_json::Error) -> Self {
        DocsightError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for DocsightError {
    fn from(err: reqwest::Error) -> Self {
        DocsightError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<std::io::Error> for DocsightError {
    fn from(err: std::io::Error) -> Self {
        DocsightError::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<toml::de::Error> for DocsightError {
    fn from(err: toml::de::Error) -> Self {
        DocsightError::Config {
            message: err.to_string(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

/// Result type alias for docsight operations
pub type Result<T> = std::result::Result<T, DocsightError>;
