use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DocsightError, Result};
use crate::tasks::{TaskOverride, TaskRegistry, TaskType};

/// Main configuration structure loaded from docsight.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub budget: BudgetConfig,
    pub continuation: ContinuationConfig,
    pub cascade: CascadeConfig,
    pub pipeline: PipelineConfig,
    /// Per-task overrides layered over the built-in task table
    pub tasks: HashMap<TaskType, TaskOverride>,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Connection settings for the OpenAI-compatible completion provider
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Never written back out; supplied through the environment in practice
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub referer: String,
    pub title: String,
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            referer: "https://github.com/docsight/docsight".to_string(),
            title: "docsight".to_string(),
            timeout_ms: 120_000,
        }
    }
}

/// Output-token budgeting against the model context window
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub safety_buffer: u32,
    pub default_context_length: u32,
    pub chars_per_token: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            safety_buffer: 1000,
            default_context_length: 4096,
            chars_per_token: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContinuationConfig {
    pub max_rounds: u32,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self { max_rounds: 3 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Number of full primary/fallback sweeps
    pub retry_budget: u32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self { retry_budget: 2 }
    }
}

/// Analysis pipeline tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sections shorter than this are summarized by truncation instead of a model call
    pub section_min_chars: usize,
    pub section_concurrency: usize,
    pub max_input_chars: usize,
    /// Length of truncation-based section summaries
    pub section_summary_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            section_min_chars: 200,
            section_concurrency: 4,
            max_input_chars: 24_000,
            section_summary_chars: 280,
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "docsight=info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn load_from_env() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "docsight=info".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses DOCSIGHT_CONFIG environment variable or defaults to "docsight.toml"
    pub fn load() -> Result<Self> {
        if let Ok(env_path) = std::env::var("DOCSIGHT_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let config_path =
            std::env::var("DOCSIGHT_CONFIG").unwrap_or_else(|_| "docsight.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) =
            std::env::var("DOCSIGHT_API_KEY").or_else(|_| std::env::var("OPENROUTER_API_KEY"))
        {
            self.provider.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("DOCSIGHT_BASE_URL") {
            self.provider.base_url = url;
            tracing::debug!("DOCSIGHT_BASE_URL env override applied");
        }
        if let Some(timeout) = std::env::var("DOCSIGHT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.provider.timeout_ms = timeout;
        }
        if let Some(rounds) = std::env::var("DOCSIGHT_MAX_CONTINUATIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.continuation.max_rounds = rounds;
        }
        if let Some(budget) = std::env::var("DOCSIGHT_RETRY_BUDGET")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.cascade.retry_budget = budget;
        }
        if let Some(n) = std::env::var("DOCSIGHT_SECTION_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.pipeline.section_concurrency = n;
        }
    }

    /// Clamp soft limits with a warning; reject settings nothing can run with.
    pub fn validate(&mut self) -> Result<()> {
        if self.provider.base_url.trim().is_empty() {
            return Err(DocsightError::Config {
                message: "provider.base_url must not be empty".to_string(),
            });
        }
        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            tracing::warn!(
                "Provider URL '{}' doesn't start with http:// or https://",
                self.provider.base_url
            );
        }

        if self.continuation.max_rounds > 10 {
            tracing::warn!(
                "continuation.max_rounds {} exceeds max 10, clamping to 10",
                self.continuation.max_rounds
            );
            self.continuation.max_rounds = 10;
        }
        if self.pipeline.section_concurrency == 0 {
            self.pipeline.section_concurrency = 1;
        }
        if self.budget.chars_per_token == 0 {
            self.budget.chars_per_token = 4;
        }

        for (task, ov) in &self.tasks {
            if let Some(t) = ov.temperature
                && !(0.0..=2.0).contains(&t)
            {
                return Err(DocsightError::Config {
                    message: format!("tasks.{task}.temperature must be between 0.0 and 2.0"),
                });
            }
        }

        Ok(())
    }

    /// Built-in task table with this config's overrides applied.
    pub fn task_registry(&self) -> TaskRegistry {
        TaskRegistry::with_overrides(&self.tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.budget.safety_buffer, 1000);
        assert_eq!(config.budget.default_context_length, 4096);
        assert_eq!(config.continuation.max_rounds, 3);
        assert_eq!(config.cascade.retry_budget, 2);
        assert_eq!(config.pipeline.section_min_chars, 200);
    }

    #[test]
    fn partial_toml_keeps_defaults_and_reads_task_overrides() {
        let mut config = Config::from_toml_str(
            r#"
            [continuation]
            max_rounds = 25

            [tasks.tldr]
            primary_model = "openai/gpt-4o"
            temperature = 0.1
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.continuation.max_rounds, 10);
        assert_eq!(config.cascade.retry_budget, 2);

        let registry = config.task_registry();
        let tldr = registry.get(TaskType::Tldr);
        assert_eq!(tldr.primary_model, "openai/gpt-4o");
        assert_eq!(tldr.temperature, 0.1);
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let mut config = Config::from_toml_str(
            r#"
            [tasks.signal_analysis]
            temperature = 3.5
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let mut config = Config::default();
        config.provider.base_url = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(DocsightError::Config { .. })
        ));
    }
}
