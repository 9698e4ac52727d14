//! docsight command line.
//!
//! Usage:
//!   docsight analyze report.md --pretty
//!   docsight analyze doc.json --mind-map
//!   docsight budget openai/gpt-4o-mini --input-tokens 3000

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docsight::budget::ContextBudgeter;
use docsight::clients::HttpChatClient;
use docsight::{Analyzer, Config, Document, ProgressEvent};

#[derive(Parser)]
#[command(name = "docsight")]
#[command(about = "Multi-stage LLM document analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a markdown, text or JSON document and print the result as JSON
    Analyze {
        path: PathBuf,
        /// Document title (defaults to the file name or first heading)
        #[arg(long)]
        title: Option<String>,
        /// Also generate a mind map
        #[arg(long)]
        mind_map: bool,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Show the output-token budget for a model
    Budget {
        model: String,
        /// Estimated prompt size in tokens
        #[arg(long, default_value_t = 0)]
        input_tokens: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    // stdout carries the JSON result; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.runtime.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze {
            path,
            title,
            mind_map,
            pretty,
        } => analyze(&config, path, title, mind_map, pretty).await,
        Commands::Budget {
            model,
            input_tokens,
        } => budget(&config, &model, input_tokens).await,
    }
}

async fn analyze(
    config: &Config,
    path: PathBuf,
    title: Option<String>,
    mind_map: bool,
    pretty: bool,
) -> Result<()> {
    if config.provider.api_key.is_none() {
        tracing::warn!("no API key set (DOCSIGHT_API_KEY or OPENROUTER_API_KEY)");
    }
    let doc = Document::from_path(&path, title.as_deref())
        .with_context(|| format!("failed to load {}", path.display()))?;
    info!(
        "loaded '{}' ({} chars, {} sections)",
        doc.title,
        doc.text.chars().count(),
        doc.flatten_sections().len()
    );

    let analyzer = Analyzer::from_config(config)?;
    let on_progress = |event: ProgressEvent| {
        eprintln!("[{:>3}%] {}", event.percent_complete, event.message);
    };
    let result = analyzer.analyze_document(&doc, Some(&on_progress)).await?;

    let output = if mind_map {
        let map = analyzer.generate_mind_map(&doc, &result).await;
        json!({ "analysis": result, "mind_map": map })
    } else {
        serde_json::to_value(&result)?
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);
    Ok(())
}

async fn budget(config: &Config, model: &str, input_tokens: u32) -> Result<()> {
    let client = Arc::new(HttpChatClient::new(&config.provider)?);
    let budgeter = ContextBudgeter::new(client, config.budget.clone());
    let meta = budgeter.metadata(model).await;
    let max_tokens = budgeter.compute_max_tokens(model, input_tokens, None).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "model": model,
            "context_length": meta.context_length,
            "max_completion_tokens": meta.max_completion_tokens,
            "safety_buffer": config.budget.safety_buffer,
            "input_tokens": input_tokens,
            "max_tokens": max_tokens,
        }))?
    );
    Ok(())
}
