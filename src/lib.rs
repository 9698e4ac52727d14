pub mod budget;
pub mod cascade;
pub mod clients;
pub mod config;
pub mod continuation;
pub mod decoder;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod schemas;
pub mod tasks;

pub use config::Config;
pub use document::{Document, Section};
pub use error::{DocsightError, Result};
pub use pipeline::{Analyzer, ProgressEvent, ProgressSink, Stage};
pub use schemas::AnalysisResult;

/// Load `./.env` into the process environment if present. `Config::load`
/// does this itself; library users that skip it can call this first.
pub fn load_env() {
    let _ = dotenvy::dotenv();
}
