mod cli;
mod commands;
mod config;
mod utils;

use crate::cli::{Commands, TypesageCli};
use crate::config::AppConfig;
use anyhow::Result;
use engine::AnalysisEngine;
use inference::{InferenceClient, OllamaClient};
use logging::LogMode;
use std::sync::Arc;
use tracing::debug;

fn build_engine(app: &AppConfig) -> Result<AnalysisEngine> {
    let storage = app.storage()?;
    debug!(?storage, "Opening storage");
    let store = storage.open()?;
    let client: Arc<dyn InferenceClient> = Arc::new(OllamaClient::new(app.ollama.clone()));
    Ok(AnalysisEngine::new(app.engine.clone(), store, Some(client))?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TypesageCli::parse_args();

    let mode = if cli.global.log_file {
        LogMode::File {
            dir: config::logs_dir(cli.global.data_dir.as_deref())?,
        }
    } else if cli.global.json_logs {
        LogMode::Json
    } else {
        LogMode::Cli
    };
    let _guards = logging::init(mode, cli.global.verbose)?;

    let app = AppConfig::resolve(cli.global.config.as_deref(), cli.global.data_dir.as_deref())?;

    let engine = build_engine(&app)?;

    match &cli.command {
        Commands::Analyze(args) => commands::analyze::run(&engine, args).await,
        Commands::Annotate(args) => commands::analyze::run_annotate(&engine, args).await,
        Commands::Cache { action } => commands::cache::run(&engine, action),
        Commands::Memory { action } => commands::memory::run(&engine, action),
        Commands::History { limit } => commands::status::run_history(&engine, *limit),
        Commands::Status => commands::status::run(&engine).await,
    }
}
