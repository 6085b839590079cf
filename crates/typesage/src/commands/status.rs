use anyhow::Result;
use engine::AnalysisEngine;

use crate::utils::print_json;

pub async fn run(engine: &AnalysisEngine) -> Result<()> {
    print_json(&engine.status().await)
}

pub fn run_history(engine: &AnalysisEngine, limit: Option<usize>) -> Result<()> {
    print_json(&engine.history(limit)?)
}
