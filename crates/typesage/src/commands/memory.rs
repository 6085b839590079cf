use anyhow::Result;
use engine::AnalysisEngine;
use std::fs;
use tracing::info;

use crate::cli::MemoryCommands;
use crate::utils::{print_json, to_json};

pub fn run(engine: &AnalysisEngine, action: &MemoryCommands) -> Result<()> {
    match action {
        MemoryCommands::Search {
            query,
            min_confidence,
        } => print_json(&engine.memory_search(query, *min_confidence)),
        MemoryCommands::Export { output } => {
            let export = engine.memory_export()?;
            match output {
                Some(path) => {
                    fs::write(path, to_json(&export)?)?;
                    info!(
                        patterns = export.metadata.total_patterns,
                        history = export.metadata.total_history_records,
                        "Exported memory to {}",
                        path.display()
                    );
                    Ok(())
                }
                None => print_json(&export),
            }
        }
        MemoryCommands::Stats => print_json(&engine.memory_statistics()?),
    }
}
