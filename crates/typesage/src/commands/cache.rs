use anyhow::Result;
use engine::{AnalysisEngine, Fingerprint};

use crate::cli::CacheCommands;
use crate::utils::print_json;

pub fn run(engine: &AnalysisEngine, action: &CacheCommands) -> Result<()> {
    match action {
        CacheCommands::Stats => print_json(&engine.cache_stats()),
        CacheCommands::Clear { fingerprint } => {
            let fingerprint = fingerprint
                .as_deref()
                .map(str::parse::<Fingerprint>)
                .transpose()?;
            let report = engine.cache_clear(fingerprint.as_ref())?;
            print_json(&report)
        }
    }
}
