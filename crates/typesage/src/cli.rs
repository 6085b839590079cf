use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "typesage",
    // Use the default attributes feature of clap to set the proper version at compile time
    version,
    about = "TypeSage CLI",
    long_about = "Finds identifiers in Python snippets that static analysis cannot type and infers their types, reusing cached results and learned patterns."
)]
pub struct TypesageCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

impl TypesageCli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to a TOML configuration file (default: <data dir>/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the cache database and logs (default: ~/.typesage)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Write logs to a rolling file under <data dir>/logs
    #[arg(long, global = true)]
    pub log_file: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a Python snippet and infer types for unresolved identifiers
    Analyze(RequestArgs),
    /// Analyze a Python snippet and print it with type annotations added
    Annotate(RequestArgs),
    /// Inspect or clear cached analyses
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
    /// Inspect the learned pattern memory
    Memory {
        #[command(subcommand)]
        action: MemoryCommands,
    },
    /// List recent type assertions, newest first
    History {
        /// Maximum number of records (default: history_limit from the configuration)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show storage, cache and inference service status
    Status,
}

#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Python file to analyze, or `-` for stdin
    #[arg(value_name = "FILE", default_value = "-")]
    pub input: PathBuf,

    /// Do not call the external inference service
    #[arg(long)]
    pub offline: bool,

    /// Recompute even when a cached result exists
    #[arg(long)]
    pub no_cache: bool,

    /// Do not reuse learned patterns
    #[arg(long)]
    pub no_memory: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Count cached results, memory patterns and history records
    Stats,
    /// Remove one cached result, or everything when no fingerprint is given
    Clear {
        /// Hex fingerprint of the result to remove
        #[arg(long, value_name = "HEX")]
        fingerprint: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum MemoryCommands {
    /// Search patterns by shape or type
    Search {
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,
    },
    /// Export patterns and history as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Pattern counts, confidence distribution and most used patterns
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_defaults_to_stdin() {
        let cli = TypesageCli::try_parse_from(["typesage", "analyze"]).unwrap();
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.input, PathBuf::from("-"));
        assert!(!args.offline && !args.no_cache && !args.no_memory);
    }

    #[test]
    fn test_request_flags_and_globals() {
        let cli = TypesageCli::try_parse_from([
            "typesage",
            "annotate",
            "cart.py",
            "--offline",
            "--no-cache",
            "--no-memory",
            "--data-dir",
            "/tmp/ts",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.global.data_dir, Some(PathBuf::from("/tmp/ts")));
        assert!(cli.global.verbose);
        let Commands::Annotate(args) = cli.command else {
            panic!("expected annotate");
        };
        assert_eq!(args.input, PathBuf::from("cart.py"));
        assert!(args.offline && args.no_cache && args.no_memory);
    }

    #[test]
    fn test_nested_commands() {
        let cli =
            TypesageCli::try_parse_from(["typesage", "cache", "clear", "--fingerprint", "ab"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheCommands::Clear { fingerprint: Some(ref f) }
            } if f == "ab"
        ));

        let cli = TypesageCli::try_parse_from([
            "typesage",
            "memory",
            "search",
            "--query",
            "float",
            "--min-confidence",
            "0.8",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Memory {
                action: MemoryCommands::Search { ref query, min_confidence }
            } if query == "float" && min_confidence == 0.8
        ));

        let cli = TypesageCli::try_parse_from(["typesage", "history", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::History { limit: Some(5) }));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(TypesageCli::try_parse_from(["typesage", "serve"]).is_err());
    }
}
