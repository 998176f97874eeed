//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;

/// h3net - actor network for sharing model artifacts
#[derive(Parser)]
#[command(
    name = "h3net",
    about = "Actor network runtime for sharing model parameters, layers and predictions",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/h3net/logs/h3net.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train a small model across a producer and predictor actors
    Demo {
        /// Number of predictor actors
        #[arg(short = 'n', long)]
        consumers: Option<usize>,

        /// Training epochs
        #[arg(short, long)]
        epochs: Option<u32>,

        /// Seed for the generated data
        #[arg(short, long)]
        seed: Option<u64>,

        /// Make producer links wait for delivery
        #[arg(long)]
        sync: bool,

        /// Write the trainer's final store snapshot into this directory
        #[arg(long, value_name = "DIR")]
        snapshot_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Path to the log file
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("h3net")
        .join("logs")
        .join("h3net.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_demo_flags() {
        let cli = Cli::parse_from(["h3net", "-l", "debug", "demo", "-n", "3", "--sync", "--format", "json"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Some(Command::Demo {
                consumers,
                sync,
                format,
                ..
            }) => {
                assert_eq!(consumers, Some(3));
                assert!(sync);
                assert!(matches!(format, OutputFormat::Json));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_log_path_location() {
        let path = get_log_path();
        assert!(path.ends_with("h3net/logs/h3net.log"));
    }
}
