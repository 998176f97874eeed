//! h3net - actor network runtime
//!
//! CLI entry point for running the demonstration network.

use std::fs;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use h3net::cli::{Cli, Command, OutputFormat, get_log_path};
use h3net::config::Config;
use h3net::demo::{DemoReport, run_demo};
use h3net::link::Consistency;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Demo {
            consumers,
            epochs,
            seed,
            sync,
            snapshot_dir,
            format,
        }) => {
            if let Some(consumers) = consumers {
                config.demo.consumers = consumers;
            }
            if let Some(epochs) = epochs {
                config.demo.epochs = epochs;
            }
            if seed.is_some() {
                config.demo.seed = seed;
            }
            if sync {
                config.demo.consistency = Consistency::Sync;
            }
            if snapshot_dir.is_some() {
                config.demo.snapshot_dir = snapshot_dir;
            }
            cmd_demo(&config, format).await
        }
        Some(Command::Config) => cmd_config(&config),
        None => {
            println!("{} Run {} to see available commands", "h3net".cyan().bold(), "h3net --help".yellow());
            Ok(())
        }
    }
}

async fn cmd_demo(config: &Config, format: OutputFormat) -> Result<()> {
    let report = run_demo(config).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &DemoReport) {
    println!("{} trained over {} steps (seed {})", "✓".green(), report.steps, report.seed);
    println!(
        "  trainer  W = {} b = {} (v{})",
        format!("{:.4}", report.weight).cyan(),
        format!("{:.4}", report.bias).cyan(),
        report.weight_version
    );
    for consumer in &report.consumers {
        let prediction = consumer
            .prediction
            .map(|p| format!("{:.4}", p))
            .unwrap_or_else(|| "-".to_string());
        let marker = if consumer.weight_version == report.weight_version {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {} W v{} prediction({}) = {}",
            marker,
            consumer.actor.yellow(),
            consumer.weight_version,
            report.probe,
            prediction.cyan()
        );
    }

    let m = &report.metrics;
    println!(
        "  {} routed {} delivered {} retries {} failures {}",
        "metrics".dimmed(),
        m.messages_routed,
        m.messages_delivered,
        m.delivery_retries,
        m.delivery_failures
    );
    if let Some(path) = &report.snapshot {
        println!("  {} {}", "snapshot".dimmed(), path.display());
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(config).context("Failed to render config")?);
    Ok(())
}
