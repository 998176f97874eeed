//! h3net configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordinator::NetworkConfig;
use crate::link::Consistency;

/// Main h3net configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Coordinator, mailbox and delivery settings
    pub network: NetworkConfig,

    /// Settings for `h3net demo`
    pub demo: DemoConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .h3net.yml
        let local_config = PathBuf::from(".h3net.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/h3net/h3net.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("h3net").join("h3net.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Any failure yields `None`; the full load reports errors later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".h3net.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("h3net").join("h3net.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Config>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Settings for the bundled demonstration network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of consumer actors fed by the producer
    pub consumers: usize,

    /// Training epochs the producer runs over its data feed
    pub epochs: u32,

    /// Size of the generated training set
    pub samples: usize,

    /// Samples per training batch
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Consistency of producer -> consumer links
    pub consistency: Consistency,

    /// Seed for the generated data; random when unset
    pub seed: Option<u64>,

    /// Where to write the producer's final store snapshot
    #[serde(rename = "snapshot-dir")]
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            consumers: 2,
            epochs: 3,
            samples: 64,
            batch_size: 8,
            consistency: Consistency::Async,
            seed: None,
            snapshot_dir: None,
        }
    }
}
