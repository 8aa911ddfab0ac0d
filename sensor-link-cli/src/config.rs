//! Configuration loading and parsing

use anyhow::{Context, Result};
use clap::ValueEnum;
use sensor_link::{ClientConfig, SignalId, TimeMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The board to talk to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Model number the simulated board reports
    #[serde(default = "default_model_number")]
    pub model_number: String,
    /// Signals the board carries (default: all)
    pub available: Option<Vec<String>>,
}

fn default_model_number() -> String {
    "5".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model_number: default_model_number(),
            available: None,
        }
    }
}

/// What to do with one signal
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalConfig {
    pub name: String,
    #[serde(default)]
    pub mode: Mode,
    /// Number of samples to collect
    #[serde(default = "default_samples")]
    pub samples: usize,
    /// Time processor period, unset for the full rate
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub time_mode: TimeMode,
}

fn default_samples() -> usize {
    50
}

impl SignalConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::default(),
            samples: default_samples(),
            delay_ms: None,
            time_mode: TimeMode::default(),
        }
    }
}

/// Session mode of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Subscribe and receive samples as they are produced
    #[default]
    Stream,
    /// Record into the onboard log, then download it
    Log,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// JSON report file (default: stdout)
    pub report: Option<PathBuf>,
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report: None,
            pretty: default_pretty(),
        }
    }
}

/// Semantic problems in an otherwise well-formed configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown signal {name:?} in {section}")]
    UnknownSignal { name: String, section: &'static str },

    #[error("Signal {0} is listed more than once")]
    DuplicateSignal(SignalId),

    #[error("Signal {signal} needs at least one sample")]
    NoSamples { signal: SignalId },

    #[error(transparent)]
    Client(#[from] sensor_link::Error),
}

impl AppConfig {
    /// Resolved signal ids of `[[signals]]`, in file order
    pub fn signal_ids(&self) -> std::result::Result<Vec<SignalId>, ConfigError> {
        let mut ids = Vec::with_capacity(self.signals.len());
        for signal in &self.signals {
            let id = parse_signal(&signal.name, "[[signals]]")?;
            if ids.contains(&id) {
                return Err(ConfigError::DuplicateSignal(id));
            }
            if signal.samples == 0 {
                return Err(ConfigError::NoSamples { signal: id });
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Signals the simulated board carries
    pub fn available_signals(&self) -> std::result::Result<Vec<SignalId>, ConfigError> {
        match &self.device.available {
            Some(names) => names
                .iter()
                .map(|name| parse_signal(name, "[device].available"))
                .collect(),
            None => Ok(SignalId::ALL.to_vec()),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.client.validate()?;
        self.signal_ids()?;
        self.available_signals()?;
        Ok(())
    }
}

fn parse_signal(name: &str, section: &'static str) -> std::result::Result<SignalId, ConfigError> {
    name.parse().map_err(|_| ConfigError::UnknownSignal {
        name: name.to_string(),
        section,
    })
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}
