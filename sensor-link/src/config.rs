//! Client configuration types
//!
//! Timeouts and transfer parameters for one device session. Every field has a
//! default, so an empty TOML/JSON table deserializes to a usable configuration.

use crate::signals::SignalId;
use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// How long `start_logging` waits for the board to hand out a logger (default: 5000ms)
    #[serde(default = "default_logger_ready_timeout")]
    pub logger_ready_timeout_ms: u64,

    /// How long `set_sample_delay` waits for the time processor handle (default: 5000ms)
    #[serde(default = "default_processor_timeout")]
    pub processor_timeout_ms: u64,

    /// Maximum silence during a log download before giving up (default: 10000ms)
    #[serde(default = "default_download_timeout")]
    pub download_timeout_ms: u64,

    /// Number of progress notifications requested for a download (default: 10)
    #[serde(default = "default_download_batch_size")]
    pub download_batch_size: u8,

    /// Whether the onboard recorder may overwrite its oldest entries when full
    #[serde(default)]
    pub overwrite_log: bool,

    /// Signals resolved to their high-frequency streaming variant
    #[serde(default)]
    pub high_frequency: Vec<SignalId>,
}

fn default_logger_ready_timeout() -> u64 {
    5000
}

fn default_processor_timeout() -> u64 {
    5000
}

fn default_download_timeout() -> u64 {
    10_000
}

fn default_download_batch_size() -> u8 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            logger_ready_timeout_ms: default_logger_ready_timeout(),
            processor_timeout_ms: default_processor_timeout(),
            download_timeout_ms: default_download_timeout(),
            download_batch_size: default_download_batch_size(),
            overwrite_log: false,
            high_frequency: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the logger ready timeout
    pub fn with_logger_ready_timeout(mut self, timeout: Duration) -> Self {
        self.logger_ready_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the time processor timeout
    pub fn with_processor_timeout(mut self, timeout: Duration) -> Self {
        self.processor_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the default download timeout
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the download progress batch size
    pub fn with_download_batch_size(mut self, batch_size: u8) -> Self {
        self.download_batch_size = batch_size;
        self
    }

    /// Builder method: allow the recorder to overwrite old entries
    pub fn with_overwrite_log(mut self, enabled: bool) -> Self {
        self.overwrite_log = enabled;
        self
    }

    /// Builder method: use the high-frequency variant of a signal
    pub fn with_high_frequency(mut self, signal: SignalId) -> Self {
        if !self.high_frequency.contains(&signal) {
            self.high_frequency.push(signal);
        }
        self
    }

    pub fn logger_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.logger_ready_timeout_ms)
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_millis(self.processor_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    /// Check if a signal should use its high-frequency variant
    pub fn is_high_frequency(&self, signal: SignalId) -> bool {
        self.high_frequency.contains(&signal)
    }

    /// Reject configurations no board interaction could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.logger_ready_timeout_ms == 0 {
            return Err(Error::Configuration(
                "logger_ready_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.processor_timeout_ms == 0 {
            return Err(Error::Configuration(
                "processor_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.download_timeout_ms == 0 {
            return Err(Error::Configuration(
                "download_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.download_batch_size == 0 {
            return Err(Error::Configuration(
                "download_batch_size must be at least 1".to_string(),
            ));
        }
        if let Some(signal) = self
            .high_frequency
            .iter()
            .find(|s| !s.supports_high_frequency())
        {
            return Err(Error::Configuration(format!(
                "{} has no high-frequency variant",
                signal
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new()
            .with_logger_ready_timeout(Duration::from_secs(2))
            .with_download_timeout(Duration::from_millis(500))
            .with_download_batch_size(4)
            .with_overwrite_log(true)
            .with_high_frequency(SignalId::Accelerometer)
            .with_high_frequency(SignalId::Accelerometer);

        assert_eq!(config.logger_ready_timeout(), Duration::from_secs(2));
        assert_eq!(config.download_timeout(), Duration::from_millis(500));
        assert_eq!(config.download_batch_size, 4);
        assert!(config.overwrite_log);
        assert_eq!(config.high_frequency, vec![SignalId::Accelerometer]);
        assert!(config.is_high_frequency(SignalId::Accelerometer));
        assert!(!config.is_high_frequency(SignalId::Gyroscope));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = ClientConfig::new().with_download_batch_size(0);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = ClientConfig::new().with_high_frequency(SignalId::Battery);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = ClientConfig::new().with_processor_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_from_empty_document() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.download_timeout(), Duration::from_secs(10));
    }
}
