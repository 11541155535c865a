//! Configuration for a poll engine

use std::time::Duration;

use crate::error::PollError;

/// Configuration for a [`PollEngine`](crate::PollEngine)
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Name used in log output, e.g. "objects" or "modbus"
    /// Default: "poll"
    pub name: String,

    /// Time between poll cycles
    /// Default: 5 seconds
    pub interval: Duration,

    /// Maximum number of item IDs per fetch call; 0 means unbounded
    /// Default: 50
    pub batch_size: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            name: "poll".to_string(),
            interval: Duration::from_secs(5),
            batch_size: 50,
        }
    }
}

impl PollConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), PollError> {
        if self.interval == Duration::ZERO {
            return Err(PollError::Configuration(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.name.is_empty() {
            return Err(PollError::Configuration(
                "Poll engine name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PollConfig::new("ionc").with_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(PollError::Configuration(_))));
    }

    #[test]
    fn test_zero_batch_size_means_unbounded() {
        let config = PollConfig::new("ionc").with_batch_size(0);
        assert!(config.validate().is_ok());
    }
}
