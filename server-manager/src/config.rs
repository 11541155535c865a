//! Server and polling configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// Identity and address of one remote server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ServerConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The configured name, or the URL when none is set
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.url,
        }
    }
}

/// Timing shared by every server instance
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Interval of the object-data poller
    /// Default: 5 seconds
    pub object_interval: Duration,

    /// Interval of each protocol poller
    /// Default: 5 seconds
    pub protocol_interval: Duration,

    /// Maximum item IDs per protocol fetch; 0 means unbounded
    /// Default: 50
    pub batch_size: usize,

    /// Time between health probes
    /// Default: 10 seconds
    pub health_interval: Duration,

    /// How long a single probe may take before it counts as failed
    /// Default: 5 seconds
    pub probe_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            object_interval: Duration::from_secs(5),
            protocol_interval: Duration::from_secs(5),
            batch_size: 50,
            health_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl PollSettings {
    pub fn with_object_interval(mut self, interval: Duration) -> Self {
        self.object_interval = interval;
        self
    }

    pub fn with_protocol_interval(mut self, interval: Duration) -> Self {
        self.protocol_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Validate the settings and return any issues
    pub fn validate(&self) -> Result<(), ManagerError> {
        let intervals = [
            ("object_interval", self.object_interval),
            ("protocol_interval", self.protocol_interval),
            ("health_interval", self.health_interval),
            ("probe_timeout", self.probe_timeout),
        ];

        for (field, value) in intervals {
            if value.is_zero() {
                return Err(ManagerError::Configuration(format!(
                    "{field} must be greater than 0"
                )));
            }
        }

        Ok(())
    }
}
