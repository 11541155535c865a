//! Top-level viewer configuration

use std::collections::HashSet;
use std::time::Duration;

use control_manager::ControlConfig;
use server_manager::{PollSettings, ServerConfig};

use crate::error::ViewerError;

/// Everything needed to start a [`Viewer`](crate::Viewer)
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Servers added at startup
    pub servers: Vec<ServerConfig>,

    /// Poll and health timing shared by every server
    pub poll: PollSettings,

    /// Control arbitration; no tokens means every session may write
    pub control: ControlConfig,

    /// Events buffered per live session before new ones are dropped
    /// Default: 100
    pub hub_capacity: usize,

    /// Upper bound on waiting for servers to stop
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            poll: PollSettings::default(),
            control: ControlConfig::default(),
            hub_capacity: 100,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ViewerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short intervals for dashboards that need near-live values
    pub fn fast_polling() -> Self {
        Self {
            poll: PollSettings::default()
                .with_object_interval(Duration::from_secs(1))
                .with_protocol_interval(Duration::from_secs(1))
                .with_health_interval(Duration::from_secs(3))
                .with_probe_timeout(Duration::from_secs(2)),
            hub_capacity: 500,
            ..Default::default()
        }
    }

    /// Long intervals and small queues for constrained deployments
    pub fn resource_efficient() -> Self {
        Self {
            poll: PollSettings::default()
                .with_object_interval(Duration::from_secs(30))
                .with_protocol_interval(Duration::from_secs(15))
                .with_batch_size(200)
                .with_health_interval(Duration::from_secs(60))
                .with_probe_timeout(Duration::from_secs(10)),
            hub_capacity: 32,
            ..Default::default()
        }
    }

    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_control(mut self, control: ControlConfig) -> Self {
        self.control = control;
        self
    }

    pub fn with_hub_capacity(mut self, capacity: usize) -> Self {
        self.hub_capacity = capacity;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ViewerError> {
        self.poll.validate()?;

        if self.hub_capacity == 0 {
            return Err(ViewerError::Configuration(
                "hub_capacity must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(ViewerError::Configuration(
                "shutdown_timeout must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.id.is_empty() {
                return Err(ViewerError::Configuration("Server ID must not be empty".to_string()));
            }
            if server.url.trim().is_empty() {
                return Err(ViewerError::Configuration(format!(
                    "Server {} has an empty URL",
                    server.id
                )));
            }
            if !seen.insert(server.id.as_str()) {
                return Err(ViewerError::Configuration(format!(
                    "Duplicate server ID: {}",
                    server.id
                )));
            }
        }

        Ok(())
    }
}
