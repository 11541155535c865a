//! Configuration for control arbitration

use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the [`ControlManager`](crate::ControlManager)
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Tokens allowed to take control. Empty disables arbitration entirely.
    /// Default: empty
    pub tokens: HashSet<String>,

    /// Inactivity after which a holder is treated as gone; zero never expires
    /// Default: 60 seconds
    pub timeout: Duration,

    /// Delay between a holder's event stream disconnecting and the release
    /// Default: 3 seconds
    pub grace_period: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tokens: HashSet::new(),
            timeout: Duration::from_secs(60),
            grace_period: Duration::from_secs(3),
        }
    }
}

impl ControlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.is_empty())
            .collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }
}
