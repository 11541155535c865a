//! Connection status of a server instance

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health state driven by the periodic object-list probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No probe has completed yet
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Point-in-time copy of an instance's status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub id: String,
    pub url: String,
    pub name: String,
    pub connected: bool,
    pub state: ConnectionState,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub object_count: usize,
}

impl ServerStatus {
    pub(crate) fn new(id: &str, url: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            name: name.to_string(),
            connected: false,
            state: ConnectionState::Unknown,
            last_poll: None,
            last_error: None,
            object_count: 0,
        }
    }

    /// Record a successful call; returns the previous state
    pub(crate) fn mark_connected(&mut self, object_count: Option<usize>) -> ConnectionState {
        let previous = self.state;
        self.state = ConnectionState::Connected;
        self.connected = true;
        self.last_error = None;
        self.last_poll = Some(Utc::now());
        if let Some(count) = object_count {
            self.object_count = count;
        }
        previous
    }

    /// Record a failed call; returns the previous state
    pub(crate) fn mark_disconnected(&mut self, error: String) -> ConnectionState {
        let previous = self.state;
        self.state = ConnectionState::Disconnected;
        self.connected = false;
        self.last_error = Some(error);
        self.last_poll = Some(Utc::now());
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_report_previous_state() {
        let mut status = ServerStatus::new("srv1", "http://plc", "plc");
        assert_eq!(status.mark_disconnected("refused".into()), ConnectionState::Unknown);
        assert!(!status.connected);
        assert_eq!(status.last_error.as_deref(), Some("refused"));

        assert_eq!(status.mark_connected(Some(4)), ConnectionState::Disconnected);
        assert!(status.connected);
        assert_eq!(status.object_count, 4);
        assert!(status.last_error.is_none());

        // A request that does not list objects keeps the old count
        status.mark_connected(None);
        assert_eq!(status.object_count, 4);
    }

    #[test]
    fn test_serializes_camel_case() {
        let status = ServerStatus::new("srv1", "http://plc", "plc");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["objectCount"], 0);
        assert_eq!(json["state"], "unknown");
        assert!(json["lastError"].is_null());
    }
}
