//! Typed events pushed to live sessions

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// An event delivered to hub subscribers
///
/// Payloads are carried as JSON values so the hub stays independent of the
/// server and protocol crates that produce them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// An object's data changed
    ObjectData {
        server_id: String,
        object: String,
        data: Value,
        timestamp: DateTime<Utc>,
    },

    /// One or more protocol items (sensors, registers, variables) changed
    ProtocolData {
        server_id: String,
        family: String,
        object: String,
        items: Vec<Value>,
        timestamp: DateTime<Utc>,
    },

    /// A server's connection status changed
    ServerStatus { server_id: String, status: Value },

    /// A server's object list should be reloaded
    ObjectsChanged {
        server_id: String,
        objects: Vec<String>,
    },

    /// The exclusive-control holder changed
    ControlStatus { has_controller: bool },
}

impl HubEvent {
    /// Event name used on the wire (e.g. as the SSE `event:` field)
    pub fn event_type(&self) -> &'static str {
        match self {
            HubEvent::ObjectData { .. } => "object_data",
            HubEvent::ProtocolData { .. } => "protocol_data",
            HubEvent::ServerStatus { .. } => "server_status",
            HubEvent::ObjectsChanged { .. } => "objects_changed",
            HubEvent::ControlStatus { .. } => "control_status",
        }
    }

    /// Key matched against subscriber filters; `None` reaches everyone
    pub fn filter_key(&self) -> Option<&str> {
        match self {
            HubEvent::ObjectData { server_id, .. }
            | HubEvent::ProtocolData { server_id, .. }
            | HubEvent::ServerStatus { server_id, .. }
            | HubEvent::ObjectsChanged { server_id, .. } => Some(server_id.as_str()),
            HubEvent::ControlStatus { .. } => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
