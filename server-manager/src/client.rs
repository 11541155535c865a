//! Remote server abstraction
//!
//! The wire format of a control-system server is an I/O concern handled
//! outside this crate. Everything here talks to a server through
//! [`ServerClient`], and the manager builds clients through a
//! [`ServerConnector`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ServerConfig;
use crate::error::ClientError;

/// Protocol families with their own item poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    Ionc,
    Modbus,
    OpcUa,
}

impl ProtocolFamily {
    pub const ALL: [ProtocolFamily; 3] = [ProtocolFamily::Ionc, ProtocolFamily::Modbus, ProtocolFamily::OpcUa];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolFamily::Ionc => "ionc",
            ProtocolFamily::Modbus => "modbus",
            ProtocolFamily::OpcUa => "opcua",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full state of one server object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectData {
    pub name: String,
    pub data: Value,
}

/// One protocol-level item (sensor, register, node) of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolItem {
    pub id: u64,
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Connection to one remote control-system server
#[async_trait]
pub trait ServerClient: Send + Sync + 'static {
    /// Names of every object the server exposes. Doubles as the health probe.
    async fn list_objects(&self) -> Result<Vec<String>, ClientError>;

    async fn object_data(&self, name: &str) -> Result<ObjectData, ClientError>;

    /// Current values of `ids` within `object` for one protocol family
    async fn protocol_items(
        &self,
        family: ProtocolFamily,
        object: &str,
        ids: &[u64],
    ) -> Result<Vec<ProtocolItem>, ClientError>;
}

/// Builds clients for newly added servers
pub trait ServerConnector: Send + Sync + 'static {
    fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn ServerClient>, ClientError>;
}

impl<F> ServerConnector for F
where
    F: Fn(&ServerConfig) -> Result<Arc<dyn ServerClient>, ClientError> + Send + Sync + 'static,
{
    fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn ServerClient>, ClientError> {
        self(config)
    }
}
