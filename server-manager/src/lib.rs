//! # server-manager
//!
//! Per-server connection lifecycle and multi-server orchestration.
//!
//! A [`ServerInstance`] wraps one remote control-system server. It owns an
//! object-data poller, one poller per [`ProtocolFamily`] and a health loop
//! that probes the server's object list and drives its
//! [`ConnectionState`]. The [`ServerManager`] keeps the instances, hands
//! them the event callbacks and answers queries spanning every server.
//!
//! ```rust,ignore
//! use server_manager::{PollSettings, ServerCallbacks, ServerConfig, ServerManager};
//!
//! let manager = ServerManager::new(connector, PollSettings::default())?;
//! manager.set_callbacks(
//!     ServerCallbacks::new().with_status_change(|status| println!("{:?}", status)),
//! );
//! manager.add_server(ServerConfig::new("plant1", "http://10.0.0.5:8080"))?;
//! // ...
//! manager.shutdown(Duration::from_secs(5)).await?;
//! ```

mod callbacks;
mod client;
mod config;
mod error;
mod fetchers;
mod instance;
mod manager;
mod recorder;
mod status;

pub use callbacks::{
    ObjectUpdateCallback, ObjectsChangedCallback, ProtocolUpdateCallback, ServerCallbacks, StatusChangeCallback,
};
pub use client::{ObjectData, ProtocolFamily, ProtocolItem, ServerClient, ServerConnector};
pub use config::{PollSettings, ServerConfig};
pub use error::{ClientError, ManagerError, Result};
pub use fetchers::{ObjectFetcher, ProtocolFetcher};
pub use instance::ServerInstance;
pub use manager::{ObjectRef, ServerManager};
pub use recorder::{HistoryRecord, HistoryRecorder};
pub use status::{ConnectionState, ServerStatus};

// Re-exported so callers can name update batches and recorder errors
// without depending on the poll engine directly
pub use poll_engine::{PersistError, Update};
