//! # plantview
//!
//! Real-time monitoring core for industrial control networks.
//!
//! plantview polls one or more control-system servers for object and
//! protocol-item state, pushes only changed values to live sessions and
//! arbitrates which session may issue write commands.
//!
//! The pieces live in their own crates and are re-exported here:
//!
//! - [`poll_engine`]: generic change-detecting subscription poller
//! - [`server_manager`]: per-server lifecycle, health and aggregation
//! - [`control_manager`]: exclusive control arbitration
//! - [`notify_hub`]: non-blocking fan-out to live sessions
//!
//! [`Viewer`] wires them together.
//!
//! ```rust,ignore
//! use plantview::{logging, Viewer, ViewerConfig};
//! use plantview::server_manager::ServerConfig;
//!
//! logging::init_logging_from_env()?;
//!
//! let viewer = Viewer::start(
//!     ViewerConfig::default().with_server(ServerConfig::new("plant1", "http://10.0.0.5:8080")),
//!     connector,
//! )?;
//!
//! let mut session = viewer.open_session(None);
//! while let Some(event) = session.recv().await {
//!     println!("{}: {}", event.event_type(), event.to_json()?);
//! }
//! ```

pub mod logging;

mod config;
mod error;
mod viewer;

pub use config::ViewerConfig;
pub use error::{Result, ViewerError};
pub use viewer::Viewer;

pub use control_manager;
pub use notify_hub;
pub use poll_engine;
pub use server_manager;
