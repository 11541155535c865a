//! # control-manager
//!
//! Exclusive write-control arbitration for plantview.
//!
//! Operators present a pre-shared token to take control. At most one token
//! holds control at a time; a holder that stays inactive for longer than
//! the configured timeout is treated as gone, and a holder whose live event
//! stream disconnects is released after a short grace period unless it
//! comes back first.
//!
//! With no tokens configured arbitration is disabled and every session is
//! allowed to write.
//!
//! ```no_run
//! use std::time::Duration;
//! use control_manager::{ControlConfig, ControlManager};
//!
//! let control = ControlManager::new(
//!     ControlConfig::new()
//!         .with_tokens(["admin", "operator"])
//!         .with_timeout(Duration::from_secs(60)),
//! );
//!
//! control.take_control("admin")?;
//! assert!(control.is_controller("admin"));
//! # Ok::<(), control_manager::ControlError>(())
//! ```

mod config;
mod error;
mod manager;

pub use config::ControlConfig;
pub use error::{ControlError, Result};
pub use manager::{ControlManager, ControlStatus};
