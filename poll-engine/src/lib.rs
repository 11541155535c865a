//! # poll-engine
//!
//! Generic change-detecting subscription poller used by every plantview
//! protocol family (object data, IONC sensors, Modbus registers, OPC UA
//! variables).
//!
//! Consumers subscribe item IDs under an *owner key* (usually an object
//! name). A background loop wakes on a fixed interval, fetches the
//! subscribed items through an [`ItemFetcher`], compares each item's value
//! hash with the last one seen and emits only the items that changed. All
//! changes of one cycle reach the callback as one batch.
//!
//! ```rust,ignore
//! use poll_engine::{PollConfig, PollEngine};
//!
//! let engine = PollEngine::new(PollConfig::new("ionc"), fetcher)?;
//! engine.set_callback(Arc::new(|batch| println!("{} changes", batch.len())));
//! engine.subscribe("Reactor1", [101, 102]);
//! engine.start();
//! // ...
//! engine.stop().await;
//! ```

mod config;
mod engine;
mod error;
mod fetcher;
mod registry;
mod update;

pub use config::PollConfig;
pub use engine::{PollEngine, PollStats, UpdateCallback};
pub use error::{FetchError, PersistError, PollError, Result};
pub use fetcher::{json_hash, ItemFetcher, PersistenceHook};
pub use registry::{Observation, SubscriptionRegistry};
pub use update::Update;
