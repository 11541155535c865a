//! Protocol-facing traits the engine is parameterized by
//!
//! The engine never looks inside items. Everything it needs (fetching, the
//! item's identity and a comparable hash of its value) comes from an
//! [`ItemFetcher`] supplied per protocol family.

use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{FetchError, PersistError};
use crate::update::Update;

/// Fetches items for one protocol family
#[async_trait]
pub trait ItemFetcher: Send + Sync + 'static {
    /// The polled unit (sensor, register, object variable)
    type Item: Clone + Send + Sync + 'static;

    /// Identifier of an item within its owner
    type Id: Clone + Ord + Hash + Debug + Send + Sync + 'static;

    /// Fetch the current state of `ids` under `owner`
    async fn fetch_items(&self, owner: &str, ids: &[Self::Id]) -> Result<Vec<Self::Item>, FetchError>;

    /// Identity of a fetched item, used as the hash-cache key
    fn item_id(&self, item: &Self::Item) -> Self::Id;

    /// Opaque value hash. Only compared for equality, never parsed.
    fn value_hash(&self, item: &Self::Item) -> String;
}

/// Receives every emitted batch for durable storage
///
/// The engine calls this from a spawned task and only logs the result, so a
/// slow store never holds up the poll cadence.
#[async_trait]
pub trait PersistenceHook<I>: Send + Sync + 'static {
    async fn save_batch(&self, records: Vec<Update<I>>) -> Result<(), PersistError>;
}

/// Hash any serializable value by its JSON encoding
///
/// Serialization failures hash to an empty string, which still compares
/// unequal to any real value.
pub fn json_hash<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
