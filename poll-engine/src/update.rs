//! Detected changes emitted by the engine

use chrono::{DateTime, Utc};

/// A single changed item, tagged with the owner it was subscribed under
#[derive(Debug, Clone, PartialEq)]
pub struct Update<I> {
    /// Owner key the item was subscribed under
    pub owner: String,
    /// Item snapshot as returned by the fetcher
    pub item: I,
    /// When the change was detected
    pub timestamp: DateTime<Utc>,
}

impl<I> Update<I> {
    pub fn new(owner: impl Into<String>, item: I, timestamp: DateTime<Utc>) -> Self {
        Self {
            owner: owner.into(),
            item,
            timestamp,
        }
    }

    /// Transform the item while keeping owner and timestamp
    pub fn map<J>(self, f: impl FnOnce(I) -> J) -> Update<J> {
        Update {
            owner: self.owner,
            item: f(self.item),
            timestamp: self.timestamp,
        }
    }
}
