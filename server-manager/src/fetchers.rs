//! Poll-engine fetchers backed by a [`ServerClient`]

use std::sync::Arc;

use async_trait::async_trait;
use poll_engine::{json_hash, FetchError, ItemFetcher};

use crate::client::{ObjectData, ProtocolFamily, ProtocolItem, ServerClient};

/// Polls whole objects; the owner key and the single item ID are both the object name
pub struct ObjectFetcher {
    client: Arc<dyn ServerClient>,
}

impl ObjectFetcher {
    pub fn new(client: Arc<dyn ServerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ItemFetcher for ObjectFetcher {
    type Item = ObjectData;
    type Id = String;

    async fn fetch_items(&self, owner: &str, _ids: &[String]) -> Result<Vec<ObjectData>, FetchError> {
        let data = self.client.object_data(owner).await?;
        Ok(vec![data])
    }

    fn item_id(&self, item: &ObjectData) -> String {
        item.name.clone()
    }

    fn value_hash(&self, item: &ObjectData) -> String {
        json_hash(&item.data)
    }
}

/// Polls protocol items of one family, grouped by object
pub struct ProtocolFetcher {
    client: Arc<dyn ServerClient>,
    family: ProtocolFamily,
}

impl ProtocolFetcher {
    pub fn new(client: Arc<dyn ServerClient>, family: ProtocolFamily) -> Self {
        Self { client, family }
    }

    pub fn family(&self) -> ProtocolFamily {
        self.family
    }
}

#[async_trait]
impl ItemFetcher for ProtocolFetcher {
    type Item = ProtocolItem;
    type Id = u64;

    async fn fetch_items(&self, owner: &str, ids: &[u64]) -> Result<Vec<ProtocolItem>, FetchError> {
        Ok(self.client.protocol_items(self.family, owner, ids).await?)
    }

    fn item_id(&self, item: &ProtocolItem) -> u64 {
        item.id
    }

    fn value_hash(&self, item: &ProtocolItem) -> String {
        json_hash(&(&item.value, &item.error))
    }
}
