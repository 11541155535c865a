//! Bridge from protocol poll batches to a history store

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poll_engine::{PersistError, PersistenceHook, Update};
use serde::Serialize;
use serde_json::Value;

use crate::client::{ProtocolFamily, ProtocolItem};

/// One stored value change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub server_id: String,
    pub family: ProtocolFamily,
    pub object: String,
    pub item_id: u64,
    pub name: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

/// Durable destination for value history
#[async_trait]
pub trait HistoryRecorder: Send + Sync + 'static {
    async fn save(&self, records: Vec<HistoryRecord>) -> Result<(), PersistError>;
}

/// Installed as a protocol engine's persistence hook
pub(crate) struct RecorderHook {
    server_id: String,
    family: ProtocolFamily,
    recorder: Arc<dyn HistoryRecorder>,
}

impl RecorderHook {
    pub(crate) fn new(server_id: &str, family: ProtocolFamily, recorder: Arc<dyn HistoryRecorder>) -> Self {
        Self {
            server_id: server_id.to_string(),
            family,
            recorder,
        }
    }

    fn to_record(&self, update: Update<ProtocolItem>) -> HistoryRecord {
        HistoryRecord {
            server_id: self.server_id.clone(),
            family: self.family,
            object: update.owner,
            item_id: update.item.id,
            name: update.item.name,
            value: update.item.value,
            timestamp: update.timestamp,
        }
    }
}

#[async_trait]
impl PersistenceHook<ProtocolItem> for RecorderHook {
    async fn save_batch(&self, records: Vec<Update<ProtocolItem>>) -> Result<(), PersistError> {
        let records: Vec<HistoryRecord> = records.into_iter().map(|u| self.to_record(u)).collect();
        self.recorder.save(records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct VecRecorder(Mutex<Vec<HistoryRecord>>);

    #[async_trait]
    impl HistoryRecorder for VecRecorder {
        async fn save(&self, records: Vec<HistoryRecord>) -> Result<(), PersistError> {
            self.0.lock().extend(records);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_updates_become_records() {
        let recorder = Arc::new(VecRecorder::default());
        let hook = RecorderHook::new("srv1", ProtocolFamily::Modbus, recorder.clone());

        let item = ProtocolItem {
            id: 3,
            name: "HR3".to_string(),
            value: Value::from(17),
            error: None,
        };
        hook.save_batch(vec![Update::new("Pump1", item, Utc::now())]).await.unwrap();

        let saved = recorder.0.lock();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].server_id, "srv1");
        assert_eq!(saved[0].family, ProtocolFamily::Modbus);
        assert_eq!(saved[0].object, "Pump1");
        assert_eq!(saved[0].item_id, 3);
        assert_eq!(saved[0].value, Value::from(17));
    }
}
