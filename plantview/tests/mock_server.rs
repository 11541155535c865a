//! In-memory control-system server for end-to-end tests.

#![allow(dead_code)]

use async_trait::async_trait;
use plantview::server_manager::{
    ClientError, ObjectData, ProtocolFamily, ProtocolItem, ServerClient, ServerConfig, ServerConnector,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockServer {
    objects: Mutex<HashMap<String, Value>>,
    items: Mutex<HashMap<(ProtocolFamily, u64), Value>>,
    offline: AtomicBool,
}

impl MockServer {
    pub fn new(objects: &[&str]) -> Arc<Self> {
        let server = Arc::new(Self::default());
        for name in objects {
            server.set_object(name, json!({"state": "idle"}));
        }
        server
    }

    pub fn set_object(&self, name: &str, data: Value) {
        self.objects.lock().unwrap().insert(name.to_string(), data);
    }

    pub fn set_item(&self, family: ProtocolFamily, id: u64, value: Value) {
        self.items.lock().unwrap().insert((family, id), value);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ClientError::Unreachable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ServerClient for MockServer {
    async fn list_objects(&self) -> Result<Vec<String>, ClientError> {
        self.check()?;
        let mut names: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn object_data(&self, name: &str) -> Result<ObjectData, ClientError> {
        self.check()?;
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(name.to_string()))?;
        Ok(ObjectData {
            name: name.to_string(),
            data,
        })
    }

    async fn protocol_items(
        &self,
        family: ProtocolFamily,
        _object: &str,
        ids: &[u64],
    ) -> Result<Vec<ProtocolItem>, ClientError> {
        self.check()?;
        let items = self.items.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                items.get(&(family, *id)).map(|value| ProtocolItem {
                    id: *id,
                    name: format!("item{id}"),
                    value: value.clone(),
                    error: None,
                })
            })
            .collect())
    }
}

/// Connector serving a fixed table of mock servers
pub struct MockNetwork {
    servers: HashMap<String, Arc<MockServer>>,
}

impl MockNetwork {
    pub fn new(servers: Vec<(&str, Arc<MockServer>)>) -> Arc<Self> {
        Arc::new(Self {
            servers: servers.into_iter().map(|(id, s)| (id.to_string(), s)).collect(),
        })
    }
}

impl ServerConnector for MockNetwork {
    fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn ServerClient>, ClientError> {
        match self.servers.get(&config.id) {
            Some(server) => {
                let client: Arc<dyn ServerClient> = server.clone();
                Ok(client)
            }
            None => Err(ClientError::Unreachable(format!("no route to {}", config.url))),
        }
    }
}
