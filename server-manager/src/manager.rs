//! Registry of server instances
//!
//! The manager owns one [`ServerInstance`] per configured server, hands each
//! of them the callbacks configured at the time it was added and answers
//! queries that span every server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;

use poll_engine::Update;

use crate::callbacks::ServerCallbacks;
use crate::client::{ObjectData, ProtocolFamily, ProtocolItem, ServerConnector};
use crate::config::{PollSettings, ServerConfig};
use crate::error::{ClientError, ManagerError, Result};
use crate::instance::ServerInstance;
use crate::recorder::HistoryRecorder;
use crate::status::ServerStatus;

/// An object name qualified by the server it lives on
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub server_id: String,
    pub name: String,
}

/// Orchestrates every monitored server
pub struct ServerManager {
    connector: Arc<dyn ServerConnector>,
    settings: PollSettings,
    callbacks: RwLock<ServerCallbacks>,
    instances: DashMap<String, Arc<ServerInstance>>,
    recorder: RwLock<Option<Arc<dyn HistoryRecorder>>>,
}

impl ServerManager {
    pub fn new(connector: Arc<dyn ServerConnector>, settings: PollSettings) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            connector,
            settings,
            callbacks: RwLock::new(ServerCallbacks::default()),
            instances: DashMap::new(),
            recorder: RwLock::new(None),
        })
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Replace the callbacks handed to servers added from now on
    ///
    /// Instances that are already running keep the callbacks they were
    /// created with.
    pub fn set_callbacks(&self, callbacks: ServerCallbacks) {
        *self.callbacks.write() = callbacks;
    }

    pub fn set_object_update_callback(&self, f: impl Fn(&str, Vec<Update<ObjectData>>) + Send + Sync + 'static) {
        self.callbacks.write().on_object_update = Some(Arc::new(f));
    }

    pub fn set_protocol_update_callback(
        &self,
        f: impl Fn(&str, ProtocolFamily, Vec<Update<ProtocolItem>>) + Send + Sync + 'static,
    ) {
        self.callbacks.write().on_protocol_update = Some(Arc::new(f));
    }

    pub fn set_status_change_callback(&self, f: impl Fn(ServerStatus) + Send + Sync + 'static) {
        self.callbacks.write().on_status_change = Some(Arc::new(f));
    }

    pub fn set_objects_changed_callback(&self, f: impl Fn(&str, Vec<String>) + Send + Sync + 'static) {
        self.callbacks.write().on_objects_changed = Some(Arc::new(f));
    }

    /// Create, register and start an instance for `config`
    pub fn add_server(&self, config: ServerConfig) -> Result<Arc<ServerInstance>> {
        if config.id.is_empty() {
            return Err(ManagerError::Configuration("Server ID must not be empty".to_string()));
        }
        if config.url.trim().is_empty() {
            return Err(ManagerError::EmptyUrl(config.id));
        }

        let instance = match self.instances.entry(config.id.clone()) {
            Entry::Occupied(_) => return Err(ManagerError::DuplicateServer(config.id)),
            Entry::Vacant(slot) => {
                let client = self.connector.connect(&config)?;
                let callbacks = self.callbacks.read().clone();
                let instance = Arc::new(ServerInstance::new(config, client, self.settings.clone(), callbacks)?);

                if let Some(recorder) = self.recorder.read().clone() {
                    instance.install_recorder(recorder);
                }

                slot.insert(instance.clone());
                instance
            }
        };

        instance.start();
        tracing::info!("Added server {} ({} total)", instance.id(), self.instances.len());
        Ok(instance)
    }

    /// Stop and forget a server
    pub async fn remove_server(&self, id: &str) -> Result<()> {
        let (_, instance) = self
            .instances
            .remove(id)
            .ok_or_else(|| ManagerError::ServerNotFound(id.to_string()))?;

        instance.stop().await;
        tracing::info!("Removed server {}", id);
        Ok(())
    }

    pub fn server(&self, id: &str) -> Option<Arc<ServerInstance>> {
        self.instances.get(id).map(|entry| entry.value().clone())
    }

    /// Server IDs in sorted order
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Status of every server, sorted by ID
    pub fn statuses(&self) -> Vec<ServerStatus> {
        let mut statuses: Vec<ServerStatus> = self.instances.iter().map(|entry| entry.value().status()).collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instances sorted by ID, cloned out so no map guard is held across awaits
    fn snapshot(&self) -> Vec<Arc<ServerInstance>> {
        let mut instances: Vec<Arc<ServerInstance>> = self.instances.iter().map(|e| e.value().clone()).collect();
        instances.sort_by(|a, b| a.id().cmp(b.id()));
        instances
    }

    /// Object lists of every server, keyed by server ID
    ///
    /// Servers that fail are left out. Only when every server fails is an
    /// error returned, the one from the first server in ID order.
    pub async fn objects_by_server(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let instances = self.snapshot();
        if instances.is_empty() {
            return Ok(BTreeMap::new());
        }

        let results = join_all(instances.iter().map(|instance| async move {
            (instance.id().to_string(), instance.get_objects().await)
        }))
        .await;

        let mut grouped = BTreeMap::new();
        let mut first_error: Option<ClientError> = None;

        for (id, result) in results {
            match result {
                Ok(objects) => {
                    grouped.insert(id, objects);
                }
                Err(e) => {
                    tracing::warn!("Listing objects of {} failed: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if grouped.is_empty() => Err(ManagerError::Client(e)),
            _ => Ok(grouped),
        }
    }

    /// Every object on every reachable server, same failure rules as
    /// [`objects_by_server`](Self::objects_by_server)
    pub async fn all_objects(&self) -> Result<Vec<ObjectRef>> {
        let grouped = self.objects_by_server().await?;

        Ok(grouped
            .into_iter()
            .flat_map(|(server_id, names)| {
                names.into_iter().map(move |name| ObjectRef {
                    server_id: server_id.clone(),
                    name,
                })
            })
            .collect())
    }

    /// Send protocol changes of every server, current and future, to `recorder`
    pub async fn attach_recorder(&self, recorder: Arc<dyn HistoryRecorder>) {
        *self.recorder.write() = Some(recorder.clone());

        let instances = self.snapshot();
        join_all(instances.iter().map(|instance| instance.attach_recorder(recorder.clone()))).await;
        tracing::info!("History recorder attached to {} server(s)", instances.len());
    }

    pub fn detach_recorder(&self) {
        *self.recorder.write() = None;
        for instance in self.snapshot() {
            instance.detach_recorder();
        }
        tracing::info!("History recorder detached");
    }

    /// Re-emit every subscription on every server; returns the number of updates
    pub async fn force_emit_all(&self) -> usize {
        let instances = self.snapshot();
        join_all(instances.iter().map(|instance| instance.force_emit_all()))
            .await
            .into_iter()
            .sum()
    }

    /// Stop every server concurrently, waiting at most `deadline`
    ///
    /// All instances are removed from the registry. Instances still stopping
    /// when the deadline passes keep stopping in the background.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        let ids = self.server_ids();
        let instances: Vec<Arc<ServerInstance>> = ids
            .iter()
            .filter_map(|id| self.instances.remove(id).map(|(_, instance)| instance))
            .collect();

        if instances.is_empty() {
            return Ok(());
        }

        tracing::info!("Shutting down {} server(s)", instances.len());

        let mut handles: Vec<_> = instances
            .into_iter()
            .map(|instance| tokio::spawn(async move { instance.stop().await }))
            .collect();

        match tokio::time::timeout(deadline, join_all(handles.iter_mut())).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::error!("Server stop task failed: {}", e);
                    }
                }
                Ok(())
            }
            Err(_) => {
                let pending = handles.iter().filter(|h| !h.is_finished()).count();
                tracing::warn!("Shutdown deadline of {:?} passed with {} server(s) still stopping", deadline, pending);
                Err(ManagerError::ShutdownTimeout { pending })
            }
        }
    }
}

impl std::fmt::Debug for ServerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerManager")
            .field("servers", &self.server_ids())
            .field("settings", &self.settings)
            .finish()
    }
}
