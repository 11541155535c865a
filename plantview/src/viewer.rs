//! Wiring of servers, control and the notification hub
//!
//! Every change detected by a server's pollers and every health transition
//! is turned into a [`HubEvent`] and broadcast. Control holder changes are
//! forwarded from the control manager's watch channel the same way.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use control_manager::ControlManager;
use notify_hub::{HubEvent, NotificationHub, Subscriber};
use server_manager::{ServerCallbacks, ServerConnector, ServerManager};

use crate::config::ViewerConfig;
use crate::error::Result;

struct Forwarder {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A running plantview core
pub struct Viewer {
    config: ViewerConfig,
    hub: Arc<NotificationHub>,
    control: ControlManager,
    servers: Arc<ServerManager>,
    forwarder: Mutex<Option<Forwarder>>,
}

impl Viewer {
    /// Build every component, wire them together and add the configured servers
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: ViewerConfig, connector: Arc<dyn ServerConnector>) -> Result<Self> {
        config.validate()?;

        let hub = Arc::new(NotificationHub::new(config.hub_capacity));
        let control = ControlManager::new(config.control.clone());
        let servers = Arc::new(ServerManager::new(connector, config.poll.clone())?);

        servers.set_callbacks(hub_callbacks(&hub));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(forward_control_status(
            control.watch(),
            Arc::clone(&hub),
            cancel.clone(),
        ));

        let viewer = Self {
            config,
            hub,
            control,
            servers,
            forwarder: Mutex::new(Some(Forwarder { cancel, handle })),
        };

        for server in &viewer.config.servers {
            viewer.servers.add_server(server.clone())?;
        }

        tracing::info!("Viewer started with {} server(s)", viewer.servers.len());
        Ok(viewer)
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn control(&self) -> &ControlManager {
        &self.control
    }

    pub fn servers(&self) -> &Arc<ServerManager> {
        &self.servers
    }

    /// Register a live session, optionally filtered to one server
    pub fn open_session(&self, server_filter: Option<String>) -> Subscriber {
        self.hub.register(server_filter)
    }

    /// End a live session
    ///
    /// If the session held control, release is deferred by the grace period
    /// so a quick reconnect keeps it.
    pub fn close_session(&self, session: &Subscriber, control_token: Option<&str>) {
        self.hub.unregister(session);
        if let Some(token) = control_token {
            self.control.release_by_sse(token);
        }
    }

    /// Stop the control forwarder and every server within the shutdown timeout
    pub async fn shutdown(&self) -> Result<()> {
        let forwarder = self.forwarder.lock().take();
        if let Some(forwarder) = forwarder {
            forwarder.cancel.cancel();
            if let Err(e) = forwarder.handle.await {
                tracing::error!("Control forwarder failed: {}", e);
            }
        }

        let result = self.servers.shutdown(self.config.shutdown_timeout).await;
        self.hub.close_all();
        result?;

        tracing::info!("Viewer stopped");
        Ok(())
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.get_mut().take() {
            forwarder.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("servers", &self.servers.server_ids())
            .field("sessions", &self.hub.subscriber_count())
            .field("control", &self.control)
            .finish()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Dropping event that failed to serialize: {}", e);
            None
        }
    }
}

/// Callbacks that turn server events into hub broadcasts
fn hub_callbacks(hub: &Arc<NotificationHub>) -> ServerCallbacks {
    let objects_hub = Arc::clone(hub);
    let protocol_hub = Arc::clone(hub);
    let status_hub = Arc::clone(hub);
    let changed_hub = Arc::clone(hub);

    ServerCallbacks::new()
        .with_object_update(move |server_id, batch| {
            for update in batch {
                objects_hub.broadcast(HubEvent::ObjectData {
                    server_id: server_id.to_string(),
                    object: update.owner,
                    data: update.item.data,
                    timestamp: update.timestamp,
                });
            }
        })
        .with_protocol_update(move |server_id, family, batch| {
            // One event per object keeps a session's view of an object consistent
            let mut by_object = BTreeMap::new();
            for update in batch {
                let Some(item) = to_json(&update.item) else {
                    continue;
                };
                by_object
                    .entry(update.owner)
                    .or_insert_with(|| (update.timestamp, Vec::new()))
                    .1
                    .push(item);
            }

            for (object, (timestamp, items)) in by_object {
                protocol_hub.broadcast(HubEvent::ProtocolData {
                    server_id: server_id.to_string(),
                    family: family.to_string(),
                    object,
                    items,
                    timestamp,
                });
            }
        })
        .with_status_change(move |status| {
            if let Some(payload) = to_json(&status) {
                status_hub.broadcast(HubEvent::ServerStatus {
                    server_id: status.id,
                    status: payload,
                });
            }
        })
        .with_objects_changed(move |server_id, objects| {
            changed_hub.broadcast(HubEvent::ObjectsChanged {
                server_id: server_id.to_string(),
                objects,
            });
        })
}

async fn forward_control_status(
    mut changes: watch::Receiver<bool>,
    hub: Arc<NotificationHub>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let has_controller = *changes.borrow_and_update();
                hub.broadcast(HubEvent::ControlStatus { has_controller });
            }
        }
    }

    tracing::debug!("Control status forwarder stopped");
}
