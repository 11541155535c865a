//! One remote server: its pollers and its health-check loop
//!
//! The connection state machine starts at `Unknown` and is moved between
//! `Connected` and `Disconnected` by the outcome of a periodic object-list
//! probe. Callbacks fire on transitions only, never on every probe.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use poll_engine::{PollConfig, PollEngine, PollStats};

use crate::callbacks::ServerCallbacks;
use crate::client::{ObjectData, ProtocolFamily, ServerClient};
use crate::config::{PollSettings, ServerConfig};
use crate::error::{ClientError, Result};
use crate::fetchers::{ObjectFetcher, ProtocolFetcher};
use crate::recorder::{HistoryRecorder, RecorderHook};
use crate::status::{ConnectionState, ServerStatus};

/// State shared between the instance and its health loop
struct Shared {
    id: String,
    client: Arc<dyn ServerClient>,
    callbacks: ServerCallbacks,
    status: RwLock<ServerStatus>,
    probe_timeout: std::time::Duration,

    /// State as last seen by a probe; transitions are detected against
    /// this rather than the status, which request-driven calls also touch.
    probed: tokio::sync::Mutex<ConnectionState>,
}

impl Shared {
    async fn probe(&self) -> ConnectionState {
        let mut probed = self.probed.lock().await;

        let result = match tokio::time::timeout(self.probe_timeout, self.client.list_objects()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.probe_timeout)),
        };

        let previous = *probed;
        match result {
            Ok(objects) => {
                let snapshot = {
                    let mut status = self.status.write();
                    status.mark_connected(Some(objects.len()));
                    status.clone()
                };
                *probed = ConnectionState::Connected;

                if previous != ConnectionState::Connected {
                    tracing::info!("Server {} connected ({} objects)", self.id, objects.len());
                    self.callbacks.status_changed(snapshot);
                    self.callbacks.objects_changed(&self.id, objects);
                }
            }
            Err(e) => {
                let snapshot = {
                    let mut status = self.status.write();
                    status.mark_disconnected(e.to_string());
                    status.clone()
                };
                *probed = ConnectionState::Disconnected;

                if previous != ConnectionState::Disconnected {
                    tracing::warn!("Server {} unreachable: {}", self.id, e);
                    self.callbacks.status_changed(snapshot);
                } else {
                    tracing::debug!("Server {} still unreachable: {}", self.id, e);
                }
            }
        }

        *probed
    }

    async fn health_loop(self: Arc<Self>, interval: std::time::Duration, cancel: CancellationToken) {
        let span = tracing::info_span!("health", server = %self.id);

        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = self.probe() => {}
                }
            }

            tracing::debug!("Health loop stopped");
        }
        .instrument(span)
        .await
    }

    fn record_success(&self, object_count: Option<usize>) {
        self.status.write().mark_connected(object_count);
    }

    fn record_failure(&self, error: &ClientError) {
        self.status.write().mark_disconnected(error.to_string());
    }
}

struct HealthTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// The three protocol pollers of an instance
struct ProtocolEngines {
    ionc: PollEngine<ProtocolFetcher>,
    modbus: PollEngine<ProtocolFetcher>,
    opcua: PollEngine<ProtocolFetcher>,
}

impl ProtocolEngines {
    fn get(&self, family: ProtocolFamily) -> &PollEngine<ProtocolFetcher> {
        match family {
            ProtocolFamily::Ionc => &self.ionc,
            ProtocolFamily::Modbus => &self.modbus,
            ProtocolFamily::OpcUa => &self.opcua,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (ProtocolFamily, &PollEngine<ProtocolFetcher>)> {
        ProtocolFamily::ALL.into_iter().map(move |family| (family, self.get(family)))
    }
}

/// A monitored server with its object poller, protocol pollers and health loop
pub struct ServerInstance {
    config: ServerConfig,
    settings: PollSettings,
    shared: Arc<Shared>,
    objects: PollEngine<ObjectFetcher>,
    protocols: ProtocolEngines,
    health: Mutex<Option<HealthTask>>,
}

impl ServerInstance {
    /// Build an idle instance; nothing runs until [`start`](Self::start)
    pub fn new(
        config: ServerConfig,
        client: Arc<dyn ServerClient>,
        settings: PollSettings,
        callbacks: ServerCallbacks,
    ) -> Result<Self> {
        settings.validate()?;

        let id = config.id.clone();
        let objects = PollEngine::new(
            PollConfig::new(format!("{id}/objects"))
                .with_interval(settings.object_interval)
                .with_batch_size(0),
            Arc::new(ObjectFetcher::new(client.clone())),
        )?;

        if let Some(cb) = callbacks.on_object_update.clone() {
            let server_id = id.clone();
            objects.set_callback(Arc::new(move |batch| cb(&server_id, batch)));
        }

        let protocol_engine = |family: ProtocolFamily| -> Result<PollEngine<ProtocolFetcher>> {
            let engine = PollEngine::new(
                PollConfig::new(format!("{id}/{family}"))
                    .with_interval(settings.protocol_interval)
                    .with_batch_size(settings.batch_size),
                Arc::new(ProtocolFetcher::new(client.clone(), family)),
            )?;

            if let Some(cb) = callbacks.on_protocol_update.clone() {
                let server_id = id.clone();
                engine.set_callback(Arc::new(move |batch| cb(&server_id, family, batch)));
            }
            Ok(engine)
        };

        let protocols = ProtocolEngines {
            ionc: protocol_engine(ProtocolFamily::Ionc)?,
            modbus: protocol_engine(ProtocolFamily::Modbus)?,
            opcua: protocol_engine(ProtocolFamily::OpcUa)?,
        };

        let status = ServerStatus::new(&config.id, &config.url, config.display_name());
        let shared = Arc::new(Shared {
            id,
            client,
            callbacks,
            status: RwLock::new(status),
            probe_timeout: settings.probe_timeout,
            probed: tokio::sync::Mutex::new(ConnectionState::Unknown),
        });

        Ok(Self {
            config,
            settings,
            shared,
            objects,
            protocols,
            health: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn status(&self) -> ServerStatus {
        self.shared.status.read().clone()
    }

    /// Start the object poller, the protocol pollers and the health loop
    pub fn start(&self) {
        let mut health = self.health.lock();
        if health.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::debug!("Server {} already running", self.config.id);
            return;
        }

        self.objects.start();
        for (_, engine) in self.protocols.iter() {
            engine.start();
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            self.shared
                .clone()
                .health_loop(self.settings.health_interval, cancel.clone()),
        );
        *health = Some(HealthTask { cancel, handle });

        tracing::info!("Started server {} ({})", self.config.id, self.config.url);
    }

    /// Cancel every loop and wait for all of them to exit
    pub async fn stop(&self) {
        let task = self.health.lock().take();

        let health = async {
            if let Some(task) = task {
                task.cancel.cancel();
                if let Err(e) = task.handle.await {
                    tracing::error!("Health loop for {} failed: {}", self.config.id, e);
                }
            }
        };

        tokio::join!(
            health,
            self.objects.stop(),
            self.protocols.ionc.stop(),
            self.protocols.modbus.stop(),
            self.protocols.opcua.stop(),
        );

        tracing::info!("Stopped server {}", self.config.id);
    }

    pub fn is_running(&self) -> bool {
        self.health
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Run one health probe now and return the resulting state
    pub async fn probe(&self) -> ConnectionState {
        self.shared.probe().await
    }

    /// List the server's objects, updating the status without notifying
    pub async fn get_objects(&self) -> std::result::Result<Vec<String>, ClientError> {
        match self.shared.client.list_objects().await {
            Ok(objects) => {
                self.shared.record_success(Some(objects.len()));
                Ok(objects)
            }
            Err(e) => {
                self.shared.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Fetch one object's data, updating the status without notifying
    pub async fn get_object_data(&self, name: &str) -> std::result::Result<ObjectData, ClientError> {
        match self.shared.client.object_data(name).await {
            Ok(data) => {
                self.shared.record_success(None);
                Ok(data)
            }
            Err(e @ ClientError::NotFound(_)) => Err(e),
            Err(e) => {
                self.shared.record_failure(&e);
                Err(e)
            }
        }
    }

    pub fn subscribe_object(&self, name: &str) -> bool {
        self.objects.subscribe(name, [name.to_string()]) > 0
    }

    pub fn unsubscribe_object(&self, name: &str) -> bool {
        self.objects.unsubscribe_all(name)
    }

    pub fn subscribe_items(&self, family: ProtocolFamily, object: &str, ids: impl IntoIterator<Item = u64>) -> usize {
        self.protocols.get(family).subscribe(object, ids)
    }

    pub fn unsubscribe_items(
        &self,
        family: ProtocolFamily,
        object: &str,
        ids: impl IntoIterator<Item = u64>,
    ) -> usize {
        self.protocols.get(family).unsubscribe(object, ids)
    }

    pub fn unsubscribe_all_items(&self, family: ProtocolFamily, object: &str) -> bool {
        self.protocols.get(family).unsubscribe_all(object)
    }

    pub fn subscribed_objects(&self) -> Vec<String> {
        self.objects.subscribed_owners()
    }

    pub fn subscribed_items(&self, family: ProtocolFamily, object: &str) -> Vec<u64> {
        self.protocols.get(family).subscriptions(object)
    }

    /// Re-emit every subscribed object and item; returns the number of updates
    pub async fn force_emit_all(&self) -> usize {
        let (objects, ionc, modbus, opcua) = tokio::join!(
            self.objects.force_emit_all(),
            self.protocols.ionc.force_emit_all(),
            self.protocols.modbus.force_emit_all(),
            self.protocols.opcua.force_emit_all(),
        );
        objects.len() + ionc.len() + modbus.len() + opcua.len()
    }

    /// Route protocol changes to `recorder` and seed it with a full snapshot
    pub async fn attach_recorder(&self, recorder: Arc<dyn HistoryRecorder>) {
        self.install_recorder(recorder);

        let (ionc, modbus, opcua) = tokio::join!(
            self.protocols.ionc.force_emit_all(),
            self.protocols.modbus.force_emit_all(),
            self.protocols.opcua.force_emit_all(),
        );
        tracing::debug!(
            "Seeded recorder for {} with {} item(s)",
            self.config.id,
            ionc.len() + modbus.len() + opcua.len()
        );
    }

    pub(crate) fn install_recorder(&self, recorder: Arc<dyn HistoryRecorder>) {
        for (family, engine) in self.protocols.iter() {
            engine.set_persistence_hook(Arc::new(RecorderHook::new(&self.config.id, family, recorder.clone())));
        }
    }

    pub fn detach_recorder(&self) {
        for (_, engine) in self.protocols.iter() {
            engine.clear_persistence_hook();
        }
    }

    pub fn has_recorder(&self) -> bool {
        self.protocols.iter().all(|(_, engine)| engine.has_persistence_hook())
    }

    pub fn object_stats(&self) -> PollStats {
        self.objects.stats()
    }

    pub fn protocol_stats(&self, family: ProtocolFamily) -> PollStats {
        self.protocols.get(family).stats()
    }
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        if let Some(task) = self.health.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("id", &self.config.id)
            .field("url", &self.config.url)
            .field("running", &self.is_running())
            .finish()
    }
}
