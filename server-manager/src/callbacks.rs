//! Event callbacks fanned out to every server instance

use std::fmt;
use std::sync::Arc;

use poll_engine::Update;

use crate::client::{ObjectData, ProtocolFamily, ProtocolItem};
use crate::status::ServerStatus;

pub type ObjectUpdateCallback = Arc<dyn Fn(&str, Vec<Update<ObjectData>>) + Send + Sync>;
pub type ProtocolUpdateCallback = Arc<dyn Fn(&str, ProtocolFamily, Vec<Update<ProtocolItem>>) + Send + Sync>;
pub type StatusChangeCallback = Arc<dyn Fn(ServerStatus) + Send + Sync>;
pub type ObjectsChangedCallback = Arc<dyn Fn(&str, Vec<String>) + Send + Sync>;

/// The set of callbacks an instance reports through
///
/// Instances clone this at construction time, so replacing a callback later
/// only affects instances created afterwards.
#[derive(Clone, Default)]
pub struct ServerCallbacks {
    pub on_object_update: Option<ObjectUpdateCallback>,
    pub on_protocol_update: Option<ProtocolUpdateCallback>,
    pub on_status_change: Option<StatusChangeCallback>,
    pub on_objects_changed: Option<ObjectsChangedCallback>,
}

impl ServerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object_update(
        mut self,
        f: impl Fn(&str, Vec<Update<ObjectData>>) + Send + Sync + 'static,
    ) -> Self {
        self.on_object_update = Some(Arc::new(f));
        self
    }

    pub fn with_protocol_update(
        mut self,
        f: impl Fn(&str, ProtocolFamily, Vec<Update<ProtocolItem>>) + Send + Sync + 'static,
    ) -> Self {
        self.on_protocol_update = Some(Arc::new(f));
        self
    }

    pub fn with_status_change(mut self, f: impl Fn(ServerStatus) + Send + Sync + 'static) -> Self {
        self.on_status_change = Some(Arc::new(f));
        self
    }

    pub fn with_objects_changed(mut self, f: impl Fn(&str, Vec<String>) + Send + Sync + 'static) -> Self {
        self.on_objects_changed = Some(Arc::new(f));
        self
    }

    pub(crate) fn status_changed(&self, status: ServerStatus) {
        if let Some(cb) = &self.on_status_change {
            cb(status);
        }
    }

    pub(crate) fn objects_changed(&self, server_id: &str, objects: Vec<String>) {
        if let Some(cb) = &self.on_objects_changed {
            cb(server_id, objects);
        }
    }
}

impl fmt::Debug for ServerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCallbacks")
            .field("on_object_update", &self.on_object_update.is_some())
            .field("on_protocol_update", &self.on_protocol_update.is_some())
            .field("on_status_change", &self.on_status_change.is_some())
            .field("on_objects_changed", &self.on_objects_changed.is_some())
            .finish()
    }
}
