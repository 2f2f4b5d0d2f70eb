use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::device::{Device, DeviceInfo};
use crate::error::CommandError;

/// What every platform entity exposes to the host.
pub trait Entity: Send + Sync {
    fn unique_id(&self) -> &str;

    /// Display name; `None` once the backing device has left the registry.
    fn name(&self) -> Option<String>;

    /// Platform type of this entity, e.g. "cover".
    fn platform(&self) -> &'static str;

    fn available(&self) -> bool;

    /// Current state for the host's API and update stream.
    fn state_json(&self) -> serde_json::Value;
}

/// Identity and availability shared by every entity backed by one hub
/// device. The device handle is looked up on each access so entities always
/// see the coordinator's latest poll.
#[derive(Clone)]
pub struct DeviceEntity {
    ain: String,
    coordinator: Arc<Coordinator>,
}

impl DeviceEntity {
    pub fn new(coordinator: Arc<Coordinator>, ain: impl Into<String>) -> Self {
        Self {
            ain: ain.into(),
            coordinator,
        }
    }

    pub fn ain(&self) -> &str {
        &self.ain
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn device(&self) -> Option<Arc<dyn Device>> {
        self.coordinator.device(&self.ain)
    }

    pub fn require_device(&self) -> Result<Arc<dyn Device>, CommandError> {
        self.device()
            .ok_or_else(|| CommandError::NotFound(self.ain.clone()))
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
            && self.device().is_some_and(|d| d.present())
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.device().map(|d| DeviceInfo::of(d.as_ref()))
    }
}
