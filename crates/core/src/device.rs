use std::sync::Arc;

use serde::Serialize;

use crate::error::DeviceError;

/// A device as exposed by the hub SDK.
///
/// Every call may block on hub I/O, so async code must go through
/// [`crate::Executor`] rather than call these directly.
pub trait Device: Send + Sync {
    /// Actor identification number, the hub's key for this device.
    fn ain(&self) -> &str;
    fn name(&self) -> &str;
    fn manufacturer(&self) -> &str;
    fn product_name(&self) -> &str;
    fn fw_version(&self) -> &str;

    /// Whether the hub currently reaches the device.
    fn present(&self) -> bool;
    fn has_blind(&self) -> bool;

    /// Closing level: 0 is fully open, 100 fully closed.
    fn get_level_percentage(&self) -> i32;

    fn set_blind_open(&self) -> Result<(), DeviceError>;
    fn set_blind_close(&self) -> Result<(), DeviceError>;
    fn set_blind_stop(&self) -> Result<(), DeviceError>;
    fn set_level_percentage(&self, level: i32) -> Result<(), DeviceError>;
}

/// The hub session the coordinator polls for device snapshots.
pub trait DeviceSource: Send + Sync {
    fn fetch_devices(&self) -> Result<Vec<Arc<dyn Device>>, DeviceError>;
}

/// Static description of a device, attached to every entity it backs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub ain: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

impl DeviceInfo {
    pub fn of(device: &dyn Device) -> Self {
        Self {
            ain: device.ain().to_string(),
            name: device.name().to_string(),
            manufacturer: device.manufacturer().to_string(),
            model: device.product_name().to_string(),
            sw_version: device.fw_version().to_string(),
        }
    }
}
