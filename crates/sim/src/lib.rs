//! In-process stand-in for the hub SDK.
//!
//! Blinds move towards their target a fixed step per poll, every call sleeps
//! for the configured latency, and the hub can be taken offline to exercise
//! refresh failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use blindhub_core::{Device, DeviceError, DeviceSource};
use tracing::debug;

/// Level change per poll while a blind is moving.
pub const STEP_PER_POLL: i32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Motion {
    level: i32,
    target: Option<i32>,
}

pub struct SimulatedDevice {
    ain: String,
    name: String,
    product_name: &'static str,
    blind: bool,
    present: AtomicBool,
    latency: Duration,
    motion: Mutex<Motion>,
}

impl SimulatedDevice {
    pub fn blind(ain: impl Into<String>, name: impl Into<String>, level: i32, latency: Duration) -> Self {
        Self {
            ain: ain.into(),
            name: name.into(),
            product_name: "FRITZ!DECT 440",
            blind: true,
            present: AtomicBool::new(true),
            latency,
            motion: Mutex::new(Motion { level, target: None }),
        }
    }

    pub fn thermostat(ain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ain: ain.into(),
            name: name.into(),
            product_name: "FRITZ!DECT 301",
            blind: false,
            present: AtomicBool::new(true),
            latency: Duration::ZERO,
            motion: Mutex::new(Motion { level: 0, target: None }),
        }
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::Relaxed);
    }

    pub fn target(&self) -> Option<i32> {
        self.motion().target
    }

    fn motion(&self) -> MutexGuard<'_, Motion> {
        self.motion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn round_trip(&self) -> Result<(), DeviceError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if !self.present.load(Ordering::Relaxed) {
            return Err(DeviceError::Connection(format!("{} not reachable", self.ain)));
        }
        if !self.blind {
            return Err(DeviceError::Rejected(format!("{} has no blind", self.ain)));
        }
        Ok(())
    }

    fn move_to(&self, target: i32) -> Result<(), DeviceError> {
        self.round_trip()?;
        self.motion().target = Some(target);
        debug!(ain = %self.ain, target, "blind moving");
        Ok(())
    }

    /// Advance one poll's worth of movement.
    fn advance(&self) {
        let mut m = self.motion();
        if let Some(target) = m.target {
            let delta = target
                .saturating_sub(m.level)
                .clamp(-STEP_PER_POLL, STEP_PER_POLL);
            m.level = m.level.saturating_add(delta);
            if m.level == target {
                m.target = None;
            }
        }
    }
}

impl Device for SimulatedDevice {
    fn ain(&self) -> &str {
        &self.ain
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn manufacturer(&self) -> &str {
        "AVM"
    }

    fn product_name(&self) -> &str {
        self.product_name
    }

    fn fw_version(&self) -> &str {
        "05.10"
    }

    fn present(&self) -> bool {
        self.present.load(Ordering::Relaxed)
    }

    fn has_blind(&self) -> bool {
        self.blind
    }

    fn get_level_percentage(&self) -> i32 {
        self.motion().level
    }

    fn set_blind_open(&self) -> Result<(), DeviceError> {
        self.move_to(0)
    }

    fn set_blind_close(&self) -> Result<(), DeviceError> {
        self.move_to(100)
    }

    fn set_blind_stop(&self) -> Result<(), DeviceError> {
        self.round_trip()?;
        self.motion().target = None;
        Ok(())
    }

    fn set_level_percentage(&self, level: i32) -> Result<(), DeviceError> {
        if !(0..=100).contains(&level) {
            return Err(DeviceError::Rejected(format!("level {} out of range", level)));
        }
        self.move_to(level)
    }
}

/// A hub with a fixed set of simulated devices.
pub struct SimulatedHub {
    devices: Vec<Arc<SimulatedDevice>>,
    reachable: AtomicBool,
    latency: Duration,
}

impl SimulatedHub {
    /// `blinds` fully open blinds plus one thermostat.
    pub fn new(blinds: usize, latency: Duration) -> Self {
        let mut devices: Vec<Arc<SimulatedDevice>> = (1..=blinds)
            .map(|i| {
                Arc::new(SimulatedDevice::blind(
                    format!("14276 {:07}", i),
                    format!("Blind {}", i),
                    0,
                    latency,
                ))
            })
            .collect();
        devices.push(Arc::new(SimulatedDevice::thermostat("13979 0000001", "Thermostat")));
        Self {
            devices,
            reachable: AtomicBool::new(true),
            latency,
        }
    }

    pub fn device(&self, ain: &str) -> Option<Arc<SimulatedDevice>> {
        self.devices.iter().find(|d| d.ain == ain).cloned()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }
}

impl DeviceSource for SimulatedHub {
    fn fetch_devices(&self) -> Result<Vec<Arc<dyn Device>>, DeviceError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if !self.reachable.load(Ordering::Relaxed) {
            return Err(DeviceError::Connection("hub did not answer".to_string()));
        }
        Ok(self
            .devices
            .iter()
            .map(|d| {
                d.advance();
                d.clone() as Arc<dyn Device>
            })
            .collect())
    }
}
