//! Blind covers: the position mapping and the command dispatch onto the
//! device SDK.
//!
//! Devices report a closing level (0 open, 100 closed). The host works with
//! positions (0 closed, 100 open). Both directions use the same inversion
//! and neither clamps: whatever the SDK reports, or the host asks for, is
//! passed through.

use std::ops::BitOr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::commands::CoverCommand;
use crate::coordinator::Coordinator;
use crate::device::{Device, DeviceInfo};
use crate::entity::{DeviceEntity, Entity};
use crate::error::{CommandError, DeviceError};
use crate::executor::Executor;

pub const FULLY_CLOSED_LEVEL: i32 = 100;

/// Host-facing view of a device level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverState {
    pub is_closed: bool,
    pub current_position: i32,
}

impl CoverState {
    pub fn from_level(level: i32) -> Self {
        Self {
            is_closed: level == FULLY_CLOSED_LEVEL,
            current_position: FULLY_CLOSED_LEVEL.saturating_sub(level),
        }
    }
}

/// Device level to request for a host position.
pub fn level_for_position(position: i32) -> i32 {
    FULLY_CLOSED_LEVEL.saturating_sub(position)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CoverFeatures(u32);

impl CoverFeatures {
    pub const OPEN: Self = Self(1);
    pub const CLOSE: Self = Self(2);
    pub const SET_POSITION: Self = Self(4);
    pub const STOP: Self = Self(8);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CoverFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub const BLIND_FEATURES: CoverFeatures = CoverFeatures(
    CoverFeatures::OPEN.0
        | CoverFeatures::CLOSE.0
        | CoverFeatures::SET_POSITION.0
        | CoverFeatures::STOP.0,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Blind,
}

/// Everything the host shows for one cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverSnapshot {
    pub unique_id: String,
    pub name: Option<String>,
    pub available: bool,
    pub device_class: DeviceClass,
    pub supported_features: CoverFeatures,
    pub is_closed: Option<bool>,
    pub current_position: Option<i32>,
    pub device_info: Option<DeviceInfo>,
}

/// Cover entity for one hub blind.
///
/// Holds no state of its own; every getter reads the device handle from the
/// coordinator's latest poll, so commands show up only after the next
/// refresh.
#[derive(Clone)]
pub struct BlindCover {
    base: DeviceEntity,
    executor: Executor,
}

impl BlindCover {
    pub fn new(coordinator: Arc<Coordinator>, ain: impl Into<String>) -> Self {
        let executor = coordinator.executor().clone();
        Self {
            base: DeviceEntity::new(coordinator, ain),
            executor,
        }
    }

    pub fn ain(&self) -> &str {
        self.base.ain()
    }

    pub fn supported_features(&self) -> CoverFeatures {
        BLIND_FEATURES
    }

    pub fn device_class(&self) -> DeviceClass {
        DeviceClass::Blind
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.base.device_info()
    }

    pub fn state(&self) -> Option<CoverState> {
        self.base
            .device()
            .map(|d| CoverState::from_level(d.get_level_percentage()))
    }

    pub fn is_closed(&self) -> Option<bool> {
        self.state().map(|s| s.is_closed)
    }

    pub fn current_cover_position(&self) -> Option<i32> {
        self.state().map(|s| s.current_position)
    }

    pub fn snapshot(&self) -> CoverSnapshot {
        let state = self.state();
        CoverSnapshot {
            unique_id: self.ain().to_string(),
            name: self.name(),
            available: self.available(),
            device_class: self.device_class(),
            supported_features: self.supported_features(),
            is_closed: state.map(|s| s.is_closed),
            current_position: state.map(|s| s.current_position),
            device_info: self.device_info(),
        }
    }

    pub async fn open_cover(&self) -> Result<(), CommandError> {
        self.dispatch("open", |d| d.set_blind_open()).await
    }

    pub async fn close_cover(&self) -> Result<(), CommandError> {
        self.dispatch("close", |d| d.set_blind_close()).await
    }

    pub async fn stop_cover(&self) -> Result<(), CommandError> {
        self.dispatch("stop", |d| d.set_blind_stop()).await
    }

    pub async fn set_cover_position(&self, position: i32) -> Result<(), CommandError> {
        let level = level_for_position(position);
        if !(0..=FULLY_CLOSED_LEVEL).contains(&position) {
            warn!(ain = %self.ain(), position, "position outside 0..=100, forwarding as-is");
        }
        self.dispatch("set_position", move |d| d.set_level_percentage(level))
            .await
    }

    pub async fn execute(&self, command: CoverCommand) -> Result<(), CommandError> {
        match command {
            CoverCommand::Open => self.open_cover().await,
            CoverCommand::Close => self.close_cover().await,
            CoverCommand::Stop => self.stop_cover().await,
            CoverCommand::SetPosition(position) => self.set_cover_position(position).await,
        }
    }

    async fn dispatch<F>(&self, command: &'static str, call: F) -> Result<(), CommandError>
    where
        F: FnOnce(&dyn Device) -> Result<(), DeviceError> + Send + 'static,
    {
        let device = self.base.require_device()?;
        debug!(ain = %self.ain(), command, "dispatching cover command");
        self.executor.run(move || call(device.as_ref())).await??;
        Ok(())
    }
}

impl Entity for BlindCover {
    fn unique_id(&self) -> &str {
        self.base.ain()
    }

    fn name(&self) -> Option<String> {
        self.base.device().map(|d| d.name().to_string())
    }

    fn platform(&self) -> &'static str {
        "cover"
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn state_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}
