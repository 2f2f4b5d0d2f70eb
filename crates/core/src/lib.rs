//! Blind covers for a smart-home hub.
//!
//! A [`Coordinator`] polls the hub SDK for devices, [`CoverPlatform`] turns
//! every device with a blind into a [`BlindCover`], and each cover maps the
//! device's closing level to a host position and runs open/close/stop/
//! set-position on the [`Executor`]'s blocking pool.

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod cover;
pub mod device;
pub mod entity;
pub mod error;
pub mod executor;
pub mod platform;

pub use commands::CoverCommand;
pub use config::HubConfig;
pub use coordinator::{Coordinator, CoordinatorEvent};
pub use cover::{BlindCover, CoverFeatures, CoverSnapshot, CoverState, DeviceClass};
pub use device::{Device, DeviceInfo, DeviceSource};
pub use entity::{DeviceEntity, Entity};
pub use error::{CommandError, DeviceError};
pub use executor::Executor;
pub use platform::CoverPlatform;
