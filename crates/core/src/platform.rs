use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::coordinator::Coordinator;
use crate::cover::BlindCover;
use crate::error::CommandError;

/// The cover platform of one configured hub: its coordinator, the blind
/// entities created at setup and the polling task.
pub struct CoverPlatform {
    coordinator: Arc<Coordinator>,
    covers: BTreeMap<String, BlindCover>,
    polling: Option<JoinHandle<()>>,
}

impl CoverPlatform {
    /// Refresh once, then create one cover per device that has a blind.
    pub async fn setup(coordinator: Arc<Coordinator>) -> Result<Self, CommandError> {
        coordinator.refresh().await?;

        let covers: BTreeMap<_, _> = coordinator
            .devices()
            .into_iter()
            .filter(|d| d.has_blind())
            .map(|d| {
                let ain = d.ain().to_string();
                (ain.clone(), BlindCover::new(coordinator.clone(), ain))
            })
            .collect();

        info!(covers = covers.len(), "cover platform set up");
        Ok(Self {
            coordinator,
            covers,
            polling: None,
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn cover(&self, ain: &str) -> Option<&BlindCover> {
        self.covers.get(ain)
    }

    pub fn covers(&self) -> impl Iterator<Item = &BlindCover> {
        self.covers.values()
    }

    pub fn len(&self) -> usize {
        self.covers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covers.is_empty()
    }

    /// Start polling the hub. Restarting replaces the previous task.
    pub fn start_polling(&mut self, interval: Duration) {
        if let Some(old) = self.polling.replace(self.coordinator.spawn_polling(interval)) {
            old.abort();
        }
        info!(interval_secs = interval.as_secs(), "coordinator polling started");
    }

    pub fn is_polling(&self) -> bool {
        self.polling.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop polling and drop every entity.
    pub fn unload(&mut self) {
        if let Some(handle) = self.polling.take() {
            handle.abort();
        }
        let dropped = self.covers.len();
        self.covers.clear();
        info!(covers = dropped, "cover platform unloaded");
    }
}

impl Drop for CoverPlatform {
    fn drop(&mut self) {
        if let Some(handle) = self.polling.take() {
            handle.abort();
        }
    }
}
