use std::sync::Arc;

use blindhub_core::{
    BlindCover, CommandError, Coordinator, CoordinatorEvent, CoverCommand, CoverPlatform,
    CoverSnapshot,
};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use crate::Metrics;

/// Host-side access to the cover platform: lookups, command execution with
/// logging and metrics, and unload on shutdown.
#[derive(Clone)]
pub struct CoverService {
    platform: Arc<RwLock<CoverPlatform>>,
    coordinator: Arc<Coordinator>,
    metrics: Arc<Metrics>,
}

impl CoverService {
    pub fn new(platform: CoverPlatform, metrics: Arc<Metrics>) -> Self {
        let coordinator = platform.coordinator().clone();
        Self {
            platform: Arc::new(RwLock::new(platform)),
            coordinator,
            metrics,
        }
    }

    pub fn hub_reachable(&self) -> bool {
        self.coordinator.last_update_success()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.coordinator.last_refresh()
    }

    pub fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.coordinator.events()
    }

    pub async fn list(&self) -> Vec<CoverSnapshot> {
        self.platform
            .read()
            .await
            .covers()
            .map(BlindCover::snapshot)
            .collect()
    }

    pub async fn get(&self, ain: &str) -> Option<CoverSnapshot> {
        self.platform.read().await.cover(ain).map(BlindCover::snapshot)
    }

    /// Run `command` on the cover with `ain`. Errors come back exactly as the
    /// entity returned them; this layer only logs and counts.
    pub async fn execute(&self, ain: &str, command: CoverCommand) -> Result<(), CommandError> {
        // clone out so the lock is not held while the SDK call runs
        let cover = self
            .platform
            .read()
            .await
            .cover(ain)
            .cloned()
            .ok_or_else(|| CommandError::NotFound(ain.to_string()))?;

        self.metrics
            .commands_total
            .with_label_values(&[command.name()])
            .inc();
        let result = cover.execute(command).await;
        if let Err(err) = &result {
            self.metrics
                .command_failures_total
                .with_label_values(&[command.name()])
                .inc();
            tracing::warn!(%ain, command = command.name(), error = %err, "cover command failed");
        } else {
            tracing::info!(%ain, command = ?command, "cover command sent");
        }
        result
    }

    pub async fn refresh(&self) -> Result<usize, CommandError> {
        self.coordinator.refresh().await
    }

    pub async fn unload(&self) {
        self.platform.write().await.unload();
        self.metrics.covers.set(0);
    }
}
