use hostname::get as get_hostname;
use std::env;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::coordinator::{DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL};
use crate::executor::DEFAULT_MAX_WORKERS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub http_addr: String,
    pub poll_interval_secs: u64,
    pub max_workers: usize,
    pub instance_name: String,
    pub sim_blinds: usize,
    pub sim_latency_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_workers: DEFAULT_MAX_WORKERS,
            instance_name: default_instance_name(),
            sim_blinds: 3,
            sim_latency_ms: 50,
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Overlay values from `lookup` on the defaults. Empty or unparseable
    /// values are ignored; the poll interval and worker count are capped.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = HubConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("BLINDHUB_HTTP_ADDR") {
            cfg.http_addr = v;
        }
        if let Some(s) = get("BLINDHUB_POLL_INTERVAL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if s > 0 {
                cfg.poll_interval_secs = s.min(MAX_POLL_INTERVAL.as_secs());
            }
        }
        if let Some(n) = get("BLINDHUB_MAX_WORKERS").and_then(|v| v.parse::<usize>().ok()) {
            if n > 0 {
                cfg.max_workers = n.min(Semaphore::MAX_PERMITS);
            }
        }
        if let Some(v) = get("BLINDHUB_INSTANCE_NAME") {
            cfg.instance_name = v;
        }
        if let Some(n) = get("BLINDHUB_SIM_BLINDS").and_then(|v| v.parse::<usize>().ok()) {
            cfg.sim_blinds = n;
        }
        if let Some(ms) = get("BLINDHUB_SIM_LATENCY_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.sim_latency_ms = ms;
        }

        cfg
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn sim_latency(&self) -> Duration {
        Duration::from_millis(self.sim_latency_ms)
    }
}

fn default_instance_name() -> String {
    let host = get_hostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("blindhub-{}", host)
}
