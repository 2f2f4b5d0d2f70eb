use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::{Device, DeviceSource};
use crate::error::CommandError;
use crate::executor::Executor;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Longest interval `spawn_polling` accepts; longer ones are shortened to it.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Shortest interval `spawn_polling` accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    Refreshed { devices: usize },
    RefreshFailed { error: String },
}

/// Polls the hub and keeps the latest device handles keyed by ain.
///
/// A failed refresh keeps the previous registry and flips
/// `last_update_success` until the next good poll.
pub struct Coordinator {
    source: Arc<dyn DeviceSource>,
    executor: Executor,
    data: RwLock<HashMap<String, Arc<dyn Device>>>,
    last_update_success: AtomicBool,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
    events_tx: broadcast::Sender<CoordinatorEvent>,
}

impl Coordinator {
    pub fn new(source: Arc<dyn DeviceSource>, executor: Executor) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            source,
            executor,
            data: RwLock::new(HashMap::new()),
            last_update_success: AtomicBool::new(false),
            last_refresh: RwLock::new(None),
            events_tx,
        })
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::Relaxed)
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events_tx.subscribe()
    }

    pub fn device(&self, ain: &str) -> Option<Arc<dyn Device>> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ain)
            .cloned()
    }

    /// All known devices, sorted by ain.
    pub fn devices(&self) -> Vec<Arc<dyn Device>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<_> = data.values().cloned().collect();
        list.sort_by(|a, b| a.ain().cmp(b.ain()));
        list
    }

    pub async fn refresh(&self) -> Result<usize, CommandError> {
        let source = self.source.clone();
        let fetched = self.executor.run(move || source.fetch_devices()).await;

        let devices = match fetched {
            Ok(Ok(devices)) => devices,
            Ok(Err(err)) => return Err(self.refresh_failed(err.into())),
            Err(err) => return Err(self.refresh_failed(err)),
        };

        let count = devices.len();
        {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            data.clear();
            for device in devices {
                data.insert(device.ain().to_string(), device);
            }
        }
        *self
            .last_refresh
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        if !self.last_update_success.swap(true, Ordering::Relaxed) {
            info!(devices = count, "hub reachable, device registry refreshed");
        } else {
            debug!(devices = count, "device registry refreshed");
        }
        let _ = self.events_tx.send(CoordinatorEvent::Refreshed { devices: count });
        Ok(count)
    }

    fn refresh_failed(&self, err: CommandError) -> CommandError {
        if self.last_update_success.swap(false, Ordering::Relaxed) {
            warn!(error = %err, "hub refresh failed; keeping previous devices");
        } else {
            warn!(error = %err, "hub refresh still failing");
        }
        let _ = self.events_tx.send(CoordinatorEvent::RefreshFailed {
            error: err.to_string(),
        });
        err
    }

    /// Refresh on every tick of `interval` until the handle is aborted. The
    /// first tick fires one full interval from now. `interval` is clamped to
    /// `MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL`.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let clamped = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        if clamped != interval {
            warn!(
                requested_secs = interval.as_secs(),
                interval_secs = clamped.as_secs(),
                "poll interval out of range, clamped"
            );
        }
        let interval = clamped;
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                // failures are already logged and broadcast
                let _ = coordinator.refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use std::sync::Mutex;

    struct Fixed {
        ain: String,
    }

    impl Device for Fixed {
        fn ain(&self) -> &str {
            &self.ain
        }
        fn name(&self) -> &str {
            "fixed"
        }
        fn manufacturer(&self) -> &str {
            "AVM"
        }
        fn product_name(&self) -> &str {
            "test"
        }
        fn fw_version(&self) -> &str {
            "1.0"
        }
        fn present(&self) -> bool {
            true
        }
        fn has_blind(&self) -> bool {
            true
        }
        fn get_level_percentage(&self) -> i32 {
            0
        }
        fn set_blind_open(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn set_blind_close(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn set_blind_stop(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn set_level_percentage(&self, _level: i32) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    /// Replays a script of fetch results, repeating the last one.
    struct Scripted {
        script: Mutex<Vec<Result<Vec<&'static str>, DeviceError>>>,
    }

    impl DeviceSource for Scripted {
        fn fetch_devices(&self) -> Result<Vec<Arc<dyn Device>>, DeviceError> {
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            next.map(|ains| {
                ains.into_iter()
                    .map(|a| Arc::new(Fixed { ain: a.to_string() }) as Arc<dyn Device>)
                    .collect()
            })
        }
    }

    fn coordinator(script: Vec<Result<Vec<&'static str>, DeviceError>>) -> Arc<Coordinator> {
        let source = Arc::new(Scripted {
            script: Mutex::new(script),
        });
        Coordinator::new(source, Executor::new(2))
    }

    #[tokio::test]
    async fn refresh_populates_registry() {
        let c = coordinator(vec![Ok(vec!["b", "a"])]);
        assert!(!c.last_update_success());
        assert_eq!(c.refresh().await.unwrap(), 2);
        assert!(c.last_update_success());
        assert!(c.last_refresh().is_some());
        let ains: Vec<String> = c.devices().iter().map(|d| d.ain().to_string()).collect();
        assert_eq!(ains, vec!["a", "b"]);
        assert!(c.device("a").is_some());
        assert!(c.device("zzz").is_none());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_devices() {
        let c = coordinator(vec![
            Ok(vec!["a"]),
            Err(DeviceError::Connection("timeout".into())),
        ]);
        let mut events = c.events();
        c.refresh().await.unwrap();
        let err = c.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Device(DeviceError::Connection(ref m)) if m == "timeout"
        ));
        assert!(!c.last_update_success());
        assert!(c.device("a").is_some());

        assert_eq!(events.recv().await.unwrap(), CoordinatorEvent::Refreshed { devices: 1 });
        assert!(matches!(
            events.recv().await.unwrap(),
            CoordinatorEvent::RefreshFailed { .. }
        ));
    }

    #[derive(Clone, Default)]
    struct LogBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn every_refresh_failure_is_a_warning() {
        let logs = LogBuf::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let c = coordinator(vec![
            Ok(vec!["a"]),
            Err(DeviceError::Connection("timeout".into())),
        ]);
        c.refresh().await.unwrap();
        assert!(c.refresh().await.is_err());
        assert!(c.refresh().await.is_err());

        let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let warnings = out.lines().filter(|l| l.contains("WARN")).count();
        assert_eq!(warnings, 2, "{}", out);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_refreshes_on_interval() {
        let c = coordinator(vec![Ok(vec!["a"])]);
        let mut events = c.events();
        let handle = c.spawn_polling(Duration::from_secs(30));

        let evt = events.recv().await.unwrap();
        assert_eq!(evt, CoordinatorEvent::Refreshed { devices: 1 });
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_interval_keeps_polling_alive() {
        let c = coordinator(vec![Ok(vec!["a"])]);
        let handle = c.spawn_polling(Duration::from_secs(u64::MAX));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        let mut events = c.events();
        tokio::time::advance(MAX_POLL_INTERVAL).await;
        assert_eq!(
            events.recv().await.unwrap(),
            CoordinatorEvent::Refreshed { devices: 1 }
        );
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_minimum() {
        let c = coordinator(vec![Ok(vec!["a"])]);
        let mut events = c.events();
        let handle = c.spawn_polling(Duration::ZERO);
        assert_eq!(
            events.recv().await.unwrap(),
            CoordinatorEvent::Refreshed { devices: 1 }
        );
        assert!(!handle.is_finished());
        handle.abort();
    }
}
