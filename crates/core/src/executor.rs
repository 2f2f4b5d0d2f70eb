use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::CommandError;

pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Runs blocking SDK calls on tokio's blocking pool, at most `max_workers`
/// at a time. Only the awaiting task is suspended while a job runs.
#[derive(Clone, Debug)]
pub struct Executor {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl Executor {
    /// `max_workers` is kept within `1..=Semaphore::MAX_PERMITS`.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` off the async runtime and wait for its result.
    ///
    /// Once started the job always runs to completion, even if the caller
    /// stops waiting. A panic inside the job is resumed on the caller.
    pub async fn run<F, T>(&self, job: F) -> Result<T, CommandError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CommandError::Executor("executor shut down".to_string()))?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        match handle.await {
            Ok(value) => Ok(value),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => {
                debug!(error = %err, "blocking job cancelled");
                Err(CommandError::Executor(err.to_string()))
            }
        }
    }

    /// Refuse new jobs. Jobs already running are not interrupted.
    pub fn shutdown(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn run_returns_job_value() {
        let exec = Executor::new(2);
        let v = exec.run(|| 40 + 2).await.unwrap();
        assert_eq!(v, 42);
        assert_eq!(exec.idle_workers(), 2);
    }

    #[tokio::test]
    async fn zero_workers_is_bumped_to_one() {
        assert_eq!(Executor::new(0).max_workers(), 1);
    }

    #[tokio::test]
    async fn oversized_pool_is_capped_at_semaphore_limit() {
        let exec = Executor::new(usize::MAX);
        assert_eq!(exec.max_workers(), Semaphore::MAX_PERMITS);
        assert_eq!(exec.run(|| 7).await.unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrency_is_bounded_by_max_workers() {
        let exec = Executor::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let exec = exec.clone();
            let running = running.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                exec.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_jobs() {
        let exec = Executor::new(1);
        exec.shutdown();
        let err = exec.run(|| ()).await.unwrap_err();
        assert!(matches!(err, CommandError::Executor(_)));
    }

    #[tokio::test]
    #[should_panic(expected = "sdk exploded")]
    async fn job_panic_is_resumed_on_caller() {
        let exec = Executor::new(1);
        let _ = exec.run(|| panic!("sdk exploded")).await;
    }
}
