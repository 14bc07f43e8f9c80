//! Bounded dispatch of blocking inference work
use crate::error::PipelineError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use telemetry::metrics::LPR_INFERENCE_IN_FLIGHT;
use tokio::sync::Semaphore;

/// Counts a job as in flight for as long as it is alive on a blocking thread
struct InFlight {
    jobs: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(jobs: Arc<AtomicUsize>) -> Self {
        jobs.fetch_add(1, Ordering::SeqCst);
        LPR_INFERENCE_IN_FLIGHT.inc();
        Self { jobs }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.jobs.fetch_sub(1, Ordering::SeqCst);
        LPR_INFERENCE_IN_FLIGHT.dec();
    }
}

/// Runs blocking jobs on tokio's blocking threads, at most `workers` at once
#[derive(Debug, Clone)]
pub struct InferencePool {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    workers: usize,
}

impl InferencePool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Permits not currently held by a job
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Jobs currently executing on a blocking thread
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait for a free worker, then run `job` off the async threads.
    ///
    /// A panicking job is reported as [`PipelineError::Internal`]. Dropping
    /// the returned future does not stop a job that already started; its
    /// worker and in-flight slot are released when the job finishes.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Internal(format!("inference pool closed: {}", e)))?;

        let in_flight = self.in_flight.clone();
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _in_flight = InFlight::enter(in_flight);
            job()
        })
        .await;

        result.map_err(|e| {
            tracing::error!(error = %e, "Inference job did not complete");
            PipelineError::Internal(format!("inference job failed: {}", e))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_job_and_returns_result() {
        let pool = InferencePool::new(2);
        let value = pool.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_job_errors_pass_through() {
        let pool = InferencePool::new(1);
        let err = pool
            .run(|| Err::<(), _>(PipelineError::Decode("bad".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[tokio::test]
    async fn test_panicking_job_is_internal_error() {
        let pool = InferencePool::new(1);
        let err = pool
            .run(|| -> Result<(), PipelineError> { panic!("model exploded") })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));

        // The permit is released after the panic
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_caller_releases_worker_after_job() {
        let pool = InferencePool::new(1);

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            pool.run(|| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            }),
        )
        .await;
        assert!(outcome.is_err());

        // The job keeps running after its caller is gone
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = InferencePool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_zero_workers_rounds_up() {
        assert_eq!(InferencePool::new(0).workers(), 1);
    }
}
