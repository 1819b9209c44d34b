//! Worker runtime: a queue-driven pool running ingestion and visualization
//! jobs with host-derived autoscale bounds.
//!
//! Each job runs on a single worker task; jobs parallelize across the pool
//! up to the autoscale ceiling, with a blocking semaphore as the in-flight
//! throttle. Redelivery is safe: coordinators are idempotent for identical
//! inputs and overwrite artifacts by key.

mod semaphore;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::ingestion::IngestionCoordinator;
use crate::store::{JobStore, ObjectStore, ProgressChannel};
use crate::viz::VisualizationCoordinator;

use semaphore::Semaphore;

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTask {
    Ingestion(String),
    Visualization(String),
}

impl JobTask {
    pub fn job_id(&self) -> &str {
        match self {
            JobTask::Ingestion(id) | JobTask::Visualization(id) => id,
        }
    }
}

/// Severity classification for observer callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobSeverity {
    Error,
    /// Infrastructure failures (storage, I/O).
    Critical,
}

/// Observer hook for job outcomes; implementors wire alerting or metrics.
pub trait JobObserver: Send + Sync {
    fn on_success(&self, _task: &JobTask) {}

    fn on_failure(&self, _task: &JobTask, _severity: JobSeverity, _error: &CoreError) {}

    /// Called for failures at or above the pool's alert threshold. Defaults
    /// to forwarding to [`Self::on_failure`].
    fn on_alert(&self, task: &JobTask, severity: JobSeverity, error: &CoreError) {
        self.on_failure(task, severity, error)
    }
}

fn severity_for(error: &CoreError) -> JobSeverity {
    if error.is_infrastructure() {
        JobSeverity::Critical
    } else {
        JobSeverity::Error
    }
}

/// Worker-count bounds derived from host resources: ceiling `max(8, cpus)`,
/// floor `max(4, ceiling / 2)`. An explicit `FD_WORKERS` override pins both.
pub fn autoscale_bounds(settings: &Settings) -> (usize, usize) {
    if let Some(workers) = settings.workers {
        let fixed = workers.max(1);
        return (fixed, fixed);
    }
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    let ceiling = cpus.max(8);
    let floor = (ceiling / 2).max(4);
    (floor, ceiling)
}

/// Point-in-time counters for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerMetricsSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub max_active: usize,
    pub throttle_wait: Duration,
}

#[derive(Debug, Default)]
struct WorkerMetrics {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    active: AtomicUsize,
    max_active: AtomicUsize,
    throttle_wait_ns: AtomicU64,
}

impl WorkerMetrics {
    fn on_start(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        loop {
            let cur = self.max_active.load(Ordering::SeqCst);
            if now <= cur {
                break;
            }
            if self
                .max_active
                .compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
    }

    fn on_end(&self, ok: bool) {
        let _ = self.active.fetch_sub(1, Ordering::SeqCst);
        if ok {
            let _ = self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            let _ = self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            submitted: self.submitted.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            max_active: self.max_active.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
        }
    }
}

/// A job pool over the configured stores.
pub struct WorkerPool {
    pool: ThreadPool,
    throttle: Arc<Semaphore>,
    ingestion: Arc<IngestionCoordinator>,
    visualization: Arc<VisualizationCoordinator>,
    observer: Option<Arc<dyn JobObserver>>,
    alert_at_or_above: JobSeverity,
    metrics: Arc<WorkerMetrics>,
    pending: Arc<(Mutex<usize>, Condvar)>,
}

impl WorkerPool {
    /// Build a pool sized by [`autoscale_bounds`].
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobStore>,
        progress: Arc<ProgressChannel>,
        settings: Settings,
    ) -> CoreResult<Self> {
        let (floor, ceiling) = autoscale_bounds(&settings);
        info!(floor, ceiling, "worker pool starting");

        let pool = ThreadPoolBuilder::new()
            .num_threads(ceiling)
            .thread_name(|i| format!("fd-worker-{i}"))
            .build()
            .map_err(|e| CoreError::InvalidJob(format!("cannot build worker pool: {e}")))?;

        let ingestion = Arc::new(IngestionCoordinator::new(
            Arc::clone(&objects),
            Arc::clone(&jobs),
            Arc::clone(&progress),
            settings.clone(),
        ));
        let visualization = Arc::new(VisualizationCoordinator::new(
            objects,
            jobs,
            progress,
            settings,
        ));

        Ok(Self {
            pool,
            throttle: Arc::new(Semaphore::new(ceiling)),
            ingestion,
            visualization,
            observer: None,
            alert_at_or_above: JobSeverity::Critical,
            metrics: Arc::new(WorkerMetrics::default()),
            pending: Arc::new((Mutex::new(0), Condvar::new())),
        })
    }

    /// Attach an observer for job outcomes.
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Lower the alert threshold (default: only `Critical` failures alert).
    pub fn with_alert_threshold(mut self, threshold: JobSeverity) -> Self {
        self.alert_at_or_above = threshold;
        self
    }

    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run a task synchronously on the caller's thread.
    pub fn run_blocking(&self, task: &JobTask) -> CoreResult<()> {
        let result = self.dispatch(task);
        self.report(task, &result);
        result
    }

    /// Enqueue a task onto the pool; progress flows through the progress
    /// channel and the outcome through the observer.
    pub fn submit(&self, task: JobTask) {
        let _ = self.metrics.submitted.fetch_add(1, Ordering::SeqCst);
        {
            let (lock, _) = &*self.pending;
            *lock.lock().expect("pending mutex poisoned") += 1;
        }

        let throttle = Arc::clone(&self.throttle);
        let ingestion = Arc::clone(&self.ingestion);
        let visualization = Arc::clone(&self.visualization);
        let observer = self.observer.clone();
        let alert_at = self.alert_at_or_above;
        let metrics = Arc::clone(&self.metrics);
        let pending = Arc::clone(&self.pending);

        self.pool.spawn(move || {
            let waited = throttle.acquire();
            if waited > Duration::ZERO {
                let _ = metrics
                    .throttle_wait_ns
                    .fetch_add(waited.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
            }
            metrics.on_start();

            let result = match &task {
                JobTask::Ingestion(id) => ingestion.run(id),
                JobTask::Visualization(id) => visualization.run(id),
            };

            metrics.on_end(result.is_ok());
            throttle.release();

            match &result {
                Ok(()) => {
                    if let Some(obs) = observer.as_ref() {
                        obs.on_success(&task);
                    }
                }
                Err(err) => {
                    let severity = severity_for(err);
                    if let Some(obs) = observer.as_ref() {
                        obs.on_failure(&task, severity, err);
                        if severity >= alert_at {
                            obs.on_alert(&task, severity, err);
                        }
                    }
                }
            }

            let (lock, cv) = &*pending;
            let mut count = lock.lock().expect("pending mutex poisoned");
            *count -= 1;
            if *count == 0 {
                cv.notify_all();
            }
        });
    }

    /// Block until every submitted task has finished.
    pub fn wait_idle(&self) {
        let (lock, cv) = &*self.pending;
        let mut count = lock.lock().expect("pending mutex poisoned");
        while *count > 0 {
            count = cv.wait(count).expect("pending mutex poisoned");
        }
    }

    fn dispatch(&self, task: &JobTask) -> CoreResult<()> {
        match task {
            JobTask::Ingestion(id) => self.ingestion.run(id),
            JobTask::Visualization(id) => self.visualization.run(id),
        }
    }

    fn report(&self, task: &JobTask, result: &CoreResult<()>) {
        match result {
            Ok(()) => {
                if let Some(obs) = self.observer.as_ref() {
                    obs.on_success(task);
                }
            }
            Err(err) => {
                let severity = severity_for(err);
                if let Some(obs) = self.observer.as_ref() {
                    obs.on_failure(task, severity, err);
                    if severity >= self.alert_at_or_above {
                        obs.on_alert(task, severity, err);
                    }
                }
            }
        }
    }
}
