//! Job scheduler implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    Clock, IntoFireTime, JobHandle, ScheduledJob, SchedulerError, SystemClock, scheduler_timezone,
};

/// Maximum sleep duration between scheduler checks.
pub const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Type alias for a registered job body.
pub type JobCallable = Box<
    dyn FnOnce(ScheduledJob) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send,
>;

struct Entry {
    job: ScheduledJob,
    callable: JobCallable,
}

struct Shared {
    clock: Arc<dyn Clock>,
    jobs: Mutex<Vec<Entry>>,
    wake: Notify,
    running: AtomicBool,
}

impl Shared {
    fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now().with_timezone(&scheduler_timezone())
    }

    /// Remove and return every due job. A job leaves the registry before it fires.
    async fn take_due(&self, now: DateTime<FixedOffset>) -> Vec<Entry> {
        let mut jobs = self.jobs.lock().await;
        let (due, pending): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut *jobs)
            .into_iter()
            .partition(|entry| entry.job.is_due(now));
        *jobs = pending;
        due
    }

    async fn sleep_duration(&self, now: DateTime<FixedOffset>) -> Duration {
        let jobs = self.jobs.lock().await;
        match jobs.iter().map(|entry| entry.job.fire_at).min() {
            Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP),
            None => MAX_SLEEP,
        }
    }
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The job scheduler.
///
/// Stopped until [`start`](Self::start) is called. Jobs fire on the
/// scheduler's own task; each job body runs as a separate task so a slow
/// job never delays another.
pub struct Scheduler {
    shared: Arc<Shared>,
    runtime: Mutex<Option<Running>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a new, stopped scheduler on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new, stopped scheduler reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                jobs: Mutex::new(Vec::new()),
                wake: Notify::new(),
                running: AtomicBool::new(false),
            }),
            runtime: Mutex::new(None),
        }
    }

    /// Current time in the scheduler's timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.shared.now()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Start the scheduler loop. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            debug!("scheduler already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shared.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run(Arc::clone(&self.shared), shutdown_rx));
        *runtime = Some(Running {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the scheduler, waiting for jobs that are already firing.
    ///
    /// Pending jobs stay registered and fire if the scheduler is started again.
    pub async fn stop(&self) {
        let Some(running) = self.runtime.lock().await.take() else {
            return;
        };

        self.shared.running.store(false, Ordering::SeqCst);
        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.handle.await {
            error!(error = %e, "scheduler loop panicked");
        }

        let pending = self.pending_count().await;
        if pending > 0 {
            warn!(pending, "scheduler stopped with pending jobs; they are not persisted");
        }
    }

    /// Register `callable` to fire once at `fire_at`.
    ///
    /// Refuses instants at or before now; nothing is stored in that case.
    #[tracing::instrument(skip(self, name, fire_at, payload, callable), fields(name = %name.as_ref()))]
    pub async fn register<N, T, F, Fut>(
        &self,
        name: N,
        fire_at: T,
        payload: serde_json::Value,
        callable: F,
    ) -> Result<JobHandle, SchedulerError>
    where
        N: AsRef<str>,
        T: IntoFireTime,
        F: FnOnce(ScheduledJob) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        if !self.is_running() {
            warn!("refusing job registration: scheduler is not running");
            return Err(SchedulerError::NotRunning);
        }

        let fire_at = fire_at.into_fire_time();
        let now = self.now();
        if fire_at <= now {
            warn!(%fire_at, %now, "refusing job registration: fire time is not in the future");
            return Err(SchedulerError::NotFuture { fire_at, now });
        }

        let job = ScheduledJob {
            id: Uuid::new_v4().simple().to_string(),
            name: name.as_ref().to_string(),
            fire_at,
            payload,
            created_at: Utc::now(),
        };
        let handle = job.handle();
        let boxed: JobCallable = Box::new(
            move |job| -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> {
                Box::pin(callable(job))
            },
        );

        self.shared.jobs.lock().await.push(Entry {
            job,
            callable: boxed,
        });
        self.shared.wake.notify_one();

        info!(id = %handle.id, %fire_at, "registered job");
        Ok(handle)
    }

    /// Pending jobs, soonest first.
    pub async fn jobs(&self) -> Vec<ScheduledJob> {
        let mut jobs: Vec<ScheduledJob> = self
            .shared
            .jobs
            .lock()
            .await
            .iter()
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.fire_at.cmp(&b.fire_at));
        jobs
    }

    pub async fn pending_count(&self) -> usize {
        self.shared.jobs.lock().await.len()
    }
}

/// Run the scheduler loop until shutdown, then drain in-flight jobs.
async fn run(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    info!("scheduler starting");
    let mut in_flight = JoinSet::new();

    loop {
        if *shutdown_rx.borrow() {
            info!("scheduler shutting down");
            break;
        }

        let now = shared.now();
        for Entry { job, callable } in shared.take_due(now).await {
            let lateness = job.lateness(now);
            if job.is_misfired(now) {
                error!(
                    id = %job.id,
                    name = %job.name,
                    fire_at = %job.fire_at,
                    late_secs = lateness.num_seconds(),
                    "job missed its misfire grace window, dropped"
                );
                continue;
            }
            if lateness.num_seconds() >= 1 {
                warn!(id = %job.id, late_secs = lateness.num_seconds(), "job firing late");
            }

            info!(id = %job.id, name = %job.name, "firing job");
            let id = job.id.clone();
            let fut = callable(job);
            in_flight.spawn(async move {
                match fut.await {
                    Ok(()) => info!(id = %id, "job completed"),
                    Err(e) => error!(id = %id, error = %e, "job failed"),
                }
            });
        }

        while let Some(result) = in_flight.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "job panicked");
            }
        }

        let sleep_duration = shared.sleep_duration(now).await;

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shared.wake.notified() => {}
            _ = sleep(sleep_duration) => {}
        }
    }

    if !in_flight.is_empty() {
        info!(count = in_flight.len(), "waiting for in-flight jobs");
    }
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "job panicked");
        }
    }

    info!("scheduler shut down gracefully");
}
