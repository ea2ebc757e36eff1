//! Collection scheduler.
//!
//! Drives the `JobQueue` in this module with a domain-specific runner: one tick loop
//! decides which services are due (by cron expression or the global
//! `COLLECTION_INTERVAL` fallback), enqueues a `CollectionJob` per due service, and a
//! bounded worker pool drains the queue. Per-service single-flight is enforced by
//! `Store::transition_status`'s compare-and-swap rather than a lock held across an
//! await, since the authoritative "is this service running" state must survive a
//! process restart.
//!
//! A job that loses the CAS race (another trigger got there first) is requeued with a
//! short delay rather than dropped — a manual trigger arriving mid-cron-run should not
//! silently vanish.

use super::memory_queue::MemoryJobQueue;
use super::traits::JobQueue as _;
use super::types::{JobPriority, SerializableJob};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{CollectionCredential, CollectionHistory, ServiceState, TriggerType};
use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use rand::Rng;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Grace period a cancelled run gets to observe the signal and unwind before the
/// scheduler drops its task outright (§4.7 "Cancellation").
const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Internal service name routed through the same queue as real collectors (§4.6).
pub const LIFECYCLE_SWEEP_SERVICE: &str = "__lifecycle_sweep__";

/// Implemented by `ipwatch-collector`'s `Collector`. Lives here (not in collector) so
/// the scheduler can hold a trait object without `ipwatch-core` depending on
/// `ipwatch-collector` — the composition root in `ipwatch-api` wires the concrete type.
#[async_trait]
pub trait CollectionRunner: Send + Sync {
    async fn collect(&self, credential: &CollectionCredential) -> Result<CollectionOutcome>;
}

/// Implemented by the Lifecycle Engine; invoked for the internal sweep job.
#[async_trait]
pub trait LifecycleSweeper: Send + Sync {
    async fn sweep(&self) -> Result<CollectionOutcome>;
}

#[derive(Debug, Clone, Default)]
pub struct CollectionOutcome {
    pub items_collected: i32,
    pub details: serde_json::Value,
}

/// A unit of scheduled work. Kept intentionally thin — the job's own state lives in
/// `collection_status`/`collection_history`, not in this struct.
#[derive(Debug, Clone)]
struct CollectionJob {
    service: String,
    trigger: TriggerType,
    attempt: u32,
}

impl SerializableJob for CollectionJob {
    fn job_type(&self) -> &'static str {
        "collection"
    }

    fn serialize(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(SerializedJob {
            service: self.service.clone(),
            trigger: self.trigger,
            attempt: self.attempt,
        })
    }

    fn deserialize(
        data: &serde_json::Value,
    ) -> std::result::Result<Box<dyn SerializableJob>, serde_json::Error> {
        let parsed: SerializedJob = serde_json::from_value(data.clone())?;
        Ok(Box::new(CollectionJob {
            service: parsed.service,
            trigger: parsed.trigger,
            attempt: parsed.attempt,
        }))
    }

    fn priority(&self) -> JobPriority {
        match self.trigger {
            TriggerType::Manual | TriggerType::Api => JobPriority::High,
            TriggerType::Cron => JobPriority::Normal,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SerializedJob {
    service: String,
    trigger: TriggerType,
    attempt: u32,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub default_interval: Duration,
    pub run_timeout: Duration,
    pub max_retries: u32,
    pub requeue_delay: Duration,
    pub requeue_max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_factor: f64,
    pub backoff_cap: Duration,
    pub tick_interval: Duration,
    pub worker_count: usize,
    pub lifecycle_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(3600),
            run_timeout: Duration::from_secs(600),
            max_retries: 3,
            requeue_delay: Duration::from_secs(5),
            requeue_max_attempts: 3,
            backoff_base: Duration::from_secs(30),
            backoff_factor: 2.0,
            backoff_cap: Duration::from_secs(900),
            tick_interval: Duration::from_secs(10),
            worker_count: 2,
            lifecycle_interval: Duration::from_secs(86_400),
        }
    }
}

/// Owns the in-memory queue, the per-service cron schedules, and the worker pool.
/// `CollectionRunner`/`LifecycleSweeper` are injected so this struct stays free of
/// any HTTP-client or spreadsheet-parsing concern — those belong to the collector.
pub struct Scheduler {
    store: Arc<Store>,
    runner: Arc<dyn CollectionRunner>,
    lifecycle: Arc<dyn LifecycleSweeper>,
    config: SchedulerConfig,
    queue: Arc<MemoryJobQueue>,
    permits: Arc<Semaphore>,
    schedules: Mutex<HashMap<String, Schedule>>,
    running: AtomicBool,
    auto_collect_disabled: AtomicBool,
    /// One cancellation sender per service currently `running` (§4.7). Populated by
    /// `run_one` just before it starts the Scraper/sweep future, removed on exit.
    cancellations: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        runner: Arc<dyn CollectionRunner>,
        lifecycle: Arc<dyn LifecycleSweeper>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            runner,
            lifecycle,
            permits: Arc::new(Semaphore::new(config.worker_count.max(1))),
            queue: Arc::new(MemoryJobQueue::new()),
            schedules: Mutex::new(HashMap::new()),
            config,
            running: AtomicBool::new(false),
            auto_collect_disabled: AtomicBool::new(false),
            cancellations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `POST /api/collection/cancel/:service` (§4.7): signal the in-flight run for
    /// `service`, if any, to unwind. Returns `false` when no job is currently
    /// running for that service rather than treating it as an error — cancelling a
    /// job that already finished is not exceptional.
    pub async fn cancel(&self, service: &str) -> bool {
        let sender = self.cancellations.lock().await.remove(service);
        match sender {
            Some(sender) => sender.send(()).is_ok(),
            None => false,
        }
    }

    /// Queue a collection run outside the cron cadence (§4.9's `POST /api/collection/trigger`).
    pub async fn trigger(&self, service: &str, trigger: TriggerType) -> Result<()> {
        let job = CollectionJob {
            service: service.to_string(),
            trigger,
            attempt: 0,
        };
        let queued = super::types::QueuedJob::new(&job).map_err(Error::from)?;
        self.queue.enqueue(queued).await?;
        Ok(())
    }

    pub fn set_auto_collection_disabled(&self, disabled: bool) {
        self.auto_collect_disabled.store(disabled, Ordering::Relaxed);
    }

    /// Reload per-service cron expressions from `SETTINGS` (keys `CRON_<SERVICE>`).
    pub async fn reload_schedules(&self) -> Result<()> {
        let settings = self.store.list_settings().await?;
        let mut schedules = self.schedules.lock().await;
        schedules.clear();
        for setting in settings {
            if let Some(service) = setting.key.strip_prefix("CRON_") {
                match Schedule::from_str(&setting.value) {
                    Ok(schedule) => {
                        schedules.insert(service.to_string(), schedule);
                    }
                    Err(err) => {
                        warn!(service, error = %err, "invalid cron expression in settings, ignoring");
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs forever; intended to be spawned once at startup and held onto for shutdown.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::Relaxed);
        let _ = self.reload_schedules().await;

        let mut ticker = interval(self.config.tick_interval);
        let mut last_lifecycle = Utc::now() - chrono::Duration::from_std(self.config.lifecycle_interval).unwrap_or_default();

        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::Relaxed) {
                break;
            }

            if !self.auto_collect_disabled.load(Ordering::Relaxed) {
                if let Err(err) = self.enqueue_due_cron_jobs().await {
                    error!(error = %err, "failed to evaluate cron schedules");
                }
            }

            let since_last = Utc::now() - last_lifecycle;
            if since_last.to_std().unwrap_or_default() >= self.config.lifecycle_interval {
                if let Err(err) = self.trigger(LIFECYCLE_SWEEP_SERVICE, TriggerType::Cron).await {
                    error!(error = %err, "failed to enqueue lifecycle sweep");
                } else {
                    last_lifecycle = Utc::now();
                }
            }

            self.drain_ready_jobs().await;
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    async fn enqueue_due_cron_jobs(&self) -> Result<()> {
        let credentials = self.store.list_enabled_credentials().await?;
        let schedules = self.schedules.lock().await;

        for credential in credentials {
            let due = match schedules.get(&credential.service) {
                Some(schedule) => {
                    let status = self.store.get_status(&credential.service).await?;
                    let last_run = status.and_then(|s| s.last_run_at);
                    let floor = last_run.unwrap_or_else(|| Utc::now() - chrono::Duration::days(365));
                    let next_due = schedule.after(&floor).next();
                    if let Some(next_due) = next_due {
                        let _ = self.store.set_next_run_at(&credential.service, next_due).await;
                    }
                    next_due.map(|next_due| next_due <= Utc::now()).unwrap_or(false)
                }
                None => {
                    let status = self.store.get_status(&credential.service).await?;
                    let interval = chrono::Duration::seconds(
                        credential.collection_interval_seconds.max(60),
                    );
                    let last_run = status.and_then(|s| s.last_run_at);
                    if let Some(last_run) = last_run {
                        let _ = self
                            .store
                            .set_next_run_at(&credential.service, last_run + interval)
                            .await;
                    }
                    last_run.map(|last| Utc::now() - last >= interval).unwrap_or(true)
                }
            };

            if due {
                self.trigger(&credential.service, TriggerType::Cron).await?;
            }
        }
        Ok(())
    }

    async fn drain_ready_jobs(&self) {
        loop {
            let permit = match self.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let queued = match self.queue.dequeue("scheduler").await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    break;
                }
                Err(err) => {
                    error!(error = %err, "failed to dequeue collection job");
                    drop(permit);
                    break;
                }
            };

            let Ok(job) = serde_json::from_value::<SerializedJob>(queued.data.clone()) else {
                error!("failed to deserialize queued collection job");
                continue;
            };

            let store = self.store.clone();
            let runner = self.runner.clone();
            let lifecycle = self.lifecycle.clone();
            let config = self.config.clone();
            let queue = self.queue.clone();
            let job_id = queued.id.clone();
            let cancellations = self.cancellations.clone();

            tokio::spawn(async move {
                let _permit = permit;
                run_one(
                    store,
                    runner,
                    lifecycle,
                    &config,
                    CollectionJob {
                        service: job.service,
                        trigger: job.trigger,
                        attempt: job.attempt,
                    },
                    queue,
                    job_id,
                    cancellations,
                )
                .await;
            });
        }
    }
}

/// Outcome of racing a run's future against its timeout and a possible
/// cancellation signal (§4.7).
enum RunOutcome {
    Success(CollectionOutcome),
    Failed(Error),
    TimedOut,
    Cancelled,
}

/// Drives `fut` to completion unless `run_timeout` elapses first or `cancel_rx`
/// fires. On cancellation the future is given `CANCEL_GRACE_PERIOD` to finish
/// cooperatively before being forcibly dropped (§4.7: "must finish within 5s or
/// be forcibly terminated; partial progress already committed remains").
async fn race_run<F>(fut: F, run_timeout: Duration, cancel_rx: oneshot::Receiver<()>) -> RunOutcome
where
    F: std::future::Future<Output = Result<CollectionOutcome>>,
{
    tokio::pin!(fut);
    tokio::select! {
        result = &mut fut => match result {
            Ok(outcome) => RunOutcome::Success(outcome),
            Err(err) => RunOutcome::Failed(err),
        },
        _ = tokio::time::sleep(run_timeout) => RunOutcome::TimedOut,
        _ = cancel_rx => {
            match tokio::time::timeout(CANCEL_GRACE_PERIOD, &mut fut).await {
                Ok(Ok(outcome)) => RunOutcome::Success(outcome),
                Ok(Err(err)) => RunOutcome::Failed(err),
                Err(_) => RunOutcome::Cancelled,
            }
        }
    }
}

async fn run_one(
    store: Arc<Store>,
    runner: Arc<dyn CollectionRunner>,
    lifecycle: Arc<dyn LifecycleSweeper>,
    config: &SchedulerConfig,
    job: CollectionJob,
    queue: Arc<MemoryJobQueue>,
    job_id: super::types::JobId,
    cancellations: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
) {
    let acquired = store
        .transition_status(&job.service, ServiceState::Idle, ServiceState::Running)
        .await;

    let acquired = match acquired {
        Ok(acquired) => acquired,
        Err(err) => {
            error!(service = %job.service, error = %err, "status transition failed");
            return;
        }
    };

    if !acquired {
        if job.attempt >= config.requeue_max_attempts {
            warn!(service = %job.service, "dropping job after exhausting requeue attempts, service still busy");
            return;
        }
        debug!(service = %job.service, attempt = job.attempt, "service busy, requeueing");
        tokio::time::sleep(config.requeue_delay).await;
        let requeued = CollectionJob {
            attempt: job.attempt + 1,
            ..job
        };
        if let Ok(queued) = super::types::QueuedJob::new(&requeued) {
            let _ = queue.enqueue(queued).await;
        }
        return;
    }

    if job.service != LIFECYCLE_SWEEP_SERVICE {
        if let Err(err) = store.mark_run_started(&job.service).await {
            error!(service = %job.service, error = %err, "failed to record run start time");
        }
    }

    let (cancel_tx, cancel_rx) = oneshot::channel();
    cancellations.lock().await.insert(job.service.clone(), cancel_tx);

    let started_at = Utc::now();
    let outcome = if job.service == LIFECYCLE_SWEEP_SERVICE {
        race_run(lifecycle.sweep(), config.run_timeout, cancel_rx).await
    } else {
        let credential = match store.get_credential(&job.service).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                cancellations.lock().await.remove(&job.service);
                let _ = store
                    .transition_status(&job.service, ServiceState::Running, ServiceState::Error)
                    .await;
                error!(service = %job.service, "no credential configured for scheduled service");
                return;
            }
            Err(err) => {
                cancellations.lock().await.remove(&job.service);
                let _ = store
                    .transition_status(&job.service, ServiceState::Running, ServiceState::Error)
                    .await;
                error!(service = %job.service, error = %err, "failed to load credential");
                return;
            }
        };
        race_run(runner.collect(&credential), config.run_timeout, cancel_rx).await
    };
    cancellations.lock().await.remove(&job.service);

    let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0);

    if matches!(outcome, RunOutcome::Cancelled) {
        // §7: a cancelled job writes no history row; partial progress already
        // committed by the Store stands.
        if let Err(err) = store
            .transition_status(&job.service, ServiceState::Running, ServiceState::Idle)
            .await
        {
            error!(service = %job.service, error = %err, "failed to release service status lock after cancellation");
        }
        info!(service = %job.service, job_id = %job_id, duration_ms, "collection run cancelled");
        return;
    }

    let (success, items_collected, error_message, details) = match outcome {
        RunOutcome::Success(result) => (true, result.items_collected, None, result.details),
        RunOutcome::Failed(err) => (false, 0, Some(err.to_string()), serde_json::json!({})),
        RunOutcome::TimedOut => (
            false,
            0,
            Some(format!("collection run exceeded {:?} timeout", config.run_timeout)),
            serde_json::json!({}),
        ),
        RunOutcome::Cancelled => unreachable!("handled above"),
    };

    let next_state = if success {
        ServiceState::Idle
    } else if job.attempt + 1 >= config.max_retries {
        ServiceState::Error
    } else {
        ServiceState::Idle
    };

    if let Err(err) = store
        .transition_status(&job.service, ServiceState::Running, next_state)
        .await
    {
        error!(service = %job.service, error = %err, "failed to release service status lock");
    }

    let count_result = if success {
        store.increment_success_count(&job.service).await
    } else {
        store.increment_error_count(&job.service).await
    };
    if let Err(err) = count_result {
        error!(service = %job.service, error = %err, "failed to update service run counters");
    }

    let history = CollectionHistory {
        id: uuid::Uuid::new_v4(),
        service: job.service.clone(),
        started_at,
        trigger_type: job.trigger,
        items_collected,
        success,
        error_message: error_message.clone(),
        duration_ms,
        details,
    };
    if let Err(err) = store.record_collection_history(history).await {
        error!(service = %job.service, error = %err, "failed to append collection history");
    }

    let service_name = job.service.clone();
    let should_retry = !success && job.attempt + 1 < config.max_retries;
    if should_retry {
        let base_delay = (config.backoff_base.as_secs_f64()
            * config.backoff_factor.powi(job.attempt as i32))
        .min(config.backoff_cap.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(-0.2..=0.2);
        let delay_secs = (base_delay * (1.0 + jitter)).max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;

        let retry_job = CollectionJob {
            attempt: job.attempt + 1,
            ..job
        };
        if let Ok(queued) = super::types::QueuedJob::new(&retry_job) {
            let _ = queue.enqueue(queued).await;
        }
    }

    info!(
        service = %service_name,
        job_id = %job_id,
        success,
        duration_ms,
        items_collected,
        "collection run finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_is_capped() {
        let config = SchedulerConfig::default();
        let mut delay = config.backoff_base.as_secs_f64();
        for _ in 0..10 {
            delay = (delay * config.backoff_factor).min(config.backoff_cap.as_secs_f64());
        }
        assert!(delay <= config.backoff_cap.as_secs_f64());
    }

    #[test]
    fn collection_job_round_trips_through_serialization() {
        let job = CollectionJob {
            service: "REGTECH".to_string(),
            trigger: TriggerType::Manual,
            attempt: 1,
        };
        let value = job.serialize().unwrap();
        let restored = CollectionJob::deserialize(&value).unwrap();
        assert_eq!(restored.job_type(), "collection");
    }
}
