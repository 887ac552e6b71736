//! The notification queue: producer, observer and admin API
//!
//! All mutable state sits behind one lock, so every method observes a job in
//! exactly one of the pending store, the processing set or a ledger. The only
//! work done outside the lock is the transport call itself (see
//! [`crate::worker`]).

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::{ConfigError, QueueConfig};
use crate::job::{BulkJob, EnqueueOptions, Job, JobId, JobState, NotificationKind, Priority};
use crate::ledger::{CompletedLedger, FailedLedger};
use crate::metrics::{throughput_per_minute, QueueMetrics, QueueStats};
use crate::pending::PendingStore;
use crate::report::{self, ReportThresholds};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pub(crate) pending: PendingStore,
    pub(crate) processing: HashSet<JobId>,
    pub(crate) completed: CompletedLedger,
    pub(crate) failed: FailedLedger,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<QueueState>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: QueueConfig,
    pub(crate) policy: RetryPolicy,
    pub(crate) metrics: QueueMetrics,
    pub(crate) thresholds: ReportThresholds,
}

/// In-process, priority-ordered notification queue.
///
/// Construct one per application and hand clones to producers; clones share
/// the same state. Nothing is dispatched until [`NotificationQueue::start`]
/// is called or [`NotificationQueue::tick`] is driven manually.
#[derive(Clone)]
pub struct NotificationQueue {
    pub(crate) shared: Arc<Shared>,
    pub(crate) tasks: TaskTracker,
    pub(crate) shutdown: CancellationToken,
    pub(crate) run_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("transport", &self.shared.transport.name())
            .field("config", &self.shared.config)
            .field("in_flight_tasks", &self.tasks.len())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl NotificationQueue {
    pub fn new(config: QueueConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        Self::with_thresholds(config, transport, ReportThresholds::default())
    }

    /// Like [`NotificationQueue::new`] with custom report advisories.
    pub fn with_thresholds(
        config: QueueConfig,
        transport: Arc<dyn Transport>,
        thresholds: ReportThresholds,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Shared {
            state: Mutex::new(QueueState::default()),
            transport,
            config,
            policy: RetryPolicy::new(config.retry_delay),
            metrics: QueueMetrics::new(),
            thresholds,
        };
        Ok(Self {
            shared: Arc::new(shared),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            run_loop: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Accept a notification for delivery. Never fails once called; delivery
    /// problems only show up through [`NotificationQueue::status`] and stats.
    pub async fn enqueue(
        &self,
        kind: NotificationKind,
        recipient: impl Into<String>,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> JobId {
        let mut job = Job::new(
            kind,
            recipient,
            payload,
            options.priority.unwrap_or_default(),
            options.max_retries.unwrap_or(self.shared.config.max_retries),
        );
        job.scheduled_at = options.scheduled_at;
        let id = job.id;

        info!(
            job_id = %id,
            kind = %job.kind,
            priority = %job.priority,
            scheduled_at = ?job.scheduled_at,
            "Enqueued notification"
        );
        self.shared.state.lock().await.pending.insert_by_priority(job);
        id
    }

    /// Enqueue a notification that must not go out before `at`.
    pub async fn schedule(
        &self,
        kind: NotificationKind,
        recipient: impl Into<String>,
        payload: serde_json::Value,
        at: DateTime<Utc>,
        options: EnqueueOptions,
    ) -> JobId {
        self.enqueue(kind, recipient, payload, options.with_scheduled_at(at))
            .await
    }

    /// Enqueue a batch ahead of everything already pending.
    ///
    /// The batch is ordered by priority among itself (stable, so equal
    /// priorities keep submission order) and then placed wholesale at the
    /// front of the store; it does not interleave with existing jobs.
    /// Returned ids follow submission order.
    pub async fn enqueue_bulk(&self, batch: Vec<BulkJob>) -> Vec<JobId> {
        if batch.is_empty() {
            return Vec::new();
        }

        let default_retries = self.shared.config.max_retries;
        let mut jobs: Vec<Job> = batch
            .into_iter()
            .map(|b| {
                Job::new(
                    b.kind,
                    b.recipient,
                    b.payload,
                    b.priority.unwrap_or_default(),
                    b.max_retries.unwrap_or(default_retries),
                )
            })
            .collect();
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
        jobs.sort_by_key(|j| j.priority.rank());

        info!(count = ids.len(), "Enqueued notification batch");
        self.shared.state.lock().await.pending.prepend_batch(jobs);
        ids
    }

    /// Where `id` currently lives.
    pub async fn status(&self, id: JobId) -> JobState {
        let state = self.shared.state.lock().await;
        if state.processing.contains(&id) {
            return JobState::Processing;
        }
        if let Some(entry) = state.completed.get(id) {
            return JobState::Completed {
                completed_at: entry.completed_at,
            };
        }
        if let Some(job) = state.failed.get(id) {
            return JobState::Failed { job: job.clone() };
        }
        match state.pending.get(id) {
            Some(job) => JobState::Pending { job: job.clone() },
            None => JobState::NotFound,
        }
    }

    /// Change the priority of a pending job and re-insert it accordingly.
    /// Returns `false` if the job is not pending.
    pub async fn promote(&self, id: JobId, priority: Priority) -> bool {
        let mut state = self.shared.state.lock().await;
        match state.pending.remove(id) {
            Some(mut job) => {
                let previous = job.priority;
                job.priority = priority;
                state.pending.insert_by_priority(job);
                info!(job_id = %id, from = %previous, to = %priority, "Changed job priority");
                true
            }
            None => {
                debug!(job_id = %id, "Priority change ignored, job not pending");
                false
            }
        }
    }

    /// Forget completed jobs that finished at least `max_age` ago.
    pub async fn prune_completed(&self, max_age: Duration) -> usize {
        let cutoff = cutoff(max_age);
        let removed = self.shared.state.lock().await.completed.prune(cutoff);
        if removed > 0 {
            info!(removed, "Pruned completed jobs");
        }
        removed
    }

    /// Give failed jobs whose last attempt is at least `max_age` old a fresh
    /// retry budget and put them at the front of the pending store.
    pub async fn resurrect_failed(&self, max_age: Duration) -> usize {
        let cutoff = cutoff(max_age);
        let mut state = self.shared.state.lock().await;
        let mut revived = state.failed.take_older_than(cutoff);
        for job in &mut revived {
            job.retry_count = 0;
            job.error = None;
        }
        let count = revived.len();
        state.pending.prepend_batch(revived);
        if count > 0 {
            info!(count, "Resurrected failed jobs");
        }
        count
    }

    pub async fn stats(&self) -> QueueStats {
        let metrics = &self.shared.metrics;
        let state = self.shared.state.lock().await;
        let retrying = state.pending.retrying();
        let processed = metrics.processed();
        let uptime = metrics.uptime();

        QueueStats {
            pending: state.pending.len() - retrying,
            processing: state.processing.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
            retrying,
            throughput: throughput_per_minute(processed, uptime),
            total_processed: processed,
            total_failed: metrics.failed(),
            total_retried: metrics.retried(),
            success_rate: metrics.success_rate(),
            uptime_secs: uptime.as_secs(),
        }
    }

    /// Text report with threshold advisories.
    pub async fn report(&self) -> String {
        let stats = self.stats().await;
        report::render(&stats, &self.shared.thresholds)
    }

    /// Pending job ids in dispatch order.
    pub async fn pending_ids(&self) -> Vec<JobId> {
        self.shared.state.lock().await.pending.ids()
    }

    /// True when nothing is pending or in flight.
    pub async fn is_drained(&self) -> bool {
        let state = self.shared.state.lock().await;
        state.pending.is_empty() && state.processing.is_empty()
    }
}

fn cutoff(max_age: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
