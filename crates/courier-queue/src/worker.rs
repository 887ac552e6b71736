//! Dispatch loop and per-job delivery

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::job::{Job, JobId};
use crate::queue::{NotificationQueue, Shared};
use crate::retry::RetryDecision;
use crate::ticker::Ticker;
use crate::transport::DeliveryError;

const IDLE_POLL: Duration = Duration::from_millis(5);

impl NotificationQueue {
    /// Start the periodic dispatch loop on the current runtime.
    ///
    /// Calling it again while the loop is running is a no-op.
    pub async fn start(&self) {
        let mut run_loop = self.run_loop.lock().await;
        if run_loop.is_some() {
            warn!("Dispatch loop already running");
            return;
        }
        if self.shutdown.is_cancelled() {
            warn!("Queue has been shut down, not starting dispatch loop");
            return;
        }

        let period = self.shared.config.processing_interval;
        let mut ticker = Ticker::new(period, self.shutdown.child_token());
        let queue = self.clone();

        info!(
            max_concurrent_jobs = self.shared.config.max_concurrent_jobs,
            batch_size = self.shared.config.batch_size,
            interval_ms = period.as_millis() as u64,
            transport = self.shared.transport.name(),
            "Notification queue started"
        );

        *run_loop = Some(tokio::spawn(async move {
            while ticker.tick().await {
                queue.tick().await;
            }
            debug!("Dispatch loop exited");
        }));
    }

    /// Run one dispatch round and return the ids handed to the transport.
    ///
    /// Pulls ready jobs up to the free capacity (capped at `batch_size`),
    /// moves them into the processing set and spawns one delivery per job.
    /// Does not wait for those deliveries.
    pub async fn tick(&self) -> Vec<JobId> {
        if self.shutdown.is_cancelled() {
            return Vec::new();
        }

        let config = &self.shared.config;
        let selected = {
            let mut state = self.shared.state.lock().await;
            let in_flight = state.processing.len();
            if in_flight >= config.max_concurrent_jobs {
                debug!(in_flight, "No free dispatch slots this tick");
                return Vec::new();
            }

            let slots = (config.max_concurrent_jobs - in_flight).min(config.batch_size);
            let now = Utc::now();
            let mut jobs = state.pending.dequeue_ready(slots, now, &self.shared.policy);
            for job in &mut jobs {
                job.last_attempt = Some(now);
                state.processing.insert(job.id);
            }
            debug!(
                selected = jobs.len(),
                slots,
                pending = state.pending.len(),
                "Dispatch tick"
            );
            jobs
        };

        let ids: Vec<JobId> = selected.iter().map(|j| j.id).collect();
        for job in selected {
            self.tasks.spawn(Shared::attempt(self.shared.clone(), job));
        }
        ids
    }

    /// Wait until no delivery is in flight. Does not stop the dispatch loop,
    /// so with the loop running this may keep waiting as new work starts.
    pub async fn wait_idle(&self) {
        while !self.tasks.is_empty() {
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Stop the dispatch loop and wait for in-flight deliveries to finish.
    ///
    /// Deliveries are never cancelled. Jobs still pending stay pending and
    /// can be inspected afterwards; further ticks do nothing.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.run_loop.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch loop ended abnormally");
            }
        }

        info!(in_flight = self.tasks.len(), "Draining in-flight deliveries");
        self.tasks.close();
        self.tasks.wait().await;
        info!("Notification queue stopped");
    }
}

impl Shared {
    /// Deliver one job and file the outcome. The processing-set entry is
    /// always released, including when the transport panics or times out.
    pub(crate) async fn attempt(self: Arc<Self>, job: Job) {
        debug!(
            job_id = %job.id,
            kind = %job.kind,
            retry_count = job.retry_count,
            "Delivering notification"
        );

        let outcome = {
            let delivery = AssertUnwindSafe(self.transport.deliver(&job)).catch_unwind();
            let caught = match self.config.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, delivery)
                    .await
                    .unwrap_or(Ok(Err(DeliveryError::Timeout(limit)))),
                None => delivery.await,
            };
            caught.unwrap_or_else(|panic| Err(DeliveryError::Panicked(panic_message(panic))))
        };

        self.finish(job, outcome).await;
    }

    async fn finish(&self, mut job: Job, outcome: Result<(), DeliveryError>) {
        let mut state = self.state.lock().await;
        state.processing.remove(&job.id);

        match outcome {
            Ok(()) => {
                info!(job_id = %job.id, kind = %job.kind, "Notification delivered");
                self.metrics.record_success();
                state.completed.record(job, Utc::now());
            }
            Err(err) => match self.policy.record_failure(&mut job, err.to_string()) {
                RetryDecision::Requeue => {
                    warn!(
                        job_id = %job.id,
                        retry_count = job.retry_count,
                        max_retries = job.max_retries,
                        error = %err,
                        "Delivery failed, will retry"
                    );
                    self.metrics.record_retry();
                    state.pending.push_front(job);
                }
                RetryDecision::Exhausted => {
                    error!(
                        job_id = %job.id,
                        kind = %job.kind,
                        retry_count = job.retry_count,
                        error = %err,
                        "Delivery failed permanently"
                    );
                    self.metrics.record_failure();
                    state.failed.record(job);
                }
            },
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::job::{EnqueueOptions, JobState, NotificationKind};
    use crate::mock::{FailureMode, MockTransport};
    use serde_json::json;

    fn config() -> QueueConfig {
        QueueConfig::default().with_retry_delay(Duration::ZERO)
    }

    async fn enqueue_one(queue: &NotificationQueue) -> JobId {
        queue
            .enqueue(
                NotificationKind::PasswordReset,
                "user@example.org",
                json!({"token": "abc"}),
                EnqueueOptions::default(),
            )
            .await
    }

    #[tokio::test]
    async fn test_successful_delivery_lands_in_completed() {
        let mock = Arc::new(MockTransport::new());
        let queue = NotificationQueue::new(config(), mock.clone()).unwrap();
        let id = enqueue_one(&queue).await;

        assert_eq!(queue.tick().await, vec![id]);
        queue.wait_idle().await;

        assert!(matches!(queue.status(id).await, JobState::Completed { .. }));
        assert_eq!(mock.delivered(), vec![id]);
        assert_eq!(queue.stats().await.total_processed, 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_goes_back_to_front() {
        let mock = Arc::new(MockTransport::failing(FailureMode::FirstAttempts(1)));
        let queue = NotificationQueue::new(config(), mock.clone()).unwrap();
        let id = enqueue_one(&queue).await;

        queue.tick().await;
        queue.wait_idle().await;

        match queue.status(id).await {
            JobState::Pending { job } => {
                assert_eq!(job.retry_count, 1);
                assert!(job.last_attempt.is_some());
                assert!(job.error.as_deref().unwrap().contains("attempt 1"));
            }
            other => panic!("expected pending retry, got {other:?}"),
        }

        queue.tick().await;
        queue.wait_idle().await;
        assert!(matches!(queue.status(id).await, JobState::Completed { .. }));
        assert_eq!(queue.stats().await.total_retried, 1);
    }

    #[tokio::test]
    async fn test_retry_waits_for_delay() {
        let mock = Arc::new(MockTransport::failing(FailureMode::Always));
        let config = QueueConfig::default().with_retry_delay(Duration::from_secs(300));
        let queue = NotificationQueue::new(config, mock.clone()).unwrap();
        let id = enqueue_one(&queue).await;

        queue.tick().await;
        queue.wait_idle().await;

        assert!(queue.tick().await.is_empty());
        assert_eq!(mock.attempts_for(id), 1);
        assert_eq!(queue.stats().await.retrying, 1);
    }

    #[tokio::test]
    async fn test_panicking_transport_releases_slot() {
        let mock = Arc::new(MockTransport::failing(FailureMode::Panic));
        let queue =
            NotificationQueue::new(config().with_max_retries(0), mock.clone()).unwrap();
        let id = enqueue_one(&queue).await;

        queue.tick().await;
        queue.wait_idle().await;

        match queue.status(id).await {
            JobState::Failed { job } => {
                assert!(job.error.unwrap().starts_with("Transport panicked"));
            }
            other => panic!("expected failed, got {other:?}"),
        }
        assert_eq!(queue.stats().await.processing, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let mock = Arc::new(MockTransport::new().with_latency(Duration::from_secs(60)));
        let config = config()
            .with_max_retries(0)
            .with_attempt_timeout(Duration::from_secs(5));
        let queue = NotificationQueue::new(config, mock.clone()).unwrap();
        let id = enqueue_one(&queue).await;

        queue.tick().await;
        queue.wait_idle().await;

        match queue.status(id).await {
            JobState::Failed { job } => {
                assert_eq!(job.error.as_deref(), Some("Delivery timed out after 5s"));
            }
            other => panic!("expected failed, got {other:?}"),
        }
        assert!(mock.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_dispatches_on_interval() {
        let mock = Arc::new(MockTransport::new());
        let config = config().with_processing_interval(Duration::from_secs(30));
        let queue = NotificationQueue::new(config, mock.clone()).unwrap();
        let id = enqueue_one(&queue).await;

        queue.start().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(mock.attempts().is_empty());

        tokio::time::sleep(Duration::from_secs(25)).await;
        queue.wait_idle().await;
        assert_eq!(mock.delivered(), vec![id]);

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_and_stops_ticks() {
        let mock = Arc::new(MockTransport::gated());
        let queue = NotificationQueue::new(config(), mock.clone()).unwrap();
        let first = enqueue_one(&queue).await;
        queue.tick().await;
        let second = enqueue_one(&queue).await;

        let releaser = {
            let mock = mock.clone();
            tokio::spawn(async move {
                while mock.in_flight() == 0 {
                    tokio::task::yield_now().await;
                }
                mock.release(1);
            })
        };

        queue.shutdown().await;
        releaser.await.unwrap();

        assert!(matches!(queue.status(first).await, JobState::Completed { .. }));
        assert!(queue.tick().await.is_empty());
        assert!(matches!(queue.status(second).await, JobState::Pending { .. }));
    }
}
