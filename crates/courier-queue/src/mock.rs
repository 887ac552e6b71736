//! Mock transport for testing and simulations

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::job::{Job, JobId};
use crate::transport::{DeliveryError, Transport};

/// How the mock decides whether an attempt fails
#[derive(Debug, Clone, Default)]
pub enum FailureMode {
    #[default]
    Never,
    Always,
    /// Fail the first `n` attempts of every job, then succeed
    FirstAttempts(u32),
    /// Fail every attempt addressed to one of these recipients
    Recipients(HashSet<String>),
    /// Panic inside the delivery future
    Panic,
}

/// A transport that records every attempt and fails on demand.
///
/// With [`MockTransport::gated`] each attempt parks until [`MockTransport::release`]
/// hands it a permit, which lets tests hold deliveries in flight.
#[derive(Debug, Default)]
pub struct MockTransport {
    mode: FailureMode,
    latency: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    attempts: Mutex<Vec<JobId>>,
    delivered: Mutex<Vec<JobId>>,
    per_job: Mutex<HashMap<JobId, u32>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    /// Mock that delivers everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mode: FailureMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Mock whose deliveries block until released
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Let `n` parked (or future) deliveries proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Every attempt, in the order the transport saw them.
    pub fn attempts(&self) -> Vec<JobId> {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Successful deliveries, in completion order.
    pub fn delivered(&self) -> Vec<JobId> {
        self.delivered.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn attempts_for(&self, id: JobId) -> u32 {
        self.per_job
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous deliveries observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, job: &Job, attempt: u32) -> Option<DeliveryError> {
        match &self.mode {
            FailureMode::Never => None,
            FailureMode::Always => Some(DeliveryError::Unavailable("mock outage".to_string())),
            FailureMode::FirstAttempts(n) if attempt <= *n => Some(DeliveryError::Unavailable(
                format!("mock failure on attempt {attempt}"),
            )),
            FailureMode::FirstAttempts(_) => None,
            FailureMode::Recipients(blocked) if blocked.contains(&job.recipient) => {
                Some(DeliveryError::Rejected(job.recipient.clone()))
            }
            FailureMode::Recipients(_) => None,
            FailureMode::Panic => panic!("mock transport panic for {}", job.id),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn deliver(&self, job: &Job) -> Result<(), DeliveryError> {
        let attempt = {
            let mut per_job = self.per_job.lock().unwrap_or_else(|e| e.into_inner());
            let count = per_job.entry(job.id).or_insert(0);
            *count += 1;
            *count
        };
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job.id);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(DeliveryError::Unavailable("gate closed".to_string())),
            }
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.should_fail(job, attempt) {
            return Err(err);
        }

        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job.id);
        Ok(())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{NotificationKind, Priority};
    use serde_json::json;

    fn job(recipient: &str) -> Job {
        Job::new(NotificationKind::DirectMessage, recipient, json!({}), Priority::Normal, 3)
    }

    #[tokio::test]
    async fn test_first_attempts_then_success() {
        let mock = MockTransport::failing(FailureMode::FirstAttempts(2));
        let j = job("a@example.org");

        assert!(mock.deliver(&j).await.is_err());
        assert!(mock.deliver(&j).await.is_err());
        assert!(mock.deliver(&j).await.is_ok());
        assert_eq!(mock.attempts_for(j.id), 3);
        assert_eq!(mock.delivered(), vec![j.id]);
    }

    #[tokio::test]
    async fn test_recipient_blocklist() {
        let blocked = HashSet::from(["bounce@example.org".to_string()]);
        let mock = MockTransport::failing(FailureMode::Recipients(blocked));

        assert_eq!(
            mock.deliver(&job("bounce@example.org")).await,
            Err(DeliveryError::Rejected("bounce@example.org".to_string()))
        );
        assert!(mock.deliver(&job("ok@example.org")).await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_holds_until_released() {
        let mock = Arc::new(MockTransport::gated());
        let j = job("held@example.org");

        let task = {
            let mock = mock.clone();
            let j = j.clone();
            tokio::spawn(async move { mock.deliver(&j).await })
        };

        tokio::task::yield_now().await;
        while mock.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(mock.delivered().is_empty());

        mock.release(1);
        assert!(task.await.unwrap().is_ok());
        assert_eq!(mock.in_flight(), 0);
        assert_eq!(mock.peak_in_flight(), 1);
    }
}
