//! Fixed-delay retry policy
//!
//! Backoff is enforced lazily: a failed job goes straight back into the
//! pending store and [`RetryPolicy::is_ready`] keeps it there until
//! `retry_delay` has elapsed since its last attempt.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::job::Job;

/// What to do with a job whose delivery just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put it back at the front of the pending store
    Requeue,
    /// Retry budget spent; move it to the failed ledger
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    retry_delay: chrono::Duration,
}

impl RetryPolicy {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            retry_delay: chrono::Duration::from_std(retry_delay)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Readiness predicate used by the pending store scan.
    pub fn is_ready(&self, job: &Job, now: DateTime<Utc>) -> bool {
        if matches!(job.scheduled_at, Some(at) if at > now) {
            return false;
        }
        if job.retry_count == 0 {
            return true;
        }
        match job.last_attempt {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.retry_delay,
        }
    }

    /// Record a failed attempt on `job` and decide its fate.
    ///
    /// `retry_count` never exceeds `max_retries`: a job that fails while
    /// already at its ceiling is exhausted without another increment.
    /// Its last attempt therefore runs from the pending store with
    /// `retry_count == max_retries`, so `max_retries = n` buys n + 1 attempts.
    pub fn record_failure(&self, job: &mut Job, error: String) -> RetryDecision {
        job.error = Some(error);
        if job.retry_count >= job.max_retries {
            RetryDecision::Exhausted
        } else {
            job.retry_count += 1;
            RetryDecision::Requeue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{NotificationKind, Priority};
    use serde_json::json;

    fn job(max_retries: u32) -> Job {
        Job::new(
            NotificationKind::EventReminder,
            "member@example.org",
            json!({}),
            Priority::Normal,
            max_retries,
        )
    }

    #[test]
    fn test_fresh_job_is_ready() {
        let policy = RetryPolicy::new(Duration::from_secs(300));
        assert!(policy.is_ready(&job(3), Utc::now()));
    }

    #[test]
    fn test_scheduled_job_waits_for_its_time() {
        let policy = RetryPolicy::new(Duration::ZERO);
        let now = Utc::now();
        let future = job(3).with_scheduled_at(now + chrono::Duration::minutes(5));
        let past = job(3).with_scheduled_at(now - chrono::Duration::minutes(5));
        assert!(!policy.is_ready(&future, now));
        assert!(policy.is_ready(&past, now));
    }

    #[test]
    fn test_retry_delay_is_fixed() {
        let policy = RetryPolicy::new(Duration::from_secs(60));
        let now = Utc::now();
        let mut j = job(3);
        j.retry_count = 2;
        j.last_attempt = Some(now - chrono::Duration::seconds(30));
        assert!(!policy.is_ready(&j, now));
        j.last_attempt = Some(now - chrono::Duration::seconds(60));
        assert!(policy.is_ready(&j, now));
    }

    #[test]
    fn test_retry_without_last_attempt_is_ready() {
        let policy = RetryPolicy::new(Duration::from_secs(60));
        let mut j = job(3);
        j.retry_count = 1;
        assert!(policy.is_ready(&j, Utc::now()));
    }

    #[test]
    fn test_record_failure_stops_at_ceiling() {
        let policy = RetryPolicy::new(Duration::ZERO);
        let mut j = job(2);

        assert_eq!(policy.record_failure(&mut j, "smtp 451".into()), RetryDecision::Requeue);
        assert_eq!(j.retry_count, 1);
        assert_eq!(policy.record_failure(&mut j, "smtp 451".into()), RetryDecision::Requeue);
        assert_eq!(j.retry_count, 2);
        assert_eq!(
            policy.record_failure(&mut j, "smtp 550".into()),
            RetryDecision::Exhausted
        );
        assert_eq!(j.retry_count, 2);
        assert_eq!(j.error.as_deref(), Some("smtp 550"));
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(Duration::ZERO);
        let mut j = job(0);
        assert_eq!(policy.record_failure(&mut j, "boom".into()), RetryDecision::Exhausted);
        assert_eq!(j.retry_count, 0);
    }
}
