//! Terminal-state ledgers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::job::{Job, JobId};

#[derive(Debug, Clone, Serialize)]
pub struct CompletedEntry {
    pub job: Job,
    pub completed_at: DateTime<Utc>,
}

/// Successfully delivered jobs, kept until pruned.
#[derive(Debug, Default)]
pub struct CompletedLedger {
    entries: HashMap<JobId, CompletedEntry>,
}

impl CompletedLedger {
    pub fn record(&mut self, job: Job, completed_at: DateTime<Utc>) {
        self.entries.insert(job.id, CompletedEntry { job, completed_at });
    }

    pub fn get(&self, id: JobId) -> Option<&CompletedEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries completed at or before `cutoff`.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.completed_at > cutoff);
        before - self.entries.len()
    }
}

/// Jobs that exhausted their retries.
#[derive(Debug, Default)]
pub struct FailedLedger {
    entries: HashMap<JobId, Job>,
}

impl FailedLedger {
    pub fn record(&mut self, job: Job) {
        self.entries.insert(job.id, job);
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return jobs whose last attempt is at or before `cutoff`,
    /// oldest attempt first. A job with no recorded attempt always qualifies.
    pub fn take_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<Job> {
        let ids: Vec<JobId> = self
            .entries
            .values()
            .filter(|job| job.last_attempt.map_or(true, |at| at <= cutoff))
            .map(|job| job.id)
            .collect();

        let mut taken: Vec<Job> = ids
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect();
        taken.sort_by_key(|job| job.last_attempt);
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{NotificationKind, Priority};
    use chrono::Duration;
    use serde_json::json;

    fn job() -> Job {
        Job::new(NotificationKind::Newsletter, "reader@example.org", json!({}), Priority::Low, 1)
    }

    #[test]
    fn test_prune_completed_by_age() {
        let now = Utc::now();
        let mut ledger = CompletedLedger::default();
        let old = job();
        let fresh = job();
        let fresh_id = fresh.id;
        ledger.record(old, now - Duration::hours(2));
        ledger.record(fresh, now);

        assert_eq!(ledger.prune(now - Duration::hours(1)), 1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get(fresh_id).is_some());
    }

    #[test]
    fn test_take_older_than_orders_by_last_attempt() {
        let now = Utc::now();
        let mut ledger = FailedLedger::default();

        let mut newer = job();
        newer.last_attempt = Some(now - Duration::minutes(10));
        let mut older = job();
        older.last_attempt = Some(now - Duration::minutes(50));
        let mut recent = job();
        recent.last_attempt = Some(now);
        let (newer_id, older_id, recent_id) = (newer.id, older.id, recent.id);

        ledger.record(newer);
        ledger.record(recent);
        ledger.record(older);

        let taken = ledger.take_older_than(now - Duration::minutes(5));
        assert_eq!(taken.iter().map(|j| j.id).collect::<Vec<_>>(), vec![older_id, newer_id]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get(recent_id).is_some());
    }
}
