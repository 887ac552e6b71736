//! Pending store: ordered jobs awaiting dispatch
//!
//! Position in the store is the dispatch order. Ordinary enqueues use
//! [`PendingStore::insert_by_priority`]; retries, resurrections and bulk
//! submissions go to the front regardless of priority.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::job::{Job, JobId};
use crate::retry::RetryPolicy;

#[derive(Debug, Default)]
pub struct PendingStore {
    jobs: VecDeque<Job>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Insert ahead of the first job whose rank is greater than or equal to
    /// the new job's rank, or append if there is none.
    ///
    /// Within one priority tier this makes the newest job go first.
    pub fn insert_by_priority(&mut self, job: Job) {
        let rank = job.priority.rank();
        match self.jobs.iter().position(|j| j.priority.rank() >= rank) {
            Some(index) => self.jobs.insert(index, job),
            None => self.jobs.push_back(job),
        }
    }

    pub fn push_front(&mut self, job: Job) {
        self.jobs.push_front(job);
    }

    /// Place `batch` ahead of everything already queued, keeping the batch's
    /// own order.
    pub fn prepend_batch(&mut self, batch: Vec<Job>) {
        for job in batch.into_iter().rev() {
            self.jobs.push_front(job);
        }
    }

    /// Remove and return up to `max` ready jobs, scanning front to back.
    ///
    /// Jobs that are not ready are skipped, not a stopping point, and keep
    /// their relative order.
    pub fn dequeue_ready(&mut self, max: usize, now: DateTime<Utc>, policy: &RetryPolicy) -> Vec<Job> {
        let mut ready = Vec::new();
        if max == 0 {
            return ready;
        }

        let mut kept = VecDeque::with_capacity(self.jobs.len());
        while let Some(job) = self.jobs.pop_front() {
            if ready.len() < max && policy.is_ready(&job, now) {
                ready.push(job);
            } else {
                kept.push_back(job);
            }
        }
        self.jobs = kept;
        ready
    }

    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        let index = self.jobs.iter().position(|j| j.id == id)?;
        self.jobs.remove(index)
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.get(id).is_some()
    }

    /// Jobs waiting after at least one failed attempt.
    pub fn retrying(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_retrying()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|j| j.id).collect()
    }
}
