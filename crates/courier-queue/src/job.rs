//! Job definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Job Identifier
pub type JobId = Uuid;

/// Dispatch priority. Variants are declared in dispatch order, so the derived
/// `Ord` matches [`Priority::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Numeric rank; lower ranks are dispatched first.
    pub fn rank(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification categories produced by the community site.
///
/// The queue never branches on the kind; it is carried through to the
/// transport so it can pick a template or channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    EmailVerification,
    PasswordReset,
    EventReminder,
    EventUpdate,
    Mention,
    DirectMessage,
    ModerationNotice,
    Newsletter,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 9] = [
        Self::Welcome,
        Self::EmailVerification,
        Self::PasswordReset,
        Self::EventReminder,
        Self::EventUpdate,
        Self::Mention,
        Self::DirectMessage,
        Self::ModerationNotice,
        Self::Newsletter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
            Self::EventReminder => "event_reminder",
            Self::EventUpdate => "event_update",
            Self::Mention => "mention",
            Self::DirectMessage => "direct_message",
            Self::ModerationNotice => "moderation_notice",
            Self::Newsletter => "newsletter",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: NotificationKind,
    pub priority: Priority,
    pub recipient: String,
    /// Passed to the transport untouched
    pub payload: serde_json::Value,
    /// Not eligible for dispatch before this instant
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_retries: u32,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Last failure message
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        kind: NotificationKind,
        recipient: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
        max_retries: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            priority,
            recipient: recipient.into(),
            payload,
            scheduled_at: None,
            max_retries,
            retry_count: 0,
            created_at: Utc::now(),
            last_attempt: None,
            error: None,
        }
    }

    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// True once a retry has been recorded against this job.
    pub fn is_retrying(&self) -> bool {
        self.retry_count > 0
    }
}

/// Per-call overrides for [`crate::NotificationQueue::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub priority: Option<Priority>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Falls back to the queue's configured ceiling
    pub max_retries: Option<u32>,
}

impl EnqueueOptions {
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}

/// One entry of a bulk submission. Bulk submissions cannot be scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkJob {
    pub kind: NotificationKind,
    pub recipient: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl BulkJob {
    pub fn new(kind: NotificationKind, recipient: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            recipient: recipient.into(),
            payload,
            priority: None,
            max_retries: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Where a job currently lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the pending store
    Pending { job: Job },
    /// Handed to the transport, outcome not yet known
    Processing,
    Completed { completed_at: DateTime<Utc> },
    /// Gave up after exhausting retries
    Failed { job: Job },
    NotFound,
}

impl JobState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Processing => "processing",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::NotFound => "not_found",
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_rank_matches_ordering() {
        let mut all = vec![Priority::Low, Priority::Urgent, Priority::Normal, Priority::High];
        all.sort();
        assert_eq!(
            all,
            vec![Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]
        );
        for pair in all.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new(
            NotificationKind::Welcome,
            "ada@example.org",
            json!({"name": "Ada"}),
            Priority::High,
            3,
        );
        assert!(!job.id.is_nil());
        assert_eq!(job.retry_count, 0);
        assert!(job.last_attempt.is_none());
        assert!(job.scheduled_at.is_none());
        assert!(!job.is_retrying());
    }

    #[test]
    fn test_job_state_serializes_with_status_tag() {
        let value = serde_json::to_value(JobState::Processing).unwrap();
        assert_eq!(value, json!({"status": "processing"}));
        assert_eq!(JobState::NotFound.label(), "not_found");
        assert!(!JobState::NotFound.is_found());
    }

    #[test]
    fn test_bulk_job_priority_is_optional_in_json() {
        let bulk: BulkJob = serde_json::from_value(json!({
            "kind": "newsletter",
            "recipient": "list@example.org",
            "payload": {}
        }))
        .unwrap();
        assert_eq!(bulk.kind, NotificationKind::Newsletter);
        assert!(bulk.priority.is_none());
    }
}
