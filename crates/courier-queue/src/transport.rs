//! Delivery transport trait

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::job::Job;

/// Why a delivery attempt failed. Every variant is retried until the job's
/// ceiling is reached; the queue only keeps the rendered message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Recipient rejected: {0}")]
    Rejected(String),
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport panicked: {0}")]
    Panicked(String),
}

/// Something that can actually get a notification to its recipient
/// (SMTP relay, chat webhook, ...).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name, used in logs
    fn name(&self) -> &str;

    /// Deliver a single job. `Ok` means delivered.
    async fn deliver(&self, job: &Job) -> Result<(), DeliveryError>;
}

/// Transport that only writes a log line per delivery. Useful as a dry-run
/// sink while wiring the queue into a new environment.
#[derive(Debug, Default, Clone)]
pub struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, job: &Job) -> Result<(), DeliveryError> {
        info!(
            job_id = %job.id,
            kind = %job.kind,
            recipient = %job.recipient,
            "Delivered notification (dry run)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{NotificationKind, Priority};
    use serde_json::json;

    #[tokio::test]
    async fn test_logging_transport_always_succeeds() {
        let job = Job::new(NotificationKind::Welcome, "new@example.org", json!({}), Priority::Normal, 3);
        assert!(LoggingTransport.deliver(&job).await.is_ok());
        assert_eq!(LoggingTransport.name(), "log");
    }

    #[test]
    fn test_delivery_error_messages() {
        assert_eq!(
            DeliveryError::Rejected("mailbox full".into()).to_string(),
            "Recipient rejected: mailbox full"
        );
        assert_eq!(
            DeliveryError::Timeout(Duration::from_secs(2)).to_string(),
            "Delivery timed out after 2s"
        );
    }
}
