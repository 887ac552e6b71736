//! # Courier Queue
//!
//! In-process outbound notification queue.
//!
//! Features:
//! - Strict priority tiers (urgent, high, normal, low)
//! - Bounded concurrent deliveries through a pluggable `Transport`
//! - Fixed-delay retries with a per-job ceiling
//! - Scheduled, bulk and promoted jobs
//! - Status lookup, ledger maintenance, stats and a text report
//!
//! ```no_run
//! use std::sync::Arc;
//! use courier_queue::{EnqueueOptions, LoggingTransport, NotificationKind, NotificationQueue, Priority, QueueConfig};
//!
//! # async fn run() -> Result<(), courier_queue::ConfigError> {
//! let queue = NotificationQueue::new(QueueConfig::from_env(), Arc::new(LoggingTransport))?;
//! queue.start().await;
//!
//! queue
//!     .enqueue(
//!         NotificationKind::PasswordReset,
//!         "ada@example.org",
//!         serde_json::json!({ "token": "..." }),
//!         EnqueueOptions::priority(Priority::Urgent),
//!     )
//!     .await;
//!
//! queue.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod job;
pub mod ledger;
pub mod metrics;
pub mod mock;
pub mod pending;
pub mod queue;
pub mod report;
pub mod retry;
pub mod ticker;
pub mod transport;
pub mod worker;

pub use config::{ConfigError, QueueConfig};
pub use job::{BulkJob, EnqueueOptions, Job, JobId, JobState, NotificationKind, Priority};
pub use metrics::QueueStats;
pub use mock::{FailureMode, MockTransport};
pub use queue::NotificationQueue;
pub use report::ReportThresholds;
pub use transport::{DeliveryError, LoggingTransport, Transport};
