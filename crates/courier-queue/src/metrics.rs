//! Running counters and queue statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lifetime counters for one queue instance.
#[derive(Debug)]
pub struct QueueMetrics {
    /// Jobs delivered successfully
    pub total_processed: AtomicU64,
    /// Jobs that ended in the failed ledger
    pub total_failed: AtomicU64,
    /// Failed attempts that were put back for another try
    pub total_retried: AtomicU64,
    started_at: Instant,
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self {
            total_processed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_retried: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_success(&self) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.total_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.total_processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.total_retried.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Share of terminal jobs that were delivered, 1.0 when nothing finished yet
    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        let total = processed + self.failed();
        if total == 0 {
            1.0
        } else {
            processed as f64 / total as f64
        }
    }
}

/// Completed jobs per minute over `elapsed`; zero before any time has passed.
pub fn throughput_per_minute(processed: u64, elapsed: Duration) -> f64 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        0.0
    } else {
        processed as f64 / minutes
    }
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Pending jobs that have never failed
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Pending jobs waiting out a retry delay
    pub retrying: usize,
    /// Completed jobs per minute of uptime
    pub throughput: f64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub success_rate: f64,
    pub uptime_secs: u64,
}

impl QueueStats {
    /// Export in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        let gauges: [(&str, &str, f64); 6] = [
            ("courier_jobs_pending", "Jobs waiting for their first attempt", self.pending as f64),
            ("courier_jobs_processing", "Jobs currently in flight", self.processing as f64),
            ("courier_jobs_retrying", "Jobs waiting out a retry delay", self.retrying as f64),
            ("courier_jobs_completed", "Completed jobs still in the ledger", self.completed as f64),
            ("courier_jobs_failed", "Failed jobs still in the ledger", self.failed as f64),
            ("courier_throughput_per_minute", "Completed jobs per minute of uptime", self.throughput),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} gauge\n"));
            output.push_str(&format!("{name} {value}\n"));
        }

        let counters: [(&str, &str, u64); 3] = [
            ("courier_processed_total", "Jobs delivered successfully", self.total_processed),
            ("courier_failed_total", "Jobs that exhausted their retries", self.total_failed),
            ("courier_retried_total", "Failed attempts scheduled for retry", self.total_retried),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {value}\n"));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = QueueMetrics::new();
        metrics.record_success();
        metrics.record_success();
        metrics.record_success();
        metrics.record_failure();
        metrics.record_retry();

        assert_eq!(metrics.processed(), 3);
        assert_eq!(metrics.failed(), 1);
        assert_eq!(metrics.retried(), 1);
        assert!((metrics.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_without_terminal_jobs() {
        assert_eq!(QueueMetrics::new().success_rate(), 1.0);
    }

    #[test]
    fn test_throughput() {
        assert_eq!(throughput_per_minute(10, Duration::ZERO), 0.0);
        assert!((throughput_per_minute(30, Duration::from_secs(120)) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_prometheus_export() {
        let stats = QueueStats {
            pending: 4,
            processing: 2,
            completed: 10,
            failed: 1,
            retrying: 3,
            throughput: 2.5,
            total_processed: 10,
            total_failed: 1,
            total_retried: 5,
            success_rate: 10.0 / 11.0,
            uptime_secs: 240,
        };
        let text = stats.to_prometheus();
        assert!(text.contains("# TYPE courier_jobs_pending gauge"));
        assert!(text.contains("courier_jobs_pending 4\n"));
        assert!(text.contains("courier_throughput_per_minute 2.5\n"));
        assert!(text.contains("courier_retried_total 5\n"));
    }
}
