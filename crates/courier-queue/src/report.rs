//! Human-readable queue report

use std::fmt::Write;

use crate::metrics::QueueStats;

/// Limits that trigger an advisory line in the report
#[derive(Debug, Clone, Copy)]
pub struct ReportThresholds {
    /// Completed jobs per minute
    pub min_throughput: f64,
    pub min_success_rate: f64,
    pub max_pending: usize,
}

impl Default for ReportThresholds {
    fn default() -> Self {
        Self {
            min_throughput: 1.0,
            min_success_rate: 0.95,
            max_pending: 100,
        }
    }
}

/// Threshold checks on a stats snapshot. Observational only.
pub fn advisories(stats: &QueueStats, thresholds: &ReportThresholds) -> Vec<String> {
    let mut notes = Vec::new();

    // Throughput is meaningless while there is nothing to send.
    let has_backlog = stats.pending + stats.retrying + stats.processing > 0;
    if has_backlog && stats.throughput < thresholds.min_throughput {
        notes.push(format!(
            "Low throughput: {:.2} jobs/min is below {:.2}; consider raising max_concurrent_jobs or batch_size",
            stats.throughput, thresholds.min_throughput
        ));
    }
    if stats.total_processed + stats.total_failed > 0 && stats.success_rate < thresholds.min_success_rate {
        notes.push(format!(
            "Low success rate: {:.1}% is below {:.1}%; check the transport and recipient data",
            stats.success_rate * 100.0,
            thresholds.min_success_rate * 100.0
        ));
    }
    if stats.pending > thresholds.max_pending {
        notes.push(format!(
            "Backlog: {} pending jobs exceeds {}; dispatch is not keeping up",
            stats.pending, thresholds.max_pending
        ));
    }
    notes
}

pub fn render(stats: &QueueStats, thresholds: &ReportThresholds) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "Notification queue report");
    let _ = writeln!(out, "=========================");
    let _ = writeln!(out, "Uptime:        {}s", stats.uptime_secs);
    let _ = writeln!(out, "Pending:       {}", stats.pending);
    let _ = writeln!(out, "Retrying:      {}", stats.retrying);
    let _ = writeln!(out, "Processing:    {}", stats.processing);
    let _ = writeln!(out, "Completed:     {}", stats.completed);
    let _ = writeln!(out, "Failed:        {}", stats.failed);
    let _ = writeln!(out, "Delivered:     {} total", stats.total_processed);
    let _ = writeln!(out, "Given up:      {} total", stats.total_failed);
    let _ = writeln!(out, "Retries:       {} total", stats.total_retried);
    let _ = writeln!(out, "Success rate:  {:.1}%", stats.success_rate * 100.0);
    let _ = writeln!(out, "Throughput:    {:.2} jobs/min", stats.throughput);

    let notes = advisories(stats, thresholds);
    let _ = writeln!(out);
    if notes.is_empty() {
        let _ = writeln!(out, "No advisories.");
    } else {
        let _ = writeln!(out, "Advisories:");
        for note in notes {
            let _ = writeln!(out, "  - {note}");
        }
    }
    out
}
