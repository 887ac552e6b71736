//! Simulate command - push jobs through a flaky transport
//!
//! Usage:
//! ```bash
//! courier simulate --jobs 500 --failure-rate 0.1 --max-concurrent 8
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::Args;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use courier_queue::{
    BulkJob, DeliveryError, EnqueueOptions, Job, JobId, NotificationKind, NotificationQueue,
    Priority, QueueConfig, Transport,
};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Arguments for the simulate command
#[derive(Args)]
pub struct SimulateArgs {
    /// Number of notifications to enqueue
    #[arg(long, default_value_t = 100)]
    pub jobs: usize,

    /// Probability (0.0-1.0) that a delivery attempt fails
    #[arg(long, default_value_t = 0.1)]
    pub failure_rate: f64,

    /// Simulated delivery latency
    #[arg(long, default_value_t = 20)]
    pub latency_ms: u64,

    #[arg(long, default_value_t = 5)]
    pub max_concurrent: usize,

    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Minimum wait before a failed job is retried
    #[arg(long, default_value_t = 0)]
    pub retry_delay_ms: u64,

    /// Dispatch tick period
    #[arg(long, default_value_t = 50)]
    pub tick_ms: u64,

    /// Submit everything as one bulk batch instead of individual enqueues
    #[arg(long)]
    pub bulk: bool,

    /// Give up if the queue has not drained after this long
    #[arg(long, default_value_t = 120)]
    pub max_wait_secs: u64,

    /// Print stats as JSON instead of the text report
    #[arg(long)]
    pub json: bool,
}

/// Transport that sleeps and then fails at random
struct FlakyTransport {
    failure_rate: f64,
    latency: Duration,
}

#[async_trait]
impl Transport for FlakyTransport {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn deliver(&self, job: &Job) -> Result<(), DeliveryError> {
        tokio::time::sleep(self.latency).await;
        if rand::random::<f64>() < self.failure_rate {
            return Err(DeliveryError::Unavailable(format!(
                "simulated outage delivering to {}",
                job.recipient
            )));
        }
        Ok(())
    }
}

/// Run the simulate command
pub async fn run(args: SimulateArgs, verbosity: u8) -> Result<()> {
    if !(0.0..=1.0).contains(&args.failure_rate) {
        bail!("--failure-rate must be between 0.0 and 1.0");
    }

    let config = QueueConfig::default()
        .with_max_concurrent_jobs(args.max_concurrent)
        .with_batch_size(args.batch_size)
        .with_max_retries(args.max_retries)
        .with_retry_delay(Duration::from_millis(args.retry_delay_ms))
        .with_processing_interval(Duration::from_millis(args.tick_ms));
    let transport = Arc::new(FlakyTransport {
        failure_rate: args.failure_rate,
        latency: Duration::from_millis(args.latency_ms),
    });
    let queue = NotificationQueue::new(config, transport)?;

    let batch = random_batch(args.jobs);
    let kinds: Vec<NotificationKind> = batch.iter().map(|b| b.kind).collect();
    let ids = if args.bulk {
        queue.enqueue_bulk(batch).await
    } else {
        let mut ids = Vec::with_capacity(batch.len());
        for b in batch {
            let options = EnqueueOptions {
                priority: b.priority,
                ..Default::default()
            };
            ids.push(queue.enqueue(b.kind, b.recipient, b.payload, options).await);
        }
        ids
    };

    tracing::info!(jobs = ids.len(), bulk = args.bulk, "Starting simulation");
    let started = Instant::now();
    queue.start().await;
    let deadline = Duration::from_secs(args.max_wait_secs);
    while !queue.is_drained().await {
        if started.elapsed() > deadline {
            queue.shutdown().await;
            bail!("queue did not drain within {}s", args.max_wait_secs);
        }
        tokio::time::sleep(Duration::from_millis(args.tick_ms)).await;
    }
    queue.shutdown().await;

    let stats = queue.stats().await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", queue.report().await);
    println!("{}", outcome_table(&queue, &ids, &kinds).await);
    println!(
        "{} {} jobs drained in {:.2}s",
        "✓".green().bold(),
        ids.len(),
        started.elapsed().as_secs_f64()
    );
    if verbosity > 0 {
        println!();
        print!("{}", stats.to_prometheus());
    }
    Ok(())
}

fn random_batch(count: usize) -> Vec<BulkJob> {
    const PRIORITIES: [Priority; 4] = [Priority::Urgent, Priority::High, Priority::Normal, Priority::Low];
    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            let kind = NotificationKind::ALL[rng.random_range(0..NotificationKind::ALL.len())];
            let priority = PRIORITIES[rng.random_range(0..PRIORITIES.len())];
            BulkJob::new(
                kind,
                format!("member{i}@example.org"),
                serde_json::json!({ "seq": i }),
            )
            .with_priority(priority)
        })
        .collect()
}

async fn outcome_table(queue: &NotificationQueue, ids: &[JobId], kinds: &[NotificationKind]) -> Table {
    let mut counts: BTreeMap<&'static str, (usize, usize)> = BTreeMap::new();
    for (id, kind) in ids.iter().zip(kinds) {
        let entry = counts.entry(kind.as_str()).or_default();
        match queue.status(*id).await.label() {
            "completed" => entry.0 += 1,
            "failed" => entry.1 += 1,
            _ => {}
        }
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Kind", "Delivered", "Failed"]);
    for (kind, (delivered, failed)) in counts {
        table.add_row(vec![kind.to_string(), delivered.to_string(), failed.to_string()]);
    }
    table
}
