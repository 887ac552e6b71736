//! Cancellable fixed-interval ticker

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Yields once per period until its token is cancelled.
///
/// The first tick fires one full period after creation, matching a plain
/// repeating timer. Ticks missed while the owner was busy are skipped rather
/// than replayed in a burst.
#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
    token: CancellationToken,
}

impl Ticker {
    pub fn new(period: Duration, token: CancellationToken) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, token }
    }

    /// Wait for the next tick. Returns `false` once cancelled.
    pub async fn tick(&mut self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = self.interval.tick() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let token = CancellationToken::new();
        let mut ticker = Ticker::new(Duration::from_secs(30), token);
        let start = Instant::now();

        assert!(ticker.tick().await);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert!(ticker.tick().await);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticking() {
        let token = CancellationToken::new();
        let mut ticker = Ticker::new(Duration::from_secs(30), token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            token.cancel();
        });

        assert!(!ticker.tick().await);
        assert!(!ticker.tick().await);
        canceller.await.unwrap();
    }
}
