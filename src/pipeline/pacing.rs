//! Send pacing for one run.
//!
//! Sends are spaced by a fixed minimum interval. After the upstream rejects a
//! send with a rate limit, the next send waits for the larger of the
//! upstream's retry_after and 2^hits seconds (capped at 64s).

use std::time::Duration;
use tokio::time::Instant;

/// Per-run pacing state. Not shared between runs.
#[derive(Debug)]
pub struct SendPacer {
    interval: Duration,
    last_send: Option<Instant>,
    backoff_until: Option<Instant>,
    consecutive_hits: u32,
}

impl SendPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_send: None,
            backoff_until: None,
            consecutive_hits: 0,
        }
    }

    /// Earliest instant the next send may start
    pub fn ready_at(&self) -> Option<Instant> {
        let paced = self.last_send.map(|t| t + self.interval);
        match (paced, self.backoff_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// How long a send started now would have to wait
    pub fn delay(&self) -> Duration {
        self.ready_at()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub async fn wait(&self) {
        if let Some(at) = self.ready_at() {
            tokio::time::sleep_until(at).await;
        }
    }

    /// Mark a send attempt as started
    pub fn record_attempt(&mut self) {
        self.last_send = Some(Instant::now());
    }

    /// A send went through; clears any backoff
    pub fn record_success(&mut self) {
        self.consecutive_hits = 0;
        self.backoff_until = None;
    }

    pub fn record_rate_limit(&mut self, retry_after: Duration) {
        self.consecutive_hits += 1;

        let exp_backoff = Duration::from_secs(2u64.pow(self.consecutive_hits.min(6)));
        let delay = retry_after.max(exp_backoff);
        self.backoff_until = Some(Instant::now() + delay);

        tracing::warn!(
            retry_after_secs = delay.as_secs(),
            consecutive_hits = self.consecutive_hits,
            "Send rate limited, backing off"
        );
    }

    pub fn consecutive_hits(&self) -> u32 {
        self.consecutive_hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_send_is_immediate() {
        let pacer = SendPacer::new(Duration::from_secs(2));
        assert_eq!(pacer.delay(), Duration::ZERO);
        let start = Instant::now();
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_spaced() {
        let mut pacer = SendPacer::new(Duration::from_secs(2));
        pacer.record_attempt();
        pacer.record_success();
        assert_eq!(pacer.delay(), Duration::from_secs(2));

        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(pacer.delay(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_capped() {
        let mut pacer = SendPacer::new(Duration::from_secs(2));
        pacer.record_rate_limit(Duration::ZERO);
        assert_eq!(pacer.delay(), Duration::from_secs(2));
        pacer.record_rate_limit(Duration::ZERO);
        assert_eq!(pacer.delay(), Duration::from_secs(4));
        for _ in 0..10 {
            pacer.record_rate_limit(Duration::ZERO);
        }
        assert_eq!(pacer.delay(), Duration::from_secs(64));
        assert_eq!(pacer.consecutive_hits(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_wins_when_larger() {
        let mut pacer = SendPacer::new(Duration::from_secs(2));
        pacer.record_rate_limit(Duration::from_secs(30));
        assert_eq!(pacer.delay(), Duration::from_secs(30));

        pacer.record_success();
        assert_eq!(pacer.consecutive_hits(), 0);
        assert_eq!(pacer.delay(), Duration::ZERO);
    }
}
