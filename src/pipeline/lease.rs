//! Run lease held for the lifetime of one run or approval.
//!
//! The lease is renewed by a background heartbeat every third of its TTL, so
//! a run that outlives one TTL (slow sends, rate-limit pauses) keeps it. The
//! candidate loop also renews before every send and stops once renewal fails.
//! Dropping a [`RunLease`] stops the heartbeat and releases the row.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::Result;
use crate::id::generate_lease_holder;
use crate::storage::Store;

/// Wall clock anchored at the start of a run.
///
/// Every timestamp a run writes (lease expiry, stale cutoff, `sent_at`,
/// last-run stamp) comes from here, so a run started with an explicit time
/// stays consistent with itself.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    base_ms: i64,
    started: Instant,
}

impl RunClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            base_ms: now.timestamp_millis(),
            started: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.base_ms + self.started.elapsed().as_millis() as i64
    }
}

struct LeaseKey {
    store: Arc<dyn Store>,
    integration_id: String,
    holder: String,
    ttl_ms: i64,
    clock: RunClock,
}

impl LeaseKey {
    fn renew(&self) -> bool {
        match self
            .store
            .acquire_lease(&self.integration_id, &self.holder, self.ttl_ms, self.clock.now_ms())
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(integration_id = %self.integration_id, holder = %self.holder, "Run lease taken over");
                false
            }
            Err(e) => {
                tracing::warn!(integration_id = %self.integration_id, error = %e, "Run lease renewal failed");
                false
            }
        }
    }
}

pub struct RunLease {
    key: Arc<LeaseKey>,
    lost: Arc<AtomicBool>,
    heartbeat: Option<JoinHandle<()>>,
}

impl RunLease {
    /// Take the lease for `integration_id`, or `None` when someone else holds it
    pub fn acquire(
        store: Arc<dyn Store>,
        integration_id: &str,
        ttl: Duration,
        clock: RunClock,
    ) -> Result<Option<Self>> {
        let key = LeaseKey {
            store,
            integration_id: integration_id.to_string(),
            holder: generate_lease_holder(),
            ttl_ms: ttl.as_millis() as i64,
            clock,
        };
        if !key.store.acquire_lease(&key.integration_id, &key.holder, key.ttl_ms, clock.now_ms())? {
            return Ok(None);
        }

        let key = Arc::new(key);
        let lost = Arc::new(AtomicBool::new(false));
        let heartbeat = tokio::spawn(heartbeat(key.clone(), lost.clone(), heartbeat_period(ttl)));

        Ok(Some(Self {
            key,
            lost,
            heartbeat: Some(heartbeat),
        }))
    }

    pub fn holder(&self) -> &str {
        &self.key.holder
    }

    /// Extend the lease now. False once it has been lost; it is never regained.
    pub fn renew(&self) -> bool {
        if self.is_lost() {
            return false;
        }
        let renewed = self.key.renew();
        if !renewed {
            self.lost.store(true, Ordering::SeqCst);
        }
        renewed
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if let Err(e) = self.key.store.release_lease(&self.key.integration_id, &self.key.holder) {
            tracing::warn!(integration_id = %self.key.integration_id, error = %e, "Failed to release run lease");
        }
    }
}

fn heartbeat_period(ttl: Duration) -> Duration {
    (ttl / 3).max(Duration::from_millis(1))
}

async fn heartbeat(key: Arc<LeaseKey>, lost: Arc<AtomicBool>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if lost.load(Ordering::SeqCst) {
            break;
        }
        if !key.renew() {
            lost.store(true, Ordering::SeqCst);
            break;
        }
    }
}
