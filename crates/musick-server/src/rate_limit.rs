//! Per-IP token bucket applied to inbound commands.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

const PURGE_EVERY: Duration = Duration::from_secs(300);
const MAX_IDLE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            refilled_at: now,
        }
    }

    fn take(&mut self, now: Instant, rate: f64, capacity: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.refilled_at = now;
        self.tokens = (self.tokens + elapsed * rate).min(capacity);

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}

/// Command budget shared by every connection from the same address.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<IpAddr, Bucket>>>,
    rate: f64,
    capacity: f64,
}

impl RateLimiter {
    /// `rate` tokens per second, at most `capacity` banked.
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            capacity,
        }
    }

    /// Spend one token for `ip`; `false` means refuse the command.
    pub async fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(ip)
            .or_insert_with(|| Bucket::full(self.capacity, now))
            .take(now, self.rate, self.capacity)
    }

    pub async fn purge_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.refilled_at) < max_idle);
        before - buckets.len()
    }

    /// Drop idle buckets on a fixed interval. Never returns.
    pub async fn run_purge_loop(self) {
        let mut interval = tokio::time::interval(PURGE_EVERY);
        loop {
            interval.tick().await;
            let removed = self.purge_idle(MAX_IDLE).await;
            if removed > 0 {
                debug!(removed, "Purged idle rate limit buckets");
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(20.0, 60.0)
    }
}
