// Per-IP login rate limiting
//
// Two interchangeable limiters sit behind `LoginRateLimiter`:
// - `FixedWindowRateLimiter` keeps its counters in a `LoginIpLimitStore`,
//   so every instance sharing the store enforces the same window.
// - `SlidingWindowRateLimiter` keeps a per-IP timestamp log in process,
//   for single-instance deployments with no shared store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::{error::AuthError, repository::LoginIpLimitStore};

/// Default ceiling on distinct IPs tracked by the in-process limiter
pub const DEFAULT_MAX_TRACKED_IPS: usize = 10_000;

/// Outcome of one rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Zero when allowed; otherwise at least one second
    pub retry_after: Duration,
}

impl RateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::zero(),
        }
    }

    pub fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: floor_retry_after(retry_after),
        }
    }
}

/// Never advertise a zero or negative wait
fn floor_retry_after(wait: Duration) -> Duration {
    wait.max(Duration::seconds(1))
}

#[async_trait]
pub trait LoginRateLimiter: Send + Sync {
    /// Count one login attempt from `client_ip` and decide whether it may proceed
    async fn allow(
        &self,
        client_ip: &str,
        max_hits: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, AuthError>;

    /// Drop state that no longer affects any decision; returns entries removed
    async fn prune(&self, _window: Duration, _now: DateTime<Utc>) -> usize {
        0
    }
}

/// Fixed-window limiter over shared storage
pub struct FixedWindowRateLimiter {
    store: Arc<dyn LoginIpLimitStore>,
}

impl FixedWindowRateLimiter {
    pub fn new(store: Arc<dyn LoginIpLimitStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LoginRateLimiter for FixedWindowRateLimiter {
    async fn allow(
        &self,
        client_ip: &str,
        max_hits: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, AuthError> {
        let row = self.store.record_hit(client_ip, window, now).await?;

        if i64::from(row.hits) <= i64::from(max_hits) {
            Ok(RateDecision::allow())
        } else {
            Ok(RateDecision::deny(row.window_started_at + window - now))
        }
    }
}

/// In-process sliding-log limiter
///
/// One mutex guards the whole per-IP map. Once more than `max_tracked_ips`
/// addresses are tracked, entries with no hits inside the window are evicted.
pub struct SlidingWindowRateLimiter {
    hits: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    max_tracked_ips: usize,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_tracked_ips: usize) -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
            max_tracked_ips: max_tracked_ips.max(1),
        }
    }

    pub async fn tracked_ips(&self) -> usize {
        self.hits.lock().await.len()
    }
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACKED_IPS)
    }
}

fn evict_idle(map: &mut HashMap<String, Vec<DateTime<Utc>>>, cutoff: DateTime<Utc>) -> usize {
    let before = map.len();
    map.retain(|_, stamps| {
        stamps.retain(|at| *at > cutoff);
        !stamps.is_empty()
    });
    before - map.len()
}

#[async_trait]
impl LoginRateLimiter for SlidingWindowRateLimiter {
    async fn allow(
        &self,
        client_ip: &str,
        max_hits: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, AuthError> {
        let cutoff = now - window;
        let mut map = self.hits.lock().await;

        let decision = {
            let stamps = map.entry(client_ip.to_string()).or_default();
            stamps.retain(|at| *at > cutoff);

            if stamps.len() >= max_hits as usize {
                let oldest = stamps.first().copied().unwrap_or(now);
                RateDecision::deny(oldest + window - now)
            } else {
                stamps.push(now);
                RateDecision::allow()
            }
        };

        if map.len() > self.max_tracked_ips {
            let evicted = evict_idle(&mut map, cutoff);
            tracing::debug!(evicted, tracked = map.len(), "Evicted idle login rate-limit entries");
        }

        Ok(decision)
    }

    async fn prune(&self, window: Duration, now: DateTime<Utc>) -> usize {
        let mut map = self.hits.lock().await;
        evict_idle(&mut map, now - window)
    }
}
