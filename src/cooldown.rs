// ABOUTME: Sliding-window cooldown tracking keyed by invoker and trigger.
// ABOUTME: The in-process map is the gate; the cache store adds restart durability.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::store::StoreManager;

const LOCAL_PRUNE_THRESHOLD: usize = 1024;

/// Outcome of a cooldown acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownDecision {
    /// Invocation may proceed; the window has been recorded
    Ready,
    /// Rate key is still cooling down
    Active { remaining: Duration },
}

/// Tracks per-(invoker, trigger) cooldown deadlines.
///
/// The local map is authoritative within the process: check and reserve happen
/// under one lock acquisition, so concurrent invocations for the same rate key
/// admit at most one. The cache store only carries windows across restarts; a
/// degraded cache loses durability, never correctness.
pub struct CooldownTracker {
    stores: Arc<StoreManager>,
    local: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new(stores: Arc<StoreManager>) -> Self {
        Self {
            stores,
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Check-and-record in one step: if the rate key is free, the new deadline
    /// is reserved before returning `Ready`, so a concurrent second call for
    /// the same key sees the window even while the first handler still runs.
    pub async fn try_acquire(
        &self,
        invoker: &str,
        trigger: &str,
        window: Duration,
    ) -> CooldownDecision {
        if window.is_zero() {
            return CooldownDecision::Ready;
        }

        let key = format!("cooldown:{invoker}:{trigger}");
        let now = Utc::now();
        let deadline = now + ChronoDuration::milliseconds(window.as_millis() as i64);

        // Check and reserve atomically; the lock is never held across an await.
        {
            let mut map = self.local.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = map.get(&key) {
                if let Some(remaining) = remaining_until(*existing, now) {
                    return CooldownDecision::Active { remaining };
                }
            }
            if map.len() >= LOCAL_PRUNE_THRESHOLD {
                map.retain(|_, d| *d > now);
            }
            map.insert(key.clone(), deadline);
        }

        // A window persisted by a previous process run still counts; replace
        // the reservation just made with the earlier deadline.
        if let Some(remaining) = self.check_cache(&key, now).await {
            let persisted = now + ChronoDuration::milliseconds(remaining.as_millis() as i64);
            let mut map = self.local.lock().unwrap_or_else(|e| e.into_inner());
            map.insert(key, persisted);
            return CooldownDecision::Active { remaining };
        }

        if let Ok(cache) = self.stores.cache() {
            if let Err(e) = cache
                .set(&key, &deadline.to_rfc3339(), Some(window))
                .await
            {
                tracing::debug!(error = %e, "cooldown not persisted to cache");
            }
        }
        CooldownDecision::Ready
    }

    async fn check_cache(&self, key: &str, now: DateTime<Utc>) -> Option<Duration> {
        let cache = self.stores.cache().ok()?;
        let stamp = cache.get(key).await.ok()??;
        let deadline = DateTime::parse_from_rfc3339(&stamp)
            .ok()?
            .with_timezone(&Utc);
        remaining_until(deadline, now)
    }
}

fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    let remaining = deadline - now;
    if remaining > ChronoDuration::zero() {
        Some(Duration::from_millis(remaining.num_milliseconds().max(0) as u64))
    } else {
        None
    }
}
