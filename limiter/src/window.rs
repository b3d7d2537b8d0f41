//! Fixed-window rate limiting over Redis or an in-process map.
//!
//! Counters reset at fixed boundaries rather than rolling. A window that has
//! been breached once stays rejected until it expires, so a client cannot
//! oscillate around the limit with well-timed retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use deadpool_redis::redis::AsyncCommands;

/// Result of one rate-limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    pub blocked: bool,
}

#[derive(Debug)]
struct WindowEntry {
    count: u64,
    reset_at: DateTime<Utc>,
    blocked: bool,
}

/// Per-identifier fixed-window limiter.
///
/// When a Redis pool is configured, counters live there via `INCR` and
/// `PEXPIRE`, so all workers share state and the counter outlives a breach
/// for the remainder of the window. Without Redis, or when Redis errors,
/// checks degrade transparently to the in-process map.
pub struct FixedWindowLimiter {
    redis: Option<deadpool_redis::Pool>,
    entries: DashMap<String, WindowEntry>,
}

impl FixedWindowLimiter {
    pub fn new(redis: Option<deadpool_redis::Pool>) -> Self {
        Self {
            redis,
            entries: DashMap::new(),
        }
    }

    /// Counts one request for `identifier` against `limit` per `window`.
    /// Never fails: a Redis error is logged and the in-memory map answers
    /// instead.
    pub async fn check(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let window_ms = window.as_millis() as i64;

        if let Some(pool) = &self.redis {
            match self.check_redis(pool, identifier, limit, window_ms).await {
                Ok(decision) => return decision,
                Err(e) => {
                    log::warn!("Rate limit check via Redis failed, using memory: {}", e);
                }
            }
        }

        self.check_memory(identifier, limit, window_ms, Utc::now())
    }

    async fn check_redis(
        &self,
        pool: &deadpool_redis::Pool,
        identifier: &str,
        limit: u32,
        window_ms: i64,
    ) -> Result<RateLimitDecision, String> {
        let mut conn = pool.get().await.map_err(|e| e.to_string())?;
        let key = format!("ratelimit:{}", identifier);

        let count: u64 = conn.incr(&key, 1).await.map_err(|e| e.to_string())?;

        // The key expiring is what resets the counter, so a key without a
        // TTL would count forever. The first hit has none by definition;
        // on later hits PTTL reports -1 if a prior PEXPIRE never landed.
        let ttl_ms: i64 = if count == 1 {
            -1
        } else {
            conn.pttl(&key).await.map_err(|e| e.to_string())?
        };

        let now = Utc::now();
        let (reset_at, rearm) = window_reset(now, ttl_ms, window_ms);
        if rearm {
            let _: bool = conn
                .pexpire(&key, window_ms)
                .await
                .map_err(|e| e.to_string())?;
        }

        let blocked = count > limit as u64;
        Ok(RateLimitDecision {
            allowed: !blocked,
            count,
            remaining: (limit as u64).saturating_sub(count),
            reset_at,
            blocked,
        })
    }

    fn check_memory(
        &self,
        identifier: &str,
        limit: u32,
        window_ms: i64,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now + chrono::Duration::milliseconds(window_ms),
                blocked: false,
            });

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + chrono::Duration::milliseconds(window_ms);
            entry.blocked = false;
        }

        entry.count += 1;
        if entry.count > limit as u64 {
            // A breached window stays rejected until it expires.
            entry.blocked = true;
        }

        RateLimitDecision {
            allowed: !entry.blocked,
            count: entry.count,
            remaining: (limit as u64).saturating_sub(entry.count),
            reset_at: entry.reset_at,
            blocked: entry.blocked,
        }
    }

    /// Drops in-memory entries whose window has already expired.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.reset_at > now);
    }

    /// Spawns the periodic sweep that bounds memory growth of the
    /// in-process map.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.purge_expired(Utc::now());
            }
        });
    }
}

/// Maps a PTTL answer to the window's reset instant. A negative TTL means
/// the key has no expiry (-1) or vanished between commands (-2); either way
/// the window opens now and the expiry must be set.
fn window_reset(now: DateTime<Utc>, ttl_ms: i64, window_ms: i64) -> (DateTime<Utc>, bool) {
    if ttl_ms < 0 {
        (now + chrono::Duration::milliseconds(window_ms), true)
    } else {
        (now + chrono::Duration::milliseconds(ttl_ms), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_MS: i64 = 60_000;

    #[test]
    fn requests_within_the_limit_are_allowed() {
        let limiter = FixedWindowLimiter::new(None);
        let now = Utc::now();

        for i in 1..=5 {
            let decision = limiter.check_memory("user:a", 5, WINDOW_MS, now);
            assert!(decision.allowed);
            assert_eq!(decision.count, i);
            assert_eq!(decision.remaining, 5 - i);
        }
    }

    #[test]
    fn breach_sticks_for_the_rest_of_the_window() {
        let limiter = FixedWindowLimiter::new(None);
        let now = Utc::now();

        for _ in 0..5 {
            limiter.check_memory("user:a", 5, WINDOW_MS, now);
        }

        let sixth = limiter.check_memory("user:a", 5, WINDOW_MS, now);
        assert!(!sixth.allowed);
        assert!(sixth.blocked);

        let seventh =
            limiter.check_memory("user:a", 5, WINDOW_MS, now + chrono::Duration::seconds(30));
        assert!(!seventh.allowed);
        assert!(seventh.blocked);
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let limiter = FixedWindowLimiter::new(None);
        let now = Utc::now();

        for _ in 0..6 {
            limiter.check_memory("user:a", 5, WINDOW_MS, now);
        }

        let later = now + chrono::Duration::milliseconds(WINDOW_MS + 1);
        let decision = limiter.check_memory("user:a", 5, WINDOW_MS, later);
        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
        assert!(!decision.blocked);
    }

    #[test]
    fn identifiers_are_counted_independently() {
        let limiter = FixedWindowLimiter::new(None);
        let now = Utc::now();

        for _ in 0..6 {
            limiter.check_memory("user:a", 5, WINDOW_MS, now);
        }

        let other = limiter.check_memory("ip:10.0.0.1", 5, WINDOW_MS, now);
        assert!(other.allowed);
        assert_eq!(other.count, 1);
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let limiter = FixedWindowLimiter::new(None);
        let now = Utc::now();

        limiter.check_memory("user:stale", 5, WINDOW_MS, now);
        limiter.check_memory("user:fresh", 5, WINDOW_MS, now + chrono::Duration::seconds(30));

        limiter.purge_expired(now + chrono::Duration::milliseconds(WINDOW_MS + 1));

        assert!(!limiter.entries.contains_key("user:stale"));
        assert!(limiter.entries.contains_key("user:fresh"));
    }

    #[test]
    fn missing_ttl_rearms_the_window_expiry() {
        let now = Utc::now();

        let (reset_at, rearm) = window_reset(now, -1, WINDOW_MS);
        assert!(rearm);
        assert_eq!(reset_at, now + chrono::Duration::milliseconds(WINDOW_MS));

        let (reset_at, rearm) = window_reset(now, -2, WINDOW_MS);
        assert!(rearm);
        assert_eq!(reset_at, now + chrono::Duration::milliseconds(WINDOW_MS));
    }

    #[test]
    fn live_ttl_keeps_the_existing_expiry() {
        let now = Utc::now();

        let (reset_at, rearm) = window_reset(now, 15_000, WINDOW_MS);
        assert!(!rearm);
        assert_eq!(reset_at, now + chrono::Duration::milliseconds(15_000));
    }

    #[tokio::test]
    async fn check_without_redis_uses_the_memory_backend() {
        let limiter = FixedWindowLimiter::new(None);

        for _ in 0..5 {
            assert!(limiter.check("user:a", 5, Duration::from_secs(60)).await.allowed);
        }
        let sixth = limiter.check("user:a", 5, Duration::from_secs(60)).await;
        assert!(!sixth.allowed);
        assert!(sixth.blocked);
    }
}
