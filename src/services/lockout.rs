/// Brute-force lockout guard
///
/// Tracks failed login attempts per identifier (email) inside a rolling
/// window; crossing the threshold locks the identifier for a fixed duration
/// regardless of credential correctness. The check runs before any password
/// comparison so a locked identifier never costs a bcrypt round.
///
/// The increment-and-maybe-lock sequence is atomic with respect to concurrent
/// failures on the same identifier: Redis INCR for multi-instance
/// deployments, DashMap shard locking in memory. Counters may over-count when
/// a caller cancels mid-flight; that direction is safe (never fewer true
/// lockouts).
use crate::config::LockoutSettings;
use crate::error::Result;
use crate::redis_pool::SharedConnectionManager;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
pub struct LockoutStatus {
    pub locked: bool,
    pub unlock_at: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    fn open() -> Self {
        Self {
            locked: false,
            unlock_at: None,
        }
    }

    fn locked_until(unlock_at: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            unlock_at: Some(unlock_at),
        }
    }
}

#[async_trait]
pub trait LockoutGuard: Send + Sync {
    /// Must be called and enforced before any credential comparison
    async fn check(&self, identifier: &str) -> Result<LockoutStatus>;

    /// Record an attempt outcome; success resets the failure counter
    async fn record(&self, identifier: &str, success: bool) -> Result<()>;
}

/// Redis-backed guard shared across stateless instances
pub struct RedisLockoutGuard {
    redis: SharedConnectionManager,
    policy: LockoutSettings,
}

impl RedisLockoutGuard {
    pub fn new(redis: SharedConnectionManager, policy: LockoutSettings) -> Self {
        Self { redis, policy }
    }

    fn fail_key(identifier: &str) -> String {
        format!("boxoffice:lockout:fails:{identifier}")
    }

    fn lock_key(identifier: &str) -> String {
        format!("boxoffice:lockout:lock:{identifier}")
    }
}

#[async_trait]
impl LockoutGuard for RedisLockoutGuard {
    async fn check(&self, identifier: &str) -> Result<LockoutStatus> {
        let mut conn = self.redis.lock().await.clone();
        let unlock_ts: Option<i64> = redis::cmd("GET")
            .arg(Self::lock_key(identifier))
            .query_async(&mut conn)
            .await?;

        match unlock_ts {
            Some(ts) if ts > Utc::now().timestamp() => {
                let unlock_at = Utc
                    .timestamp_opt(ts, 0)
                    .single()
                    .unwrap_or_else(|| Utc::now() + Duration::seconds(self.policy.lock_secs as i64));
                Ok(LockoutStatus::locked_until(unlock_at))
            }
            _ => Ok(LockoutStatus::open()),
        }
    }

    async fn record(&self, identifier: &str, success: bool) -> Result<()> {
        let mut conn = self.redis.lock().await.clone();

        if success {
            redis::cmd("DEL")
                .arg(Self::fail_key(identifier))
                .arg(Self::lock_key(identifier))
                .query_async::<_, ()>(&mut conn)
                .await?;
            return Ok(());
        }

        // INCR is atomic: concurrent failures each observe the true
        // post-increment count, so the threshold cannot be raced past
        let count: u64 = redis::cmd("INCR")
            .arg(Self::fail_key(identifier))
            .query_async(&mut conn)
            .await?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(Self::fail_key(identifier))
                .arg(self.policy.window_secs)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        if count >= u64::from(self.policy.max_attempts) {
            let unlock_at = Utc::now() + Duration::seconds(self.policy.lock_secs as i64);
            redis::cmd("SET")
                .arg(Self::lock_key(identifier))
                .arg(unlock_at.timestamp())
                .arg("EX")
                .arg(self.policy.lock_secs)
                .query_async::<_, ()>(&mut conn)
                .await?;
            redis::cmd("DEL")
                .arg(Self::fail_key(identifier))
                .query_async::<_, ()>(&mut conn)
                .await?;

            tracing::warn!(identifier, count, "Identifier locked out after repeated failures");
        }

        Ok(())
    }
}

struct FailureWindow {
    count: u32,
    window_start: DateTime<Utc>,
    lock_until: Option<DateTime<Utc>>,
}

/// In-memory guard for tests and single-process deployments
pub struct InMemoryLockoutGuard {
    entries: DashMap<String, FailureWindow>,
    policy: LockoutSettings,
}

impl InMemoryLockoutGuard {
    pub fn new(policy: LockoutSettings) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }
}

#[async_trait]
impl LockoutGuard for InMemoryLockoutGuard {
    async fn check(&self, identifier: &str) -> Result<LockoutStatus> {
        if let Some(entry) = self.entries.get(identifier) {
            if let Some(lock_until) = entry.lock_until {
                if lock_until > Utc::now() {
                    return Ok(LockoutStatus::locked_until(lock_until));
                }
            }
        }
        Ok(LockoutStatus::open())
    }

    async fn record(&self, identifier: &str, success: bool) -> Result<()> {
        if success {
            self.entries.remove(identifier);
            return Ok(());
        }

        let now = Utc::now();
        // entry() holds the shard lock for the whole update, so concurrent
        // failures serialize and the threshold is evaluated against the true
        // post-increment count
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert_with(|| FailureWindow {
                count: 0,
                window_start: now,
                lock_until: None,
            });

        if now - entry.window_start > Duration::seconds(self.policy.window_secs as i64) {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        let already_locked = entry.lock_until.is_some_and(|t| t > now);
        if entry.count >= self.policy.max_attempts && !already_locked {
            entry.lock_until = Some(now + Duration::seconds(self.policy.lock_secs as i64));
            tracing::warn!(
                identifier,
                count = entry.count,
                "Identifier locked out after repeated failures"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn policy() -> LockoutSettings {
        LockoutSettings {
            max_attempts: 3,
            window_secs: 900,
            lock_secs: 900,
        }
    }

    #[tokio::test]
    async fn test_locks_at_threshold() {
        let guard = InMemoryLockoutGuard::new(policy());

        for _ in 0..2 {
            guard.record("a@x.com", false).await.expect("record");
            assert!(!guard.check("a@x.com").await.expect("check").locked);
        }

        guard.record("a@x.com", false).await.expect("record");
        let status = guard.check("a@x.com").await.expect("check");
        assert!(status.locked);
        assert!(status.unlock_at.expect("unlock time") > Utc::now());
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let guard = InMemoryLockoutGuard::new(policy());

        guard.record("a@x.com", false).await.expect("record");
        guard.record("a@x.com", false).await.expect("record");
        guard.record("a@x.com", true).await.expect("record");

        // Counter restarted: two more failures stay under the threshold
        guard.record("a@x.com", false).await.expect("record");
        guard.record("a@x.com", false).await.expect("record");
        assert!(!guard.check("a@x.com").await.expect("check").locked);
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let guard = InMemoryLockoutGuard::new(policy());

        for _ in 0..3 {
            guard.record("a@x.com", false).await.expect("record");
        }
        assert!(guard.check("a@x.com").await.expect("check").locked);
        assert!(!guard.check("b@x.com").await.expect("check").locked);
    }

    #[tokio::test]
    async fn test_concurrent_burst_locks_exactly_once() {
        let guard = Arc::new(InMemoryLockoutGuard::new(policy()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.record("a@x.com", false).await.expect("record");
            }));
        }
        for handle in handles {
            handle.await.expect("task should finish");
        }

        let status = guard.check("a@x.com").await.expect("check");
        assert!(status.locked, "burst past the threshold must lock");

        let entry = guard.entries.get("a@x.com").expect("entry present");
        // Every failure was counted; none was lost to a stale read
        assert_eq!(entry.count, 10);
    }
}
