use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::Script;

use crate::error::CounterError;

/// Atomically prunes expired entries out of a sliding window, admits the
/// current request if the window is under `limit`, and returns the
/// resulting occupancy. A single round trip, and no lost-update race
/// between the prune, the count, and the add.
///
/// Returns `{1, count}` (the post-admission occupancy) if admitted, or
/// `{0, oldest_score}` (the timestamp of the oldest surviving member) if the
/// window was already full and nothing was added — the caller needs that
/// timestamp to compute a precise retry-after.
const INCREMENT_AND_CHECK: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1] - ARGV[2])
local count = redis.call('ZCARD', KEYS[1])
if count < tonumber(ARGV[3]) then
    redis.call('ZADD', KEYS[1], ARGV[1], ARGV[4])
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return {1, count + 1}
else
    local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
    return {0, tonumber(oldest[2])}
end
"#;

const PRUNE_AND_COUNT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1] - ARGV[2])
return redis.call('ZCARD', KEYS[1])
"#;

/// Outcome of an `increment_and_check` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; the post-admission window occupancy.
    Allowed(u32),
    /// Denied; the timestamp (ms since epoch) of the oldest surviving event
    /// in the window. `RateLimiter` uses it to compute a precise
    /// retry-after instead of the full window length.
    Denied { oldest_ms: i64 },
}

/// Backing store for sliding-window counters, abstracted so the
/// `RateLimiter` can run against Redis in production and an in-process
/// store in tests and single-node local development.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Prune `key`'s window to `[now_ms - window, now_ms]`, then admit the
    /// current request (tagged `member`, a value unique per call) if the
    /// pruned count is below `limit`.
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now_ms: i64,
        member: &str,
    ) -> Result<Admission, CounterError>;

    /// Read-only: prune and report the current window occupancy without
    /// admitting anything.
    async fn usage(&self, key: &str, window: Duration, now_ms: i64) -> Result<u32, CounterError>;
}

/// Redis-backed sliding window over a sorted set per `(principal, window)`
/// key, scored by request timestamp in milliseconds. Connections come from
/// a `deadpool-redis` pool; every call is a single Lua script invocation.
pub struct RedisCounterStore {
    pool: Pool,
    increment_script: Script,
    prune_script: Script,
}

impl RedisCounterStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            increment_script: Script::new(INCREMENT_AND_CHECK),
            prune_script: Script::new(PRUNE_AND_COUNT),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now_ms: i64,
        member: &str,
    ) -> Result<Admission, CounterError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| CounterError::Unavailable(err.to_string()))?;

        let (admitted, value): (i64, i64) = self
            .increment_script
            .key(key)
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| CounterError::Unavailable(err.to_string()))?;

        Ok(if admitted == 1 {
            Admission::Allowed(value as u32)
        } else {
            Admission::Denied { oldest_ms: value }
        })
    }

    async fn usage(&self, key: &str, window: Duration, now_ms: i64) -> Result<u32, CounterError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| CounterError::Unavailable(err.to_string()))?;

        let count: i64 = self
            .prune_script
            .key(key)
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| CounterError::Unavailable(err.to_string()))?;

        Ok(count.max(0) as u32)
    }
}

/// In-process equivalent of `RedisCounterStore`, used for local development
/// without Redis and for deterministic tests. Mirrors the exact prune/count
/// semantics, just without a network round trip.
#[derive(Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, Vec<i64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(entries: &mut Vec<i64>, floor: i64) {
        entries.retain(|&ts| ts > floor);
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now_ms: i64,
        _member: &str,
    ) -> Result<Admission, CounterError> {
        let floor = now_ms - window.as_millis() as i64;
        let mut entries = self.windows.entry(key.to_owned()).or_default();
        Self::prune(&mut entries, floor);

        if (entries.len() as u32) < limit {
            entries.push(now_ms);
            Ok(Admission::Allowed(entries.len() as u32))
        } else {
            // Entries are appended in call order and never reordered, so
            // the front of the vec is always the oldest surviving event.
            let oldest_ms = entries.first().copied().unwrap_or(now_ms);
            Ok(Admission::Denied { oldest_ms })
        }
    }

    async fn usage(&self, key: &str, window: Duration, now_ms: i64) -> Result<u32, CounterError> {
        let floor = now_ms - window.as_millis() as i64;
        match self.windows.get_mut(key) {
            Some(mut entries) => {
                Self::prune(&mut entries, floor);
                Ok(entries.len() as u32)
            }
            None => Ok(0),
        }
    }
}

/// Lets callers erase the concrete store type behind `Arc<dyn CounterStore>`
/// when they don't want `RateLimiter` itself to be generic (the gateway
/// binary picks between `RedisCounterStore` and `InMemoryCounterStore` at
/// startup based on configuration, not at compile time).
#[async_trait]
impl CounterStore for Arc<dyn CounterStore> {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now_ms: i64,
        member: &str,
    ) -> Result<Admission, CounterError> {
        (**self).increment_and_check(key, window, limit, now_ms, member).await
    }

    async fn usage(&self, key: &str, window: Duration, now_ms: i64) -> Result<u32, CounterError> {
        (**self).usage(key, window, now_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_admits_up_to_limit_then_denies() {
        let store = InMemoryCounterStore::new();
        let window = Duration::from_secs(60);
        for n in 0..3 {
            let result = store
                .increment_and_check("p1", window, 3, 1_000 + n, &format!("m{n}"))
                .await
                .unwrap();
            assert_eq!(result, Admission::Allowed((n + 1) as u32));
        }
        let denied = store
            .increment_and_check("p1", window, 3, 1_003, "m3")
            .await
            .unwrap();
        assert_eq!(denied, Admission::Denied { oldest_ms: 1_000 });
    }

    #[tokio::test]
    async fn in_memory_store_prunes_entries_outside_window() {
        let store = InMemoryCounterStore::new();
        let window = Duration::from_millis(100);
        store
            .increment_and_check("p1", window, 1, 1_000, "m0")
            .await
            .unwrap();
        assert_eq!(store.usage("p1", window, 1_050).await.unwrap(), 1);
        assert_eq!(store.usage("p1", window, 1_200).await.unwrap(), 0);
    }
}
