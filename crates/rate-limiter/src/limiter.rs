use std::sync::Arc;
use std::time::Duration;

use metrics::GatewayMetrics;
use uuid::Uuid;

use crate::store::{Admission, CounterStore};

/// The two sliding windows every principal is checked against. Minute and
/// hour windows are independent; a principal is denied if either is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitType {
    Minute,
    Hour,
}

impl LimitType {
    fn window(self) -> Duration {
        match self {
            LimitType::Minute => Duration::from_secs(60),
            LimitType::Hour => Duration::from_secs(3600),
        }
    }

    fn label(self) -> &'static str {
        match self {
            LimitType::Minute => "minute",
            LimitType::Hour => "hour",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny {
        limit: &'static str,
        retry_after: Duration,
    },
}

/// Sliding-window rate limiter over a pluggable `CounterStore`. Holds no
/// per-principal state itself; every check is a pair of independent,
/// idempotent-on-retry store calls (minute then hour), short-circuiting on
/// the first denial so a principal already over their per-minute budget
/// never touches the hourly counter.
pub struct RateLimiter<C: CounterStore> {
    store: C,
    metrics: Arc<GatewayMetrics>,
    bypass_on_failure: bool,
}

impl<C: CounterStore> RateLimiter<C> {
    pub fn new(store: C, metrics: Arc<GatewayMetrics>, bypass_on_failure: bool) -> Self {
        Self {
            store,
            metrics,
            bypass_on_failure,
        }
    }

    /// Check and, if admitted, record one request against `principal_id`'s
    /// windows at `now_ms` (milliseconds since epoch, so callers control the
    /// clock in tests). If the store is unreachable, `bypass_on_failure`
    /// decides the outcome: `true` admits the request (and increments the
    /// fallback counter), `false` denies it with a one-second retry-after.
    pub async fn check(&self, principal_id: &str, limits: RateLimits, now_ms: i64) -> Decision {
        let decision = self
            .check_one(principal_id, LimitType::Minute, limits.requests_per_minute, now_ms)
            .await;
        if !matches!(decision, Decision::Allow) {
            self.record(LimitType::Minute, &decision);
            return decision;
        }

        let decision = self
            .check_one(principal_id, LimitType::Hour, limits.requests_per_hour, now_ms)
            .await;
        self.record(LimitType::Hour, &decision);
        decision
    }

    async fn check_one(&self, principal_id: &str, limit_type: LimitType, limit: u32, now_ms: i64) -> Decision {
        let key = format!("ratelimit:{principal_id}:{}", limit_type.label());
        let member = Uuid::new_v4().to_string();

        match self
            .store
            .increment_and_check(&key, limit_type.window(), limit, now_ms, &member)
            .await
        {
            Ok(Admission::Allowed(_)) => Decision::Allow,
            Ok(Admission::Denied { oldest_ms }) => Decision::Deny {
                limit: limit_type.label(),
                retry_after: retry_after_from(oldest_ms, limit_type.window(), now_ms),
            },
            Err(_) if self.bypass_on_failure => {
                self.metrics.rate_limit_fallback_total.inc();
                Decision::Allow
            }
            Err(_) => {
                self.metrics.rate_limit_fallback_total.inc();
                Decision::Deny {
                    limit: "unavailable",
                    retry_after: Duration::from_secs(1),
                }
            }
        }
    }

    /// Current occupancy of both windows, for the usage-reporting endpoint.
    /// Read-only: never advances the window, unlike `check`.
    pub async fn usage(&self, principal_id: &str, limits: RateLimits, now_ms: i64) -> (u32, u32) {
        let minute_key = format!("ratelimit:{principal_id}:minute");
        let hour_key = format!("ratelimit:{principal_id}:hour");
        let minute = self
            .store
            .usage(&minute_key, LimitType::Minute.window(), now_ms)
            .await
            .unwrap_or(limits.requests_per_minute);
        let hour = self
            .store
            .usage(&hour_key, LimitType::Hour.window(), now_ms)
            .await
            .unwrap_or(limits.requests_per_hour);
        (minute, hour)
    }

    fn record(&self, limit_type: LimitType, decision: &Decision) {
        let outcome = if matches!(decision, Decision::Allow) { "allow" } else { "deny" };
        self.metrics
            .rate_limit_decisions_total
            .with_label_values(&[outcome, limit_type.label()])
            .inc();
    }
}

/// `ceil((oldest + window - now) / 1000)`, clamped to zero. Using the
/// oldest surviving event rather than the full window length gives the
/// caller the time until *that* event ages out, not the time until an
/// empty window would reopen.
fn retry_after_from(oldest_ms: i64, window: Duration, now_ms: i64) -> Duration {
    let window_ms = window.as_millis() as i64;
    let remaining_ms = (oldest_ms + window_ms - now_ms).max(0);
    let secs = (remaining_ms + 999) / 1000;
    Duration::from_secs(secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCounterStore;
    use prometheus::Registry;

    fn limiter() -> RateLimiter<InMemoryCounterStore> {
        let metrics = Arc::new(GatewayMetrics::new(Registry::new()));
        RateLimiter::new(InMemoryCounterStore::new(), metrics, false)
    }

    #[tokio::test]
    async fn admits_until_minute_budget_exhausted() {
        let limiter = limiter();
        let limits = RateLimits {
            requests_per_minute: 2,
            requests_per_hour: 100,
        };
        assert_eq!(limiter.check("p1", limits, 0).await, Decision::Allow);
        assert_eq!(limiter.check("p1", limits, 0).await, Decision::Allow);
        let third = limiter.check("p1", limits, 0).await;
        assert!(matches!(third, Decision::Deny { limit: "minute", .. }));
    }

    #[tokio::test]
    async fn retry_after_reflects_the_oldest_event_not_the_full_window() {
        let limiter = limiter();
        let limits = RateLimits {
            requests_per_minute: 2,
            requests_per_hour: 100,
        };
        assert_eq!(limiter.check("p1", limits, 0).await, Decision::Allow);
        assert_eq!(limiter.check("p1", limits, 1_000).await, Decision::Allow);
        let third = limiter.check("p1", limits, 2_000).await;
        assert_eq!(
            third,
            Decision::Deny {
                limit: "minute",
                retry_after: Duration::from_secs(58),
            }
        );
    }

    #[tokio::test]
    async fn minute_denial_does_not_consume_hour_budget() {
        let limiter = limiter();
        let limits = RateLimits {
            requests_per_minute: 1,
            requests_per_hour: 10,
        };
        limiter.check("p1", limits, 0).await;
        limiter.check("p1", limits, 0).await; // denied on minute

        let (_, hour_usage) = limiter.usage("p1", limits, 0).await;
        assert_eq!(hour_usage, 1, "only the admitted request should count toward the hour window");
    }

    #[tokio::test]
    async fn different_principals_have_independent_windows() {
        let limiter = limiter();
        let limits = RateLimits {
            requests_per_minute: 1,
            requests_per_hour: 10,
        };
        assert_eq!(limiter.check("a", limits, 0).await, Decision::Allow);
        assert_eq!(limiter.check("b", limits, 0).await, Decision::Allow);
    }
}
