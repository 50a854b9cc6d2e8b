//! Shared cooldown in front of every upstream call.
//!
//! ESI allows a fixed number of error responses per window and bans clients that exceed it. The
//! coordinator keeps one "cooldown until" deadline (milliseconds since the epoch): raised when the
//! remaining budget gets low, never lowered, and optionally mirrored into the fast cache so every
//! process pauses together.

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::{
    cache::FastCache,
    util::clock::{Clock, JitterSource},
};

use super::headers::ErrorBudget;

const TARGET: &str = "esi_gateway::upstream::backoff";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Raise the cooldown once the remaining error budget is at or below this value.
    pub soft_remain: u32,
    /// Error responses escalate at or below this value even when not explicitly throttled.
    pub hard_remain: u32,
    pub jitter_ms: u64,
    pub clock_skew_ms: u64,
    /// Whether successful responses with a low budget raise the cooldown too.
    pub raise_on_success: bool,
    /// Cooldown applied to 420/429/503 answers that carry no reset hint.
    pub default_reset: Duration,
    /// Fast-cache key of the shared deadline.
    pub shared_key: String,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            soft_remain: 5,
            hard_remain: 1,
            jitter_ms: 150,
            clock_skew_ms: 250,
            raise_on_success: true,
            default_reset: Duration::from_secs(60),
            shared_key: "esi:cooldown-until".to_string(),
        }
    }
}

/// What kind of response the budget headers arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    Failure,
}

pub struct BackoffCoordinator {
    policy: BackoffPolicy,
    local_until_ms: AtomicI64,
    shared: Option<Arc<dyn FastCache>>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
}

impl BackoffCoordinator {
    pub fn new(policy: BackoffPolicy, clock: Arc<dyn Clock>, jitter: Arc<dyn JitterSource>) -> Self {
        Self {
            policy,
            local_until_ms: AtomicI64::new(0),
            shared: None,
            clock,
            jitter,
        }
    }

    /// Mirror the deadline through `cache`. Failures there fall back to the local value.
    pub fn with_shared_store(mut self, cache: Arc<dyn FastCache>) -> Self {
        self.shared = Some(cache);
        self
    }

    /// Process-local deadline in epoch milliseconds (0 when never raised).
    pub fn local_until_ms(&self) -> i64 {
        self.local_until_ms.load(Ordering::Acquire)
    }

    /// Soft path: called for every response that carries the error-budget pair.
    pub async fn observe(&self, budget: ErrorBudget, class: ResponseClass) -> bool {
        debug!(
            target: TARGET,
            remaining = budget.remaining,
            reset_seconds = budget.reset_seconds,
            ?class,
            "error budget observed"
        );
        if class == ResponseClass::Success && !self.policy.raise_on_success {
            return false;
        }
        if budget.remaining > self.policy.soft_remain {
            return false;
        }
        self.raise(Duration::from_secs(budget.reset_seconds), "soft")
            .await
    }

    /// Called once for every error status; raises at most once per response.
    ///
    /// 420/429/503 always raise, using the budget reset, then `Retry-After`, then the default.
    /// Other errors raise at or below `hard_remain`, and otherwise follow the soft rule.
    pub async fn observe_failure(
        &self,
        status: u16,
        budget: Option<ErrorBudget>,
        retry_after_seconds: Option<u64>,
    ) -> bool {
        let throttled = matches!(status, 420 | 429 | 503);
        if throttled {
            let reset = budget
                .map(|b| Duration::from_secs(b.reset_seconds))
                .or_else(|| retry_after_seconds.map(Duration::from_secs))
                .unwrap_or(self.policy.default_reset);
            return self.raise(reset, "throttled").await;
        }

        let Some(budget) = budget else {
            return false;
        };
        if budget.remaining <= self.policy.hard_remain {
            return self
                .raise(Duration::from_secs(budget.reset_seconds), "hard")
                .await;
        }
        self.observe(budget, ResponseClass::Failure).await
    }

    /// Effective deadline: the later of the local and shared values.
    pub async fn cooldown_until_ms(&self) -> i64 {
        let shared = self.read_shared().await.unwrap_or(0);
        let previous = self.local_until_ms.fetch_max(shared, Ordering::AcqRel);
        previous.max(shared)
    }

    /// Suspend until the cooldown has passed. Returns how long the caller waited.
    pub async fn await_ready(&self) -> Duration {
        let until = self.cooldown_until_ms().await;
        let now = self.clock.now_millis();
        if now >= until {
            return Duration::ZERO;
        }

        let wait_ms = u64::try_from(until.saturating_sub(now))
            .unwrap_or(0)
            .saturating_add(self.jitter.jitter_ms(self.policy.jitter_ms));
        let wait = Duration::from_millis(wait_ms);
        info!(target: TARGET, wait_ms, "upstream cooldown active, delaying call");
        histogram!("esi_gateway_backoff_wait_ms").record(wait_ms as f64);
        tokio::time::sleep(wait).await;
        wait
    }

    async fn raise(&self, reset: Duration, trigger: &'static str) -> bool {
        let now = self.clock.now_millis();
        let reset_ms = i64::try_from(reset.as_millis()).unwrap_or(i64::MAX);
        let margin_ms = i64::try_from(
            self.policy
                .clock_skew_ms
                .saturating_add(self.jitter.jitter_ms(self.policy.jitter_ms)),
        )
        .unwrap_or(i64::MAX);
        let candidate = now.saturating_add(reset_ms).saturating_add(margin_ms);

        let previous = self.local_until_ms.fetch_max(candidate, Ordering::AcqRel);
        if candidate <= previous {
            return false;
        }

        counter!("esi_gateway_backoff_raised_total", "trigger" => trigger).increment(1);
        warn!(
            target: TARGET,
            trigger,
            cooldown_until_ms = candidate,
            cooldown_ms = candidate - now,
            "upstream cooldown raised"
        );
        self.write_shared(candidate, now).await;
        true
    }

    async fn read_shared(&self) -> Option<i64> {
        let cache = self.shared.as_ref()?;
        match cache.get(&self.policy.shared_key).await {
            Ok(value) => value.and_then(|raw| raw.trim().parse().ok()),
            Err(err) => {
                warn!(
                    target: TARGET,
                    op = "backoff.read_shared",
                    error = %err,
                    "falling back to process-local cooldown"
                );
                None
            }
        }
    }

    async fn write_shared(&self, until_ms: i64, now_ms: i64) {
        let Some(cache) = self.shared.as_ref() else {
            return;
        };
        if self
            .read_shared()
            .await
            .is_some_and(|shared| shared >= until_ms)
        {
            return;
        }

        let ttl_ms = u64::try_from(until_ms.saturating_sub(now_ms))
            .unwrap_or(0)
            .saturating_add(self.policy.clock_skew_ms);
        if let Err(err) = cache
            .set(
                &self.policy.shared_key,
                &until_ms.to_string(),
                Duration::from_millis(ttl_ms),
            )
            .await
        {
            warn!(
                target: TARGET,
                op = "backoff.write_shared",
                error = %err,
                "failed to mirror cooldown"
            );
        }
    }
}
