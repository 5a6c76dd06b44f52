//! Retry policy for per-ticket child requests.
//!
//! Only rate limiting (HTTP 429) is retried, with exponential backoff.
//! Everything else degrades to an empty collection on the first failure so
//! one bad ticket cannot stall or abort a sync.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::metrics;
use crate::upstream::UpstreamError;

/// Child collection being fetched for a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEntity {
    Notes,
    TimeEntries,
}

impl ChildEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildEntity::Notes => "notes",
            ChildEntity::TimeEntries => "time_entries",
        }
    }
}

/// Why a child collection was replaced by an empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    /// Every attempt was rate limited.
    RateLimitExhausted { attempts: u32 },
    /// A non-retryable error.
    Failed(String),
}

/// Outcome of a child fetch. Never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildFetch<T> {
    /// The upstream answered; the list may legitimately be empty.
    Complete(Vec<T>),
    /// The fetch gave up; callers should treat the collection as empty.
    Degraded(DegradeReason),
}

impl<T> ChildFetch<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ChildFetch::Degraded(_))
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            ChildFetch::Complete(items) => items,
            ChildFetch::Degraded(_) => Vec::new(),
        }
    }
}

/// Bounded exponential backoff on rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait after the first rate-limited attempt; doubles each time.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Wait after the rate-limited attempt numbered `attempt` (0-based):
    /// 1.5s, 3s, 6s with the default base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails for a reason other than rate
    /// limiting, or runs out of attempts.
    ///
    /// Every rate-limited attempt is followed by its backoff, the last one
    /// included, so a caller that gives up has waited out the full schedule.
    pub async fn run<T, F, Fut>(&self, entity: ChildEntity, ticket_id: i64, mut op: F) -> ChildFetch<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<T>, UpstreamError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let label = entity.as_str();
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(items) => {
                    debug!(ticket_id, entity = label, attempt, count = items.len(), "Child fetch complete");
                    metrics::CHILD_REQUESTS.with_label_values(&[label, "ok"]).inc();
                    return ChildFetch::Complete(items);
                }
                Err(e) if e.is_rate_limited() => {
                    let wait = self.backoff(attempt);
                    warn!(
                        ticket_id,
                        entity = label,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limited (429), backing off"
                    );
                    metrics::RATE_LIMIT_RETRIES.with_label_values(&[label]).inc();
                    tokio::time::sleep(wait).await;

                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(
                            ticket_id,
                            entity = label,
                            attempts = max_attempts,
                            "Rate limit retries exhausted, continuing without {}",
                            label
                        );
                        metrics::CHILD_REQUESTS
                            .with_label_values(&[label, "rate_limited"])
                            .inc();
                        return ChildFetch::Degraded(DegradeReason::RateLimitExhausted {
                            attempts: max_attempts,
                        });
                    }
                }
                Err(e) => {
                    warn!(ticket_id, entity = label, error = %e, "Child fetch failed, continuing without {}", label);
                    metrics::CHILD_REQUESTS.with_label_values(&[label, "failed"]).inc();
                    return ChildFetch::Degraded(DegradeReason::Failed(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Returns `failures` errors produced by `make_err`, then `Ok(vec![1, 2])`.
    fn flaky(
        failures: u32,
        make_err: fn() -> UpstreamError,
    ) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<Vec<u8>, UpstreamError>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                std::future::ready(Err(make_err()))
            } else {
                std::future::ready(Ok(vec![1, 2]))
            }
        };
        (calls, op)
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(1500));
        assert_eq!(policy.backoff(1), Duration::from_millis(3000));
        assert_eq!(policy.backoff(2), Duration::from_millis(6000));
    }

    #[test]
    fn test_from_config() {
        let config = SyncConfig {
            max_retries: 5,
            backoff_base_ms: 100,
            ..SyncConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try_does_not_wait() {
        let (calls, op) = flaky(0, || UpstreamError::RateLimited);
        let start = Instant::now();

        let result = RetryPolicy::default().run(ChildEntity::Notes, 1, op).await;

        assert_eq!(result, ChildFetch::Complete(vec![1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_rate_limits_then_success() {
        let (calls, op) = flaky(2, || UpstreamError::RateLimited);
        let start = Instant::now();

        let result = RetryPolicy::default().run(ChildEntity::Notes, 1, op).await;

        assert_eq!(result.into_items(), vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_every_attempt_degrades() {
        let (calls, op) = flaky(u32::MAX, || UpstreamError::RateLimited);
        let start = Instant::now();

        let result = RetryPolicy::default()
            .run(ChildEntity::TimeEntries, 1, op)
            .await;

        assert_eq!(
            result,
            ChildFetch::Degraded(DegradeReason::RateLimitExhausted { attempts: 3 })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1.5s + 3s + 6s, the last backoff included
        assert_eq!(start.elapsed(), Duration::from_millis(10_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let (calls, op) = flaky(u32::MAX, || UpstreamError::Status {
            status: 500,
            body: "boom".to_string(),
        });
        let start = Instant::now();

        let result = RetryPolicy::default().run(ChildEntity::Notes, 1, op).await;

        assert!(result.is_degraded());
        assert!(matches!(
            result,
            ChildFetch::Degraded(DegradeReason::Failed(ref msg)) if msg.contains("500")
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_retried() {
        let (calls, op) = flaky(u32::MAX, || UpstreamError::Timeout);

        let result = RetryPolicy::default().run(ChildEntity::Notes, 1, op).await;

        assert!(result.into_items().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_waits_its_backoff() {
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1500),
        };
        let (calls, op) = flaky(u32::MAX, || UpstreamError::RateLimited);
        let start = Instant::now();

        let result = policy.run(ChildEntity::Notes, 1, op).await;

        assert_eq!(
            result,
            ChildFetch::Degraded(DegradeReason::RateLimitExhausted { attempts: 1 })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            base_delay: Duration::from_millis(10),
        };
        let (calls, op) = flaky(0, || UpstreamError::RateLimited);
        let result = policy.run(ChildEntity::Notes, 1, op).await;
        assert!(!result.is_degraded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
