//! Bounded exponential backoff around a single LLM invocation.
//!
//! Only transient failures (rate limits, timeouts, connection drops, 5xx) are
//! retried. Everything else, content filtering included, goes straight back to
//! the caller. The wait suspends only the calling task; sibling documents keep
//! running.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use narrascope_core::config::RetryConfig;
use narrascope_llm::LlmError;
use tracing::{debug, warn};

/// How the executor waits between attempts.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Real waiting on the tokio timer.
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(120),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_secs(config.initial_backoff_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        }
    }
}

impl RetryPolicy {
    /// `min(initial * 2^attempt, max)`, with `attempt` counted from zero.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    pause: Arc<dyn Pause>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pause: Arc::new(TokioPause),
        }
    }

    /// Replace the timer, e.g. with a recording one in tests.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is used up. The last error is returned unchanged.
    pub async fn invoke<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let kind = err.kind();
                    if !kind.is_retryable() {
                        debug!(operation = label, error_kind = %kind, "not retryable");
                        return Err(err);
                    }
                    if attempt + 1 >= self.policy.max_attempts {
                        warn!(
                            operation = label,
                            attempts = attempt + 1,
                            error_kind = %kind,
                            error = %err,
                            "retries exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        operation = label,
                        attempt = attempt + 1,
                        error_kind = %kind,
                        backoff_ms = delay.as_millis() as u64,
                        "transient LLM error, backing off"
                    );
                    self.pause.pause(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Records requested waits instead of sleeping.
    #[derive(Default)]
    pub(crate) struct RecordingPause {
        pub waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Pause for RecordingPause {
        async fn pause(&self, delay: Duration) {
            self.waits.lock().unwrap().push(delay);
        }
    }

    fn executor(max_attempts: u32) -> (RetryExecutor, Arc<RecordingPause>) {
        let pause = Arc::new(RecordingPause::default());
        let exec = RetryExecutor::new(RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        })
        .with_pause(pause.clone());
        (exec, pause)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(4), Duration::from_secs(80));
        assert_eq!(policy.backoff(5), Duration::from_secs(120));
        assert_eq!(policy.backoff(40), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn rate_limited_three_times_then_succeeds() {
        let (exec, pause) = executor(8);
        let calls = AtomicU32::new(0);
        let result = exec
            .invoke("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(LlmError::Status {
                            status: 429,
                            body: "rate limit".into(),
                        })
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let waits = pause.waits.lock().unwrap().clone();
        assert_eq!(waits.len(), 3);
        assert!(waits.windows(2).all(|w| w[1] >= w[0]));
        assert!(waits.iter().all(|w| *w <= Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn content_filter_is_not_retried() {
        let (exec, pause) = executor(8);
        let calls = AtomicU32::new(0);
        let err = exec
            .invoke("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(LlmError::provider("blocked by content_filter")) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind().as_str(), "content_filter");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pause.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let (exec, pause) = executor(3);
        let calls = AtomicU32::new(0);
        let err = exec
            .invoke("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(LlmError::provider(format!("request timed out #{n}"))) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "request timed out #2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(pause.waits.lock().unwrap().len(), 2);
    }
}
