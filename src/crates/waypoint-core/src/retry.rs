//! Bounded retry with exponential backoff for model calls
//!
//! Delay before retry `n` (0-indexed) is
//! `min(initial_interval * backoff_factor^n, max_interval)`, scaled by a
//! random factor in `0.5..=1.5` when jitter is on.
//!
//! [`invoke_with_retry`] is what nodes use: transient failures
//! ([`ModelError::is_transient`]) are retried, exhaustion degrades to
//! `Ok(None)` so the node can apply its fallback, and permanent failures
//! propagate.

use crate::llm::{ChatModel, ChatRequest, ChatResponse, ModelError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for external calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,

    /// Initial interval between retries in seconds
    pub initial_interval: f64,

    /// Multiplier for the interval after each retry
    pub backoff_factor: f64,

    /// Maximum interval between retries in seconds
    pub max_interval: f64,

    /// Whether to add random jitter to intervals
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }

    /// Policy that never sleeps, for tests and offline runs
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts)
            .with_initial_interval(0.0)
            .with_jitter(false)
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt >= self.max_attempts {
            return Duration::ZERO;
        }

        let base_delay = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_interval).max(0.0);

        let final_delay = if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Whether attempt number `attempt` (0-indexed) may run
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Run `operation` until it succeeds, fails non-retryably, or attempts run out
///
/// Returns the last error when every attempt failed.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(operation = %operation_name, attempt = attempt + 1, "Retry succeeded");
                }
                return Ok(result);
            }
            Err(err) if is_retryable(&err) && attempt + 1 < max_attempts => {
                let delay = policy.calculate_delay(attempt);
                warn!(
                    operation = %operation_name,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, will retry"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if is_retryable(&err) {
                    warn!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        error = %err,
                        "Operation failed, max attempts exhausted"
                    );
                }
                return Err(err);
            }
        }
    }
}

/// Invoke a model with retries
///
/// - `Ok(Some(response))` on success
/// - `Ok(None)` when transient failures exhausted the policy
/// - `Err` for permanent failures
pub async fn invoke_with_retry(
    model: &dyn ChatModel,
    request: ChatRequest,
    policy: &RetryPolicy,
) -> Result<Option<ChatResponse>, ModelError> {
    let outcome = with_retry(policy, model.name(), ModelError::is_transient, || {
        model.invoke(request.clone())
    })
    .await;

    match outcome {
        Ok(response) => Ok(Some(response)),
        Err(err) if err.is_transient() => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use crate::Message;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_interval, 0.5);
        assert_eq!(policy.backoff_factor, 2.0);
        assert_eq!(policy.max_interval, 128.0);
        assert!(policy.jitter);
    }

    #[test]
    fn test_calculate_delay_exponential() {
        let policy = RetryPolicy::new(5).with_jitter(false);
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(5), Duration::ZERO);
    }

    #[test]
    fn test_calculate_delay_capped() {
        let policy = RetryPolicy::new(20).with_jitter(false).with_max_interval(3.0);
        assert_eq!(policy.calculate_delay(10), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::new(3);
        for _ in 0..20 {
            let delay = policy.calculate_delay(1).as_secs_f64();
            assert!((0.5..=1.5).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let model = ScriptedModel::new()
            .then_error(ModelError::RateLimited("slow down".into()))
            .then_message(Message::assistant("ok"));

        let response = invoke_with_retry(&model, ChatRequest::default(), &RetryPolicy::immediate(3))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.message.content, "ok");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_degrades_to_none() {
        let model = ScriptedModel::new()
            .then_error(ModelError::Transient("a".into()))
            .then_error(ModelError::Transient("b".into()))
            .then_error(ModelError::Transient("c".into()));

        let response = invoke_with_retry(&model, ChatRequest::default(), &RetryPolicy::immediate(3))
            .await
            .unwrap();
        assert!(response.is_none());
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let model = ScriptedModel::new().then_error(ModelError::Permanent("bad key".into()));

        let err = invoke_with_retry(&model, ChatRequest::default(), &RetryPolicy::immediate(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Permanent(_)));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let model = ScriptedModel::new()
            .then_error(ModelError::Transient("a".into()))
            .then_message(Message::assistant("ok"));
        let policy = RetryPolicy::new(3).with_jitter(false);

        let started = tokio::time::Instant::now();
        invoke_with_retry(&model, ChatRequest::default(), &policy)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}
