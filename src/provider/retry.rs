// src/provider/retry.rs — Retry with exponential backoff for generators
//
// Retries transport trouble only: rate limits, server errors, timeouts.
// Content failures and refusals go straight back to the controller, which
// decides whether another paid attempt is worth it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Generation, GenerationError, GenerationProvider, GenerationRequest};
use crate::core::cancel::CancelSignal;

const MAX_RETRIES: u32 = 3;
const INITIAL_DELAY_MS: u64 = 1_000;
const BACKOFF_FACTOR: f64 = 2.0;
const MAX_DELAY_MS: u64 = 20_000;
const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
            backoff_factor: BACKOFF_FACTOR,
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            jitter_fraction: JITTER_FRACTION,
        }
    }
}

/// Wraps a generator and retries its transient failures. Only unbilled
/// failures are retried, since a retry bypasses the budget check. The cost
/// of every failed try is folded into whatever is finally returned.
pub struct RetryGenerator {
    inner: Arc<dyn GenerationProvider>,
    config: RetryConfig,
}

impl RetryGenerator {
    pub fn new(inner: Arc<dyn GenerationProvider>) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: Arc<dyn GenerationProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Delay before retry number `attempt` (0-indexed).
    fn delay_for_attempt(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.min(self.config.max_delay) + Duration::from_millis(100);
        }

        let base_ms = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);
        let jitter = deterministic_jitter(attempt, self.config.jitter_fraction);
        Duration::from_millis((capped_ms * jitter).max(1.0) as u64)
    }
}

/// Multiplier in [1 - fraction, 1 + fraction], stable per attempt so tests
/// are reproducible.
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = attempt.wrapping_mul(2654435761) as f64 / u32::MAX as f64;
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[async_trait]
impl GenerationProvider for RetryGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<Generation, GenerationError> {
        let mut spent = 0.0;

        for attempt in 0..=self.config.max_retries {
            match self.inner.generate(request.clone(), cancel.clone()).await {
                Ok(mut generation) => {
                    generation.cost += spent;
                    return Ok(generation);
                }
                Err(GenerationError::Transient {
                    message,
                    cost,
                    retry_after,
                }) if attempt < self.config.max_retries && cost == 0.0 => {
                    spent += cost;
                    let delay = self.delay_for_attempt(attempt, retry_after);
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        message
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(GenerationError::Cancelled { cost: spent });
                        }
                    }
                }
                Err(e) => return Err(e.plus_cost(spent)),
            }
        }

        // The final iteration always returns from inside the loop.
        Err(GenerationError::Unavailable {
            message: "All retries exhausted".into(),
            cost: spent,
        })
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> Option<f64> {
        self.inner.estimate_cost(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::cancel_pair;
    use crate::core::types::{Language, ScriptProfile};
    use std::sync::Mutex;

    struct Scripted {
        results: Mutex<Vec<Result<Generation, GenerationError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(results: Vec<Result<Generation, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn generate(
            &self,
            _request: GenerationRequest,
            _cancel: CancelSignal,
        ) -> Result<Generation, GenerationError> {
            *self.calls.lock().unwrap() += 1;
            self.results.lock().unwrap().remove(0)
        }
        fn estimate_cost(&self, _request: &GenerationRequest) -> Option<f64> {
            Some(0.5)
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(5),
            jitter_fraction: 0.0,
        }
    }

    fn transient(cost: f64) -> Result<Generation, GenerationError> {
        Err(GenerationError::Transient {
            message: "HTTP 503".into(),
            cost,
            retry_after: None,
        })
    }

    fn ok(cost: f64) -> Result<Generation, GenerationError> {
        Ok(Generation {
            dockerfile: "FROM alpine:3.20\n".into(),
            cost,
            model: "m".into(),
        })
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(ScriptProfile::new("a.sh", Language::Bash), vec![])
    }

    // ─── Backoff ────────────────────────────────────────────────

    #[test]
    fn test_delay_for_attempt_exponential() {
        let inner = Scripted::new(vec![]);
        let r = RetryGenerator::with_config(
            inner,
            RetryConfig {
                jitter_fraction: 0.0,
                ..Default::default()
            },
        );
        assert_eq!(r.delay_for_attempt(0, None), Duration::from_millis(1000));
        assert_eq!(r.delay_for_attempt(1, None), Duration::from_millis(2000));
        assert_eq!(r.delay_for_attempt(10, None), Duration::from_millis(20_000));
    }

    #[test]
    fn test_server_hint_wins() {
        let r = RetryGenerator::new(Scripted::new(vec![]));
        assert_eq!(
            r.delay_for_attempt(0, Some(Duration::from_secs(3))),
            Duration::from_millis(3100)
        );
    }

    #[test]
    fn test_jitter_bounds() {
        for attempt in 0..50 {
            let j = deterministic_jitter(attempt, 0.2);
            assert!((0.8..=1.2).contains(&j));
        }
    }

    // ─── Behaviour ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_retries_transient_and_sums_cost() {
        let inner = Scripted::new(vec![transient(0.0), transient(0.0), ok(0.03)]);
        let r = RetryGenerator::with_config(inner.clone(), fast());
        let gen = r.generate(request(), CancelSignal::never()).await.unwrap();
        assert!((gen.cost - 0.03).abs() < 1e-9);
        assert_eq!(*inner.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Scripted::new(vec![transient(0.0), transient(0.0), transient(0.0)]);
        let r = RetryGenerator::with_config(inner.clone(), fast());
        let err = r.generate(request(), CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transient { .. }));
        assert_eq!(err.cost(), 0.0);
        assert_eq!(*inner.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_billed_transient_not_retried() {
        let inner = Scripted::new(vec![transient(0.01), ok(0.01)]);
        let r = RetryGenerator::with_config(inner.clone(), fast());
        let err = r.generate(request(), CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transient { .. }));
        assert!((err.cost() - 0.01).abs() < 1e-9);
        assert_eq!(*inner.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_content_failure_not_retried() {
        let inner = Scripted::new(vec![
            transient(0.0),
            Err(GenerationError::Content {
                message: "no FROM".into(),
                cost: 0.02,
            }),
        ]);
        let r = RetryGenerator::with_config(inner.clone(), fast());
        let err = r.generate(request(), CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Content { .. }));
        assert!((err.cost() - 0.02).abs() < 1e-9);
        assert_eq!(*inner.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_not_retried() {
        let inner = Scripted::new(vec![Err(GenerationError::Unavailable {
            message: "HTTP 401".into(),
            cost: 0.0,
        })]);
        let r = RetryGenerator::with_config(inner.clone(), fast());
        let err = r.generate(request(), CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable { .. }));
        assert_eq!(*inner.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let inner = Scripted::new(vec![transient(0.0), ok(0.01)]);
        let r = RetryGenerator::with_config(
            inner.clone(),
            RetryConfig {
                initial_delay: Duration::from_secs(60),
                max_delay: Duration::from_secs(60),
                ..fast()
            },
        );
        let (handle, signal) = cancel_pair();
        let task = tokio::spawn(async move { r.generate(request(), signal).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled { .. }));
        assert_eq!(err.cost(), 0.0);
        assert_eq!(*inner.calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_estimate_delegates() {
        let r = RetryGenerator::new(Scripted::new(vec![]));
        assert_eq!(r.estimate_cost(&request()), Some(0.5));
    }
}
