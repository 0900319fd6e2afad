//! Admission limit — caps concurrent in-flight inference calls.
//!
//! Wraps any backend behind a semaphore. Callers past the limit wait for a
//! permit; waiting is back-pressure, not failure.

use async_trait::async_trait;
use relaymind_core::error::InferenceError;
use relaymind_core::inference::{InferenceBackend, InferenceRequest};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// A backend wrapper that admits at most `max_concurrent` calls at a time.
pub struct AdmissionLimiter {
    name: String,
    inner: Arc<dyn InferenceBackend>,
    permits: Semaphore,
    max_concurrent: usize,
}

impl AdmissionLimiter {
    /// Wrap `inner`. A limit of zero is raised to one.
    pub fn new(inner: Arc<dyn InferenceBackend>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            name: format!("limited:{}", inner.name()),
            inner,
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    /// Configured limit.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }
}

#[async_trait]
impl InferenceBackend for AdmissionLimiter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| InferenceError::Unavailable("admission semaphore closed".into()))?;

        debug!(
            backend = %self.inner.name(),
            in_flight = self.in_flight(),
            limit = self.max_concurrent,
            "Inference permit acquired"
        );

        self.inner.generate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymind_core::inference::GenerationParams;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps briefly and records the peak number of overlapping calls.
    struct SlowBackend {
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowBackend {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, request: InferenceRequest) -> Result<String, InferenceError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("echo: {}", request.prompt))
        }
    }

    fn request(prompt: &str) -> InferenceRequest {
        InferenceRequest {
            model: "m".into(),
            prompt: prompt.into(),
            params: GenerationParams::default(),
        }
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let backend = Arc::new(SlowBackend::new());
        let limiter = Arc::new(AdmissionLimiter::new(backend.clone(), 3));

        let mut handles = Vec::new();
        for i in 0..12 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.generate(request(&i.to_string())).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }

        assert_eq!(backend.calls.load(Ordering::SeqCst), 12);
        assert!(backend.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn passes_results_through() {
        let limiter = AdmissionLimiter::new(Arc::new(SlowBackend::new()), 1);
        assert_eq!(limiter.generate(request("hi")).await.unwrap(), "echo: hi");
        assert_eq!(limiter.name(), "limited:slow");
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        let limiter = AdmissionLimiter::new(Arc::new(SlowBackend::new()), 0);
        assert_eq!(limiter.max_concurrent(), 1);
    }
}
