//! Inference backends for RelayMind.
//!
//! All backends implement `relaymind_core::InferenceBackend`.
//! `build_from_config` wires the configured endpoint behind the admission
//! limiter.

pub mod huggingface;
pub mod limiter;

pub use huggingface::HuggingFaceProvider;
pub use limiter::AdmissionLimiter;

use relaymind_config::InferenceConfig;
use relaymind_core::error::InferenceError;
use relaymind_core::inference::InferenceBackend;
use std::sync::Arc;
use std::time::Duration;

/// Build the configured endpoint client wrapped in its admission limit.
pub fn build_from_config(
    config: &InferenceConfig,
) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
    let provider = HuggingFaceProvider::new(
        &config.base_url,
        &config.api_key,
        Duration::from_secs(config.timeout_secs),
    )?;
    tracing::info!(
        base_url = %config.base_url,
        model = %config.model,
        max_concurrent = config.max_concurrent,
        "Inference backend configured"
    );
    Ok(Arc::new(AdmissionLimiter::new(
        Arc::new(provider),
        config.max_concurrent,
    )))
}
