//! Inference trait — the abstraction over the remote text-generation endpoint.
//!
//! A backend receives one fully assembled prompt and returns plain generated
//! text. It holds no conversation state between calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::InferenceError;

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Upper bound on generated tokens
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    /// Temperature (0.0 = deterministic, higher = more varied)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Whether to sample instead of greedy decoding
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
}

fn default_max_new_tokens() -> u32 {
    256
}
fn default_temperature() -> f32 {
    0.7
}
fn default_do_sample() -> bool {
    true
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            do_sample: default_do_sample(),
        }
    }
}

/// One generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Model identifier on the endpoint
    pub model: String,

    /// The assembled prompt
    pub prompt: String,

    /// Sampling parameters
    #[serde(default)]
    pub params: GenerationParams,
}

/// The core InferenceBackend trait.
///
/// `generate` makes at most one attempt. On success the text is already
/// trimmed; any failure comes back as an `InferenceError` for the caller to
/// replace with its fallback reply.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "huggingface").
    fn name(&self) -> &str;

    /// Send the prompt and return the generated text.
    async fn generate(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<String, InferenceError>;
}
