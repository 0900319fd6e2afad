//! Hugging Face text-generation provider.
//!
//! Works with the hosted Inference API and any endpoint that speaks the same
//! `{"inputs", "parameters"}` → `[{"generated_text"}]` contract (a local
//! text-generation-inference server, for example).

use async_trait::async_trait;
use relaymind_core::error::InferenceError;
use relaymind_core::inference::{InferenceBackend, InferenceRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A text-generation client for Hugging Face style endpoints.
pub struct HuggingFaceProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HuggingFaceProvider {
    /// Create a provider. An empty `api_key` sends anonymous requests.
    ///
    /// `timeout` bounds the whole exchange, body included.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            client,
        })
    }

    /// The hosted Inference API (convenience constructor).
    pub fn hosted(api_key: impl Into<String>, timeout: Duration) -> Result<Self, InferenceError> {
        Self::new("https://api-inference.huggingface.co/models", api_key, timeout)
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/{}", self.base_url, model.trim_start_matches('/'))
    }

    fn to_api_request(request: &InferenceRequest) -> ApiRequest<'_> {
        ApiRequest {
            inputs: &request.prompt,
            parameters: ApiParameters {
                max_new_tokens: request.params.max_new_tokens,
                temperature: request.params.temperature,
                do_sample: request.params.do_sample,
                return_full_text: false,
            },
        }
    }

    /// Extract the first generated text, trimmed.
    fn parse_generation(body: &str) -> Result<String, InferenceError> {
        let parsed: ApiResponse = serde_json::from_str(body)
            .map_err(|e| InferenceError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let first = match parsed {
            ApiResponse::Batch(items) => items.into_iter().next(),
            ApiResponse::Single(item) => Some(item),
        }
        .ok_or(InferenceError::EmptyResponse)?;

        let text = first.generated_text.trim();
        if text.is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn transport_error(e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout(e.to_string())
        } else {
            InferenceError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl InferenceBackend for HuggingFaceProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn generate(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let url = self.model_url(&request.model);
        let body = Self::to_api_request(&request);

        debug!(model = %request.model, prompt_len = request.prompt.len(), "Sending generation request");

        let mut builder = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(Self::transport_error)?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(InferenceError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Inference endpoint returned error");
            return Err(InferenceError::ApiError {
                status_code: status.as_u16(),
                message: error_message(&error_body),
            });
        }

        let text = response.text().await.map_err(Self::transport_error)?;
        Self::parse_generation(&text)
    }
}

/// Prefer the endpoint's `{"error": "..."}` message over the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string())
}

// --- Inference API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    inputs: &'a str,
    parameters: ApiParameters,
}

#[derive(Debug, Serialize)]
struct ApiParameters {
    max_new_tokens: u32,
    temperature: f32,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiResponse {
    Batch(Vec<ApiGeneration>),
    Single(ApiGeneration),
}

#[derive(Debug, Deserialize)]
struct ApiGeneration {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}
