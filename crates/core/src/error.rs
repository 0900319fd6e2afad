//! Error types for the RelayMind domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all RelayMind operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Inference errors ---
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    // --- History errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of a single call to the remote text-generation endpoint.
///
/// None of these ever reach the user: the relay maps every variant to the
/// configured fallback reply.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Endpoint returned no generated text")]
    EmptyResponse,

    #[error("Inference backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Unauthorized sender: {sender_id} on {channel}")]
    Unauthorized { channel: String, sender_id: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_error_displays_correctly() {
        let err = Error::Inference(InferenceError::ApiError {
            status_code: 503,
            message: "Model is loading".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("Model is loading"));
    }

    #[test]
    fn history_error_converts_into_top_level() {
        let err: Error = HistoryError::Storage("disk full".into()).into();
        assert!(matches!(err, Error::History(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn channel_error_displays_correctly() {
        let err = Error::Channel(ChannelError::DeliveryFailed {
            channel: "telegram".into(),
            reason: "chat not found".into(),
        });
        assert!(err.to_string().contains("telegram"));
        assert!(err.to_string().contains("chat not found"));
    }
}
