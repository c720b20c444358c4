use thiserror::Error;

use gigdesk_types::api::ErrorBody;

/// Backend message for an accept on an order that already left `Open`.
pub const NOT_OPEN_FOR_ACCEPTANCE: &str = "Order is not open for acceptance";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unauthorized")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("request failed with status {status}: {}", message.as_deref().unwrap_or("no details"))]
    Status { status: u16, message: Option<String> },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Classify a non-2xx response using its status and the optional JSON error body.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .unwrap_or_default()
            .message;

        if status == 401 {
            return Self::Unauthorized;
        }
        if status == 409 || message.as_deref() == Some(NOT_OPEN_FOR_ACCEPTANCE) {
            return Self::Conflict(message.unwrap_or_else(|| "conflict".into()));
        }
        Self::Status { status, message }
    }

    /// Message supplied by the server, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Conflict(m) => Some(m),
            Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Transient failures worth offering a retry for.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }
}
