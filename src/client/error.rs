//! Parking backend client errors

use reqwest::StatusCode;

/// Everything that can go wrong talking to the parking backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Superseded by a newer request or shut down. Never user-facing.
    #[error("request cancelled")]
    Cancelled,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Server { status: StatusCode, message: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Backend rejected the request: {0}")]
    Rejected(String),
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// Status code of a non-2xx response, if that is what this is.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            ClientError::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Build a [`ClientError::Server`] with an operator-readable message.
    ///
    /// `body` is the raw response body; a `message`/`error` field in it is
    /// used when present.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                ["message", "messages", "error", "exception"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
            });

        let message = match status.as_u16() {
            400 => detail.unwrap_or_else(|| "Invalid request. Please check your input.".to_string()),
            401 => "Your session has expired. Please log in again.".to_string(),
            403 => "Access denied. You do not have permission to perform this action.".to_string(),
            404 => "Resource not found. Please check the URL and try again.".to_string(),
            422 => detail.unwrap_or_else(|| "Validation error. Please check your input.".to_string()),
            500 => format!(
                "Server error: {}",
                detail.unwrap_or_else(|| "Unknown server error".to_string())
            ),
            code => detail.unwrap_or_else(|| format!("Server error ({code}). Please try again.")),
        };

        ClientError::Server { status, message }
    }
}
