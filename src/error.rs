//! Error types for the cartoonify workflow.

use std::time::Duration;

/// Phrases the Gemini API uses when the supplied key is unusable.
pub const CREDENTIAL_ERROR_PHRASES: [&str; 2] =
    ["API key not valid", "Requested entity was not found."];

/// Message shown when the credential was rejected server-side.
pub const INVALID_KEY_MESSAGE: &str = "Your API key is not valid. Please select a valid key.";

/// Errors that can occur while cartoonifying an image.
#[derive(Debug, thiserror::Error)]
pub enum CartoonifyError {
    /// Source image is not a `data:<mime>;base64,<payload>` string.
    #[error("{0}")]
    InvalidDataUrl(String),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// API key missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The model answered but returned no image part.
    #[error("The model did not return an image. Please try again.")]
    NoImage,

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The credential picker could not be opened.
    #[error("could not open key selection: {0}")]
    Dialog(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay from the `Retry-After` header, if sent.
        retry_after: Option<Duration>,
    },

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[cfg(feature = "gemini")]
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The background generation task panicked or was torn down.
    #[error("generation task failed: {0}")]
    Task(String),

    /// The workflow event loop has shut down.
    #[error("workflow is no longer running")]
    WorkflowClosed,
}

impl CartoonifyError {
    /// Returns true if this error means the credential should be re-selected.
    ///
    /// Besides [`CartoonifyError::Auth`], any error whose message carries one of
    /// [`CREDENTIAL_ERROR_PHRASES`] counts, since the API reports bad keys as
    /// plain 400 responses.
    pub fn is_credential_error(&self) -> bool {
        if matches!(self, Self::Auth(_)) {
            return true;
        }
        let text = self.to_string();
        CREDENTIAL_ERROR_PHRASES
            .iter()
            .any(|phrase| text.contains(phrase))
    }

    /// Message to show the user for this error.
    pub fn user_message(&self) -> String {
        if self.is_credential_error() {
            INVALID_KEY_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Extracts a readable message from a provider error body.
///
/// Google error bodies look like `{"error": {"message": "..."}}`; anything else is
/// used as-is. Whitespace is collapsed and the result truncated to 500 chars.
#[cfg(feature = "gemini")]
pub(crate) fn sanitize_error_message(body: &str) -> String {
    let extracted = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    let collapsed = extracted.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > 500 {
        let truncated: String = collapsed.chars().take(500).collect();
        format!("{truncated}...")
    } else {
        collapsed
    }
}

/// Reads a `Retry-After` header expressed in seconds.
#[cfg(feature = "gemini")]
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Result type alias for cartoonify operations.
pub type Result<T> = std::result::Result<T, CartoonifyError>;
