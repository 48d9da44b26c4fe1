//! Error types for fable-protocol

use thiserror::Error;

/// Result type alias using fable-protocol Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the conversation API
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (tag: {tag})")]
    Api { tag: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Not enough sparks for a premium action
    #[error("Insufficient sparks: {message}")]
    InsufficientSparks {
        message: String,
        required: Option<u32>,
    },

    /// A resource-quota ceiling was hit, orthogonal to spark balance
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The stream carried an error sentinel frame
    #[error("Stream error: {0}")]
    Stream(String),

    /// Server-sent events transport error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Stream was aborted by cancellation
    #[error("Request aborted")]
    Aborted,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create an API error from tag and message
    pub fn api(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Classify a non-2xx response body into a typed error.
    ///
    /// Bodies are expected as `{"error": <tag>, "message": <text>}` but
    /// untagged bodies still classify via status code and message text.
    pub fn from_response(status: u16, retry_after: Option<u64>, body: &str) -> Self {
        let (tag, message) = match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => (
                parsed.error.unwrap_or_default(),
                parsed.message.unwrap_or_else(|| body.to_string()),
            ),
            Err(_) => (String::new(), body.to_string()),
        };

        if status == 429 || tag_matches_rate_limit(&tag, &message) {
            return Error::RateLimited { retry_after };
        }
        if tag_matches_sparks(&tag, &message) {
            return Error::InsufficientSparks {
                message,
                required: None,
            };
        }
        if tag_matches_quota(&tag, &message) {
            return Error::QuotaExceeded(message);
        }
        if tag.is_empty() {
            Error::api(format!("http_{}", status), message)
        } else {
            Error::Api { tag, message }
        }
    }

    /// Check if this error is a rate limit
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Api { tag, message } => tag_matches_rate_limit(tag, message),
            _ => false,
        }
    }

    /// Check if this error means the user lacks sparks
    pub fn is_insufficient_sparks(&self) -> bool {
        match self {
            Error::InsufficientSparks { .. } => true,
            Error::Api { tag, message } => tag_matches_sparks(tag, message),
            _ => false,
        }
    }

    /// Check if this error is a resource-quota ceiling
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            Error::QuotaExceeded(_) => true,
            Error::Api { tag, message } => tag_matches_quota(tag, message),
            _ => false,
        }
    }

    /// Cooldown seconds carried by a rate-limit error, if any
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Spark cost carried by an insufficient-sparks error, if any
    pub fn required_sparks(&self) -> Option<u32> {
        match self {
            Error::InsufficientSparks { required, .. } => *required,
            _ => None,
        }
    }
}

fn tag_matches_rate_limit(tag: &str, message: &str) -> bool {
    let tag = tag.to_lowercase();
    let msg = message.to_lowercase();
    tag.contains("rate_limit")
        || msg.contains("rate limit")
        || msg.contains("too many requests")
        || msg.contains("429")
}

fn tag_matches_sparks(tag: &str, message: &str) -> bool {
    let tag = tag.to_lowercase();
    let msg = message.to_lowercase();
    tag.contains("insufficient_sparks")
        || msg.contains("insufficient sparks")
        || msg.contains("not enough sparks")
}

fn tag_matches_quota(tag: &str, message: &str) -> bool {
    let tag = tag.to_lowercase();
    let msg = message.to_lowercase();
    tag.contains("quota") || msg.contains("quota exceeded")
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}
