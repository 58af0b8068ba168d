//! Failure classification for fallback decisions and user-facing messages.
//!
//! Upstream errors are mostly untyped (an HTTP status plus a body, or a
//! transport error string), so classification works on status codes first
//! and falls back to marker strings.

use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;

/// Classified failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    RateLimited,
    ServiceUnavailable,
    AuthFailure,
    MalformedResponse,
    ModelNotFound,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::ModelNotFound => "model_not_found",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// The one message shown to an operator for this kind.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Connection failed. Check your connectivity and try again.",
            ErrorKind::RateLimited => "Too many requests. Wait a moment and retry.",
            ErrorKind::ServiceUnavailable => {
                "The extraction service is temporarily unavailable. Try again later."
            }
            ErrorKind::AuthFailure => {
                "The extraction service rejected our credentials. Check the configured API keys."
            }
            ErrorKind::MalformedResponse => {
                "Could not read an address from the image. Retake the photo."
            }
            ErrorKind::ModelNotFound => {
                "The selected vision model is unavailable. Choose another provider or model."
            }
            ErrorKind::Unknown => "Address extraction failed. Please try again.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Substrings that identify a connection-level failure.
const NETWORK_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "failed to fetch",
    "error sending request",
    "network is unreachable",
    "timed out",
    "cors",
];

/// Substrings that identify a missing or rejected credential.
const AUTH_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "invalid token",
    "unauthorized",
    "permission denied",
    "invalid credential",
    "missing credential",
];

/// Classify a provider failure.
pub fn classify(error: &ProviderError) -> ErrorKind {
    match error {
        ProviderError::Transport { status, body } => {
            classify_status(*status).unwrap_or_else(|| classify_body(body))
        }
        ProviderError::ModelUnavailable { .. } => ErrorKind::ModelNotFound,
        ProviderError::MissingCredential(_) => ErrorKind::AuthFailure,
        ProviderError::Network(_) | ProviderError::Timeout(_) => ErrorKind::Network,
        ProviderError::Malformed(_) => ErrorKind::MalformedResponse,
        ProviderError::Request(message) => classify_message(message),
    }
}

/// Map an HTTP status to a kind, if the status alone decides it.
///
/// A 404 is absent here: only the adapter knows whether the
/// endpoint was a model invocation, and it reports that as
/// [`ProviderError::ModelUnavailable`].
pub fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        429 => Some(ErrorKind::RateLimited),
        502..=504 => Some(ErrorKind::ServiceUnavailable),
        401 | 403 => Some(ErrorKind::AuthFailure),
        _ => None,
    }
}

/// Classify the body of a non-2xx response.
///
/// The backend did answer, so connection markers in its text say nothing
/// about our connectivity. Only credential markers are honored.
pub fn classify_body(body: &str) -> ErrorKind {
    let lower = body.to_lowercase();
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorKind::AuthFailure
    } else {
        ErrorKind::Unknown
    }
}

/// Classify a client-side error message by marker strings.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorKind::Network
    } else if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorKind::AuthFailure
    } else {
        ErrorKind::Unknown
    }
}
