//! Vision provider adapters.
//!
//! Each backend gets one adapter that knows how to build its request from an
//! envelope image and how to dig the model output out of its response
//! envelope. Adapters never normalize: they hand a parsed JSON payload to
//! [`crate::extract::normalize`], which stays provider-agnostic.
//!
//! - **ocr_service**: self-hosted OCR service, multipart upload
//! - **router**: hosted inference router, OpenAI-style chat completions
//! - **gemini**: Google Gemini `generateContent`, inline image data

mod gemini;
mod ocr_service;
mod router;

pub use gemini::GeminiAdapter;
pub use ocr_service::OcrServiceAdapter;
pub use router::RouterAdapter;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::extract::normalize::NormalizeError;

/// Instruction sent to the model-backed providers.
pub const EXTRACTION_PROMPT: &str = "You are reading the front of a mail envelope. \
Extract the recipient's postal address and recommend the mail sorting center that should handle it. \
Respond with a single strict JSON object and nothing else, with exactly these 9 keys: \
\"recipient\", \"address\", \"pin_code\", \"city\", \"region\", \"country\", \
\"sorting_center_id\", \"sorting_center_name\", \"confidence\". \
All values are strings except \"confidence\", which is an integer from 0 to 100 describing how sure you are. \
Use an empty string for anything you cannot read. Do not wrap the JSON in markdown.";

/// Errors from provider adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("Model {model} unavailable (HTTP 404): {body}")]
    ModelUnavailable { model: String, body: String },

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid request: {0}")]
    Request(String),
}

impl ProviderError {
    /// Map a reqwest failure, keeping the source chain so markers like
    /// "connection refused" survive into classification.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return ProviderError::Request(error_chain(&err));
        }
        ProviderError::Network(error_chain(&err))
    }

    /// HTTP status carried by the failure, if the backend answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::Transport { status, .. } => Some(*status),
            ProviderError::ModelUnavailable { .. } => Some(404),
            _ => None,
        }
    }

    /// Raw response body carried by the failure, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            ProviderError::Transport { body, .. } | ProviderError::ModelUnavailable { body, .. } => {
                Some(body)
            }
            _ => None,
        }
    }
}

impl From<NormalizeError> for ProviderError {
    fn from(err: NormalizeError) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Known providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Self-hosted OCR service.
    OcrService,
    /// Hosted inference router (chat completions).
    Router,
    /// Direct multimodal model (Gemini).
    Gemini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::OcrService, ProviderId::Router, ProviderId::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OcrService => "ocr_service",
            ProviderId::Router => "router",
            ProviderId::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ocr_service" | "ocr-service" | "ocr" | "render" => Some(ProviderId::OcrService),
            "router" | "hf" | "huggingface" => Some(ProviderId::Router),
            "gemini" => Some(ProviderId::Gemini),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Envelope image handed to an adapter.
#[derive(Debug, Clone)]
pub struct ImageInput {
    bytes: Vec<u8>,
    mime_type: String,
    extension: String,
}

impl ImageInput {
    /// Wrap raw image bytes, sniffing the MIME type from the content.
    /// Unrecognized content is sent as JPEG.
    pub fn new(bytes: Vec<u8>) -> Self {
        let (mime_type, extension) = infer::get(&bytes)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| (kind.mime_type(), kind.extension()))
            .unwrap_or(("image/jpeg", "jpg"));

        Self {
            bytes,
            mime_type: mime_type.to_string(),
            extension: extension.to_string(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name used for multipart uploads.
    pub fn file_name(&self) -> String {
        format!("envelope.{}", self.extension)
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:` URI for chat-style image content.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Per-call options forwarded to an adapter.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Model to use instead of the configured one.
    pub model_hint: Option<String>,
    /// Endpoint to use instead of the configured one (self-hosted service).
    pub endpoint: Option<Url>,
    /// Request timeout for this call. Unset means no HTTP-level limit.
    pub timeout: Option<Duration>,
}

/// Raw response from a provider, consumed once by [`ProviderAdapter::parse_envelope`].
#[derive(Debug, Clone)]
pub struct RawProviderResponse {
    pub status: u16,
    pub body: String,
}

impl RawProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A vision backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this adapter drives.
    fn id(&self) -> ProviderId;

    /// Whether the adapter has what it needs to make a call (API key or endpoint).
    fn is_available(&self) -> bool;

    /// Human-readable hint about what's needed to make this provider available.
    fn availability_hint(&self) -> String;

    /// Send the image to the backend. Non-2xx responses are errors.
    async fn invoke(
        &self,
        image: &ImageInput,
        call: &CallOptions,
    ) -> Result<RawProviderResponse, ProviderError>;

    /// Pull the model output out of the provider's envelope and parse it as JSON.
    fn parse_envelope(&self, raw: &RawProviderResponse) -> Result<Value, ProviderError>;
}

/// Build the HTTP client shared by an adapter's calls.
///
/// No client-wide timeout: each request carries the caller's timeout.
pub(crate) fn build_client() -> Result<Client, ProviderError> {
    Client::builder()
        .build()
        .map_err(|e| ProviderError::Request(format!("Failed to create HTTP client: {}", e)))
}

/// Send a request and capture status and body text.
pub(crate) async fn send(
    provider: ProviderId,
    request: RequestBuilder,
    timeout: Option<Duration>,
) -> Result<RawProviderResponse, ProviderError> {
    let request = match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    };
    let start = Instant::now();
    let response = request.send().await.map_err(ProviderError::from_reqwest)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(ProviderError::from_reqwest)?;

    debug!(
        provider = %provider,
        status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        body_len = body.len(),
        "provider responded"
    );

    Ok(RawProviderResponse { status, body })
}

/// Turn a non-2xx response into an error. A 404 from a model invocation
/// endpoint becomes [`ProviderError::ModelUnavailable`].
pub(crate) fn check_status(
    raw: RawProviderResponse,
    model: Option<&str>,
) -> Result<RawProviderResponse, ProviderError> {
    if raw.is_success() {
        return Ok(raw);
    }
    match (raw.status, model) {
        (404, Some(model)) => Err(ProviderError::ModelUnavailable {
            model: model.to_string(),
            body: raw.body,
        }),
        (status, _) => Err(ProviderError::Transport {
            status,
            body: raw.body,
        }),
    }
}
