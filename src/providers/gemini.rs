//! Google Gemini vision adapter.
//!
//! Sends the envelope image inline with the extraction prompt to
//! `generateContent`. Requires `GEMINI_API_KEY`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    build_client, check_status, send, CallOptions, ImageInput, ProviderAdapter, ProviderError,
    ProviderId, RawProviderResponse, EXTRACTION_PROMPT,
};
use crate::config::{GeminiConfig, Settings};
use crate::extract::normalize::parse_payload;

/// Gemini `generateContent` adapter.
pub struct GeminiAdapter {
    config: GeminiConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiAdapter {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            client: build_client()?,
        })
    }

    /// Build from the `[providers.gemini]` section.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        Self::new(settings.providers.gemini.clone())
    }

    fn build_request(&self, image: &ImageInput) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                    GeminiPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type: image.mime_type().to_string(),
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.config.api_key.is_none() {
            "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string()
        } else {
            format!("Gemini is available (model: {})", self.config.model)
        }
    }

    async fn invoke(
        &self,
        image: &ImageInput,
        call: &CallOptions,
    ) -> Result<RawProviderResponse, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::MissingCredential("GEMINI_API_KEY".to_string()))?;
        let model = call.model_hint.as_deref().unwrap_or(&self.config.model);

        let request = self
            .client
            .post(self.url(model))
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(image));

        let raw = send(ProviderId::Gemini, request, call.timeout).await?;
        check_status(raw, Some(model))
    }

    fn parse_envelope(&self, raw: &RawProviderResponse) -> Result<Value, ProviderError> {
        let response: GeminiResponse = serde_json::from_str(&raw.body)
            .map_err(|e| ProviderError::Malformed(format!("Gemini envelope: {}", e)))?;

        if let Some(error) = response.error {
            return Err(ProviderError::Request(format!(
                "Gemini API error: {}",
                error.message
            )));
        }

        let text: String = response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(parse_payload(&text)?)
    }
}
