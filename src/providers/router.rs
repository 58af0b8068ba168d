//! Hosted inference router adapter (OpenAI-compatible chat completions).
//!
//! The image travels as a `data:` URI inside the chat message. The router
//! answers 404 when the requested model isn't served, which is reported as
//! [`ProviderError::ModelUnavailable`] so the orchestrator moves on to
//! another provider instead of retrying this one.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    build_client, check_status, send, CallOptions, ImageInput, ProviderAdapter, ProviderError,
    ProviderId, RawProviderResponse, EXTRACTION_PROMPT,
};
use crate::config::{RouterConfig, Settings};
use crate::extract::normalize::parse_payload;

/// Chat-completions router adapter.
pub struct RouterAdapter {
    config: RouterConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ChatImageUrl },
}

#[derive(Debug, Serialize)]
struct ChatImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl RouterAdapter {
    pub fn new(config: RouterConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            client: build_client()?,
        })
    }

    /// Build from the `[providers.router]` section.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        Self::new(settings.providers.router.clone())
    }

    fn build_request(&self, image: &ImageInput, model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ChatContent::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                    ChatContent::ImageUrl {
                        image_url: ChatImageUrl {
                            url: image.data_uri(),
                        },
                    },
                ],
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ProviderAdapter for RouterAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Router
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.config.api_key.is_none() {
            "HF_TOKEN not set. Create an access token at https://huggingface.co/settings/tokens"
                .to_string()
        } else {
            format!("Inference router is available (model: {})", self.config.model)
        }
    }

    async fn invoke(
        &self,
        image: &ImageInput,
        call: &CallOptions,
    ) -> Result<RawProviderResponse, ProviderError> {
        let token = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::MissingCredential("HF_TOKEN".to_string()))?;
        let model = call.model_hint.as_deref().unwrap_or(&self.config.model);

        let request = self
            .client
            .post(self.url())
            .bearer_auth(token)
            .json(&self.build_request(image, model));

        let raw = send(ProviderId::Router, request, call.timeout).await?;
        check_status(raw, Some(model))
    }

    fn parse_envelope(&self, raw: &RawProviderResponse) -> Result<Value, ProviderError> {
        let response: ChatResponse = serde_json::from_str(&raw.body)
            .map_err(|e| ProviderError::Malformed(format!("chat completion envelope: {}", e)))?;

        if let Some(error) = response.error {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ProviderError::Request(format!("Router API error: {}", message)));
        }

        let content = response
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(parse_payload(&content)?)
    }
}
