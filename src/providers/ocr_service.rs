//! Self-hosted OCR service adapter.
//!
//! Uploads the image as multipart form data to a configurable URL (which a
//! call may override). The service replies with structured JSON using its
//! own field names; those are remapped to the common vocabulary here.
//!
//! Dev deployments often sit behind a tunnel that serves an HTML warning
//! page to unknown clients. When the URL's host matches one of the
//! configured tunnel hosts, the configured bypass header is attached.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use super::{
    build_client, check_status, send, CallOptions, ImageInput, ProviderAdapter, ProviderError,
    ProviderId, RawProviderResponse,
};
use crate::config::{OcrServiceConfig, Settings};
use crate::extract::normalize::parse_payload;

/// Service-native keys and the common names they map to.
const NATIVE_KEYS: &[(&str, &str)] = &[("text", "address"), ("pin", "pin_code")];

/// Multipart adapter for the self-hosted OCR service.
pub struct OcrServiceAdapter {
    config: OcrServiceConfig,
    client: Client,
}

impl OcrServiceAdapter {
    pub fn new(config: OcrServiceConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            client: build_client()?,
        })
    }

    /// Build from the `[providers.ocr_service]` section.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        Self::new(settings.providers.ocr_service.clone())
    }

    /// Endpoint for this call: the override if given, else the configured URL.
    fn endpoint(&self, call: &CallOptions) -> Result<Url, ProviderError> {
        if let Some(ref url) = call.endpoint {
            return Ok(url.clone());
        }
        let configured = self
            .config
            .url
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential("OCR_SERVICE_URL".to_string()))?;
        Url::parse(configured)
            .map_err(|e| ProviderError::Request(format!("Invalid OCR service URL: {}", e)))
    }

    /// Whether the URL points at a configured tunnel host.
    fn is_tunnel(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.config.tunnel_hosts.iter().any(|suffix| {
            let suffix = suffix.trim_start_matches('.').to_lowercase();
            host == suffix || host.ends_with(&format!(".{}", suffix))
        })
    }

    fn build_form(&self, image: &ImageInput) -> Result<Form, ProviderError> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name())
            .mime_str(image.mime_type())
            .map_err(|e| ProviderError::Request(format!("Invalid image MIME type: {}", e)))?;
        Ok(Form::new().part(self.config.upload_field.clone(), part))
    }
}

/// Rename service-native keys unless the common key is already present.
fn remap_native_keys(mut object: Map<String, Value>) -> Map<String, Value> {
    for (native, common) in NATIVE_KEYS {
        if object.contains_key(*common) {
            continue;
        }
        if let Some(value) = object.remove(*native) {
            object.insert(common.to_string(), value);
        }
    }
    object
}

#[async_trait]
impl ProviderAdapter for OcrServiceAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OcrService
    }

    fn is_available(&self) -> bool {
        self.config.url.is_some()
    }

    fn availability_hint(&self) -> String {
        match self.config.url {
            None => "OCR_SERVICE_URL not set. Point it at the self-hosted extraction endpoint."
                .to_string(),
            Some(ref url) => format!("OCR service is available ({})", url),
        }
    }

    async fn invoke(
        &self,
        image: &ImageInput,
        call: &CallOptions,
    ) -> Result<RawProviderResponse, ProviderError> {
        let url = self.endpoint(call)?;
        let mut request = self
            .client
            .post(url.clone())
            .multipart(self.build_form(image)?);

        if self.is_tunnel(&url) {
            debug!(
                "OCR service behind tunnel host, sending {}",
                self.config.tunnel_header
            );
            request = request.header(
                self.config.tunnel_header.as_str(),
                self.config.tunnel_header_value.as_str(),
            );
        }

        let raw = send(ProviderId::OcrService, request, call.timeout).await?;
        check_status(raw, None)
    }

    fn parse_envelope(&self, raw: &RawProviderResponse) -> Result<Value, ProviderError> {
        match parse_payload(&raw.body)? {
            Value::Object(object) => Ok(Value::Object(remap_native_keys(object))),
            other => Ok(other),
        }
    }
}
