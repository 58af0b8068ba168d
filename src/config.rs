//! Configuration for mailsort.
//!
//! Settings come from a TOML file (explicit path, `./mailsort.toml`, or
//! `<config dir>/mailsort/config.toml`), then environment overrides.
//! Credentials are normally supplied through the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::providers::ProviderId;

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sorting: SortingConfig,
}

/// Provider selection and per-provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Fallback priority order. Reversed when a caller starts elsewhere.
    #[serde(default = "default_order")]
    pub order: Vec<ProviderId>,
    /// Fallback hops allowed after the first attempt.
    #[serde(default = "default_max_fallback_hops")]
    pub max_fallback_hops: usize,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub ocr_service: OcrServiceConfig,
}

fn default_order() -> Vec<ProviderId> {
    ProviderId::ALL.to_vec()
}

fn default_max_fallback_hops() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            max_fallback_hops: default_max_fallback_hops(),
            timeout_secs: default_timeout_secs(),
            gemini: GeminiConfig::default(),
            router: RouterConfig::default(),
            ocr_service: OcrServiceConfig::default(),
        }
    }
}

/// Gemini (direct multimodal model) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_output_tokens: u32,
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            endpoint: default_gemini_endpoint(),
            temperature: default_temperature(),
            max_output_tokens: default_max_tokens(),
        }
    }
}

/// Hosted inference router (OpenAI-compatible chat completions) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_router_model")]
    pub model: String,
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_router_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_router_model() -> String {
    "Qwen/Qwen2.5-VL-7B-Instruct".to_string()
}

fn default_router_endpoint() -> String {
    "https://router.huggingface.co/v1".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_router_model(),
            endpoint: default_router_endpoint(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Self-hosted OCR service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrServiceConfig {
    /// Full URL of the extraction endpoint. The provider is unavailable
    /// without one unless a call supplies an override.
    #[serde(default)]
    pub url: Option<String>,
    /// Multipart field name carrying the image.
    #[serde(default = "default_upload_field")]
    pub upload_field: String,
    /// Host suffixes of dev tunnels that serve an interstitial warning page.
    #[serde(default = "default_tunnel_hosts")]
    pub tunnel_hosts: Vec<String>,
    /// Header sent to tunnel hosts to skip the interstitial.
    #[serde(default = "default_tunnel_header")]
    pub tunnel_header: String,
    #[serde(default = "default_tunnel_header_value")]
    pub tunnel_header_value: String,
}

fn default_upload_field() -> String {
    "file".to_string()
}

fn default_tunnel_hosts() -> Vec<String> {
    vec![
        "ngrok-free.app".to_string(),
        "ngrok-free.dev".to_string(),
        "ngrok.app".to_string(),
        "ngrok.io".to_string(),
    ]
}

fn default_tunnel_header() -> String {
    "ngrok-skip-browser-warning".to_string()
}

fn default_tunnel_header_value() -> String {
    "true".to_string()
}

impl Default for OcrServiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            upload_field: default_upload_field(),
            tunnel_hosts: default_tunnel_hosts(),
            tunnel_header: default_tunnel_header(),
            tunnel_header_value: default_tunnel_header_value(),
        }
    }
}

/// Scan history store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_enabled")]
    pub enabled: bool,
    /// SQLite database path (defaults to the user data directory).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Records below this confidence are stored as `needs_review`.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: u8,
}

fn default_store_enabled() -> bool {
    true
}

fn default_review_threshold() -> u8 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_store_enabled(),
            path: None,
            review_threshold: default_review_threshold(),
        }
    }
}

/// Sorting-center directory used when a model omits its recommendation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortingConfig {
    #[serde(default)]
    pub fill_missing: bool,
    #[serde(default)]
    pub centers: Vec<SortingCenterEntry>,
}

/// One postal-code prefix routed to a sorting center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingCenterEntry {
    pub prefix: String,
    pub id: String,
    pub name: String,
}

impl Settings {
    /// Load settings from the first config file found, then apply
    /// environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match explicit.map(Path::to_path_buf).or_else(find_config_file) {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        settings.with_env_overrides().validated()
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML config content.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validated()
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `GEMINI_API_KEY`: Gemini API key
    /// - `HF_TOKEN` / `HUGGINGFACE_API_KEY`: inference router token
    /// - `OCR_SERVICE_URL`: self-hosted OCR endpoint
    /// - `MAILSORT_PROVIDER_ORDER`: comma-separated fallback order
    /// - `MAILSORT_MAX_HOPS`: fallback hops after the first attempt
    /// - `MAILSORT_TIMEOUT_SECS`: per-call timeout
    /// - `MAILSORT_GEMINI_MODEL`, `MAILSORT_ROUTER_MODEL`: model names
    /// - `MAILSORT_DB`: scan history database path
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = env_non_empty("GEMINI_API_KEY") {
            self.providers.gemini.api_key = Some(key);
        }
        if let Some(key) = env_non_empty("HF_TOKEN").or_else(|| env_non_empty("HUGGINGFACE_API_KEY"))
        {
            self.providers.router.api_key = Some(key);
        }
        if let Some(url) = env_non_empty("OCR_SERVICE_URL") {
            self.providers.ocr_service.url = Some(url);
        }
        if let Some(order) = env_non_empty("MAILSORT_PROVIDER_ORDER") {
            let parsed: Vec<ProviderId> = order
                .split(',')
                .filter_map(|name| {
                    let id = ProviderId::from_str(name);
                    if id.is_none() {
                        warn!("Ignoring unknown provider '{}' in MAILSORT_PROVIDER_ORDER", name);
                    }
                    id
                })
                .collect();
            if !parsed.is_empty() {
                self.providers.order = parsed;
            }
        }
        if let Some(n) = env_non_empty("MAILSORT_MAX_HOPS").and_then(|v| v.parse().ok()) {
            self.providers.max_fallback_hops = n;
        }
        if let Some(n) = env_non_empty("MAILSORT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.providers.timeout_secs = n;
        }
        if let Some(model) = env_non_empty("MAILSORT_GEMINI_MODEL") {
            self.providers.gemini.model = model;
        }
        if let Some(model) = env_non_empty("MAILSORT_ROUTER_MODEL") {
            self.providers.router.model = model;
        }
        if let Some(path) = env_non_empty("MAILSORT_DB") {
            self.store.path = Some(PathBuf::from(path));
        }
        self
    }

    /// Drop duplicate providers from the order and reject an empty one.
    fn validated(mut self) -> Result<Self, ConfigError> {
        let mut seen = Vec::with_capacity(self.providers.order.len());
        for id in &self.providers.order {
            if !seen.contains(id) {
                seen.push(*id);
            }
        }
        if seen.is_empty() {
            return Err(ConfigError::Invalid(
                "providers.order must name at least one provider".to_string(),
            ));
        }
        if self.providers.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "providers.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.store.review_threshold > 100 {
            return Err(ConfigError::Invalid(
                "store.review_threshold must be between 0 and 100".to_string(),
            ));
        }
        self.providers.order = seen;
        Ok(self)
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.providers.timeout_secs)
    }

    /// Resolved scan history database path.
    pub fn database_path(&self) -> PathBuf {
        if let Some(ref path) = self.store.path {
            return path.clone();
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("mailsort"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailsort.db")
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("mailsort.toml");
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("mailsort").join("config.toml"))
        .filter(|path| path.exists())
}
