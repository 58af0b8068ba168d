//! Extraction orchestrator.
//!
//! Drives one `extract()` call through an explicit state machine:
//!
//! ```text
//! Idle -> Attempting(p) -> Succeeded
//!                       -> Deciding(kind, tried) -> Attempting(next) | Exhausted
//! ```
//!
//! Attempts are sequential. Each provider is tried at most once per call
//! and the fallback budget bounds the number of hops.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::classify::{classify, ErrorKind};
use super::fallback::{CredentialSet, Decision, ExhaustReason, FallbackPolicy};
use super::normalize::normalize;
use super::observe::{RawResponseEvent, ResponseSink, TracingSink};
use super::record::{ExtractionRecord, ScanStatus};
use crate::config::Settings;
use crate::providers::{
    CallOptions, GeminiAdapter, ImageInput, OcrServiceAdapter, ProviderAdapter, ProviderError,
    ProviderId, RawProviderResponse, RouterAdapter,
};
use crate::repository::{RowId, ScanStore, StoredScan};
use crate::sorting::SortingDirectory;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Provider to try first. Starting anywhere but the head of the
    /// configured order walks the order in reverse.
    pub preferred_provider: Option<ProviderId>,
    /// Model to use instead of the configured one.
    pub model_hint: Option<String>,
    /// Self-hosted OCR endpoint for this call only.
    pub override_endpoint: Option<Url>,
    /// Timeout for each provider attempt.
    pub timeout: Option<Duration>,
}

/// Result of one provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One provider attempt within a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub provider: ProviderId,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Successful extraction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub record: ExtractionRecord,
    pub scan_id: String,
    pub provider: ProviderId,
    pub status: ScanStatus,
    /// Row id in the scan store, absent when nothing was stored.
    pub row_id: Option<RowId>,
    pub attempts: Vec<AttemptRecord>,
}

/// Failed extraction, after every allowed provider was tried.
///
/// Displays as the user-facing message only; the raw cause is kept in
/// `detail` for logs.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Last provider attempted, if any.
    pub provider: Option<ProviderId>,
    pub detail: String,
    pub attempts: Vec<AttemptRecord>,
}

impl ClassifiedError {
    pub fn message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind.user_message())
    }
}

impl std::error::Error for ClassifiedError {}

/// Orchestrator states.
#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Attempting(ProviderId),
    Deciding {
        kind: ErrorKind,
        detail: String,
    },
    Succeeded(ProviderId, ExtractionRecord),
    Exhausted {
        reason: ExhaustReason,
        kind: ErrorKind,
        detail: String,
    },
}

/// Coordinates adapters, classification, fallback and persistence.
pub struct ExtractionOrchestrator {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    credentials: CredentialSet,
    policy: FallbackPolicy,
    store: Option<Arc<dyn ScanStore>>,
    sink: Arc<dyn ResponseSink>,
    directory: Option<SortingDirectory>,
    review_threshold: u8,
    timeout: Duration,
}

impl ExtractionOrchestrator {
    /// Build from adapters and a policy. Credential availability is read
    /// from the adapters once, here.
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>, policy: FallbackPolicy) -> Self {
        let credentials = CredentialSet::from_adapters(&adapters);
        Self {
            adapters,
            credentials,
            policy,
            store: None,
            sink: Arc::new(TracingSink),
            directory: None,
            review_threshold: 60,
            timeout: Duration::from_secs(60),
        }
    }

    /// Build the three HTTP adapters and the policy from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(OcrServiceAdapter::from_settings(settings)?),
            Arc::new(RouterAdapter::from_settings(settings)?),
            Arc::new(GeminiAdapter::from_settings(settings)?),
        ];
        let mut orchestrator = Self::new(adapters, FallbackPolicy::from_settings(settings))
            .with_review_threshold(settings.store.review_threshold)
            .with_timeout(settings.timeout());
        orchestrator.directory = SortingDirectory::from_settings(settings);
        Ok(orchestrator)
    }

    pub fn with_store(mut self, store: Arc<dyn ScanStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResponseSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_directory(mut self, directory: SortingDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_review_threshold(mut self, threshold: u8) -> Self {
        self.review_threshold = threshold.min(100);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    pub fn adapters(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.adapters
    }

    fn adapter(&self, id: ProviderId) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.iter().find(|adapter| adapter.id() == id)
    }

    /// Extract an address from an envelope image.
    pub async fn extract(
        &self,
        image_bytes: Vec<u8>,
        options: ExtractOptions,
    ) -> Result<ExtractionOutcome, ClassifiedError> {
        let image = ImageInput::new(image_bytes);
        if image.is_empty() {
            return Err(ClassifiedError {
                kind: ErrorKind::MalformedResponse,
                provider: None,
                detail: "empty image".to_string(),
                attempts: Vec::new(),
            });
        }

        let credentials = match options.override_endpoint {
            Some(_) => self.credentials.with(ProviderId::OcrService),
            None => self.credentials.clone(),
        };
        let timeout = options.timeout.unwrap_or(self.timeout);
        let call = CallOptions {
            model_hint: options.model_hint.clone(),
            endpoint: options.override_endpoint.clone(),
            timeout: Some(timeout),
        };
        let preferred = options.preferred_provider;

        let mut tried: Vec<ProviderId> = Vec::new();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut state = State::Idle;

        loop {
            state = match state {
                State::Idle => match self.policy.start(preferred, &credentials) {
                    Decision::Attempt(id) => State::Attempting(id),
                    Decision::Exhausted(reason) => State::Exhausted {
                        reason,
                        kind: ErrorKind::AuthFailure,
                        detail: "no provider has credentials configured".to_string(),
                    },
                },

                State::Attempting(id) => {
                    tried.push(id);
                    let started_at = Utc::now();
                    info!(provider = %id, attempt = tried.len(), "Attempting extraction");

                    match self.attempt(id, &image, &call, timeout).await {
                        Ok(record) => {
                            attempts.push(AttemptRecord {
                                provider: id,
                                started_at,
                                outcome: AttemptOutcome::Success,
                                error_kind: None,
                            });
                            State::Succeeded(id, record)
                        }
                        Err(err) => {
                            let kind = classify(&err);
                            warn!(provider = %id, kind = %kind, "Provider failed: {}", err);
                            attempts.push(AttemptRecord {
                                provider: id,
                                started_at,
                                outcome: AttemptOutcome::Failure,
                                error_kind: Some(kind),
                            });
                            State::Deciding {
                                kind,
                                detail: err.to_string(),
                            }
                        }
                    }
                }

                State::Deciding { kind, detail } => {
                    match self.policy.next(preferred, &tried, &credentials) {
                        Decision::Attempt(next) => {
                            info!(
                                from = ?tried.last(),
                                to = %next,
                                kind = %kind,
                                "Falling back to next provider"
                            );
                            State::Attempting(next)
                        }
                        Decision::Exhausted(reason) => State::Exhausted {
                            reason,
                            kind,
                            detail,
                        },
                    }
                }

                State::Succeeded(provider, record) => {
                    return Ok(self.finish(provider, record, attempts).await);
                }

                State::Exhausted {
                    reason,
                    kind,
                    detail,
                } => {
                    warn!(
                        reason = reason.as_str(),
                        kind = %kind,
                        attempts = attempts.len(),
                        "Extraction failed: {}",
                        detail
                    );
                    return Err(ClassifiedError {
                        kind,
                        provider: tried.last().copied(),
                        detail,
                        attempts,
                    });
                }
            };
        }
    }

    /// One provider attempt: invoke under the timeout, emit the raw
    /// response, then parse and normalize.
    async fn attempt(
        &self,
        id: ProviderId,
        image: &ImageInput,
        call: &CallOptions,
        timeout: Duration,
    ) -> Result<ExtractionRecord, ProviderError> {
        let adapter = self
            .adapter(id)
            .ok_or_else(|| ProviderError::MissingCredential(format!("no adapter for {}", id)))?;

        let result = match tokio::time::timeout(timeout, adapter.invoke(image, call)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        };

        let raw: RawProviderResponse = match result {
            Ok(raw) => {
                self.sink.emit(RawResponseEvent {
                    provider: id,
                    http_status: Some(raw.status),
                    raw_response_text: raw.body.clone(),
                });
                raw
            }
            Err(err) => {
                self.sink.emit(RawResponseEvent {
                    provider: id,
                    http_status: err.http_status(),
                    raw_response_text: err
                        .body()
                        .map(str::to_string)
                        .unwrap_or_else(|| err.to_string()),
                });
                return Err(err);
            }
        };

        let payload = adapter.parse_envelope(&raw)?;
        let record = normalize(&payload)?;
        debug!(provider = %id, confidence = record.confidence, "Normalized response");
        Ok(record)
    }

    /// Fill the sorting center if configured, derive the status and persist once.
    async fn finish(
        &self,
        provider: ProviderId,
        mut record: ExtractionRecord,
        attempts: Vec<AttemptRecord>,
    ) -> ExtractionOutcome {
        if let Some(ref directory) = self.directory {
            if directory.fill_missing(&mut record) {
                debug!(
                    postal_code = %record.postal_code,
                    center = %record.sorting_center_id,
                    "Filled sorting center from directory"
                );
            }
        }

        let status = ScanStatus::for_confidence(record.confidence, self.review_threshold);
        let scan = StoredScan {
            scan_id: Uuid::new_v4().to_string(),
            provider,
            status,
            record,
            created_at: Utc::now(),
        };

        let row_id = match self.store {
            Some(ref store) => persist(Arc::clone(store), scan.clone()).await,
            None => None,
        };

        info!(
            provider = %provider,
            scan_id = %scan.scan_id,
            confidence = scan.record.confidence,
            status = %status,
            "Extraction succeeded"
        );

        ExtractionOutcome {
            record: scan.record,
            scan_id: scan.scan_id,
            provider,
            status,
            row_id,
            attempts,
        }
    }
}

/// Insert on the blocking pool. Failures are logged and swallowed.
async fn persist(store: Arc<dyn ScanStore>, scan: StoredScan) -> Option<RowId> {
    let scan_id = scan.scan_id.clone();
    match tokio::task::spawn_blocking(move || store.insert(&scan)).await {
        Ok(Ok(row_id)) => Some(row_id),
        Ok(Err(e)) => {
            warn!(scan_id = %scan_id, "Failed to store scan: {}", e);
            None
        }
        Err(e) => {
            warn!(scan_id = %scan_id, "Store task failed: {}", e);
            None
        }
    }
}
