//! Orchestrator behavior against scripted fake providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use mailsort::config::SortingCenterEntry;
use mailsort::extract::normalize::parse_payload;
use mailsort::extract::{
    AttemptOutcome, ChannelSink, ErrorKind, ExtractOptions, ExtractionOrchestrator,
    FallbackPolicy, ScanStatus,
};
use mailsort::providers::{
    CallOptions, ImageInput, ProviderAdapter, ProviderError, ProviderId, RawProviderResponse,
};
use mailsort::repository::{RowId, ScanRow, ScanStore, StoreError, StoredScan};
use mailsort::sorting::SortingDirectory;

use ProviderId::*;

const GOOD: &str = r#"{"recipient":"A. Kumar","address":"12 MG Road","pin_code":"560001","city":"Bengaluru","country":"India","sorting_center_id":"BLR-1","sorting_center_name":"Bengaluru GPO","confidence":88}"#;

#[derive(Clone)]
enum Script {
    Body(&'static str),
    Status(u16, &'static str),
    ModelGone,
    Refused,
    Hang,
}

struct FakeAdapter {
    id: ProviderId,
    available: bool,
    script: Script,
    calls: AtomicUsize,
    endpoints: Mutex<Vec<Option<Url>>>,
}

impl FakeAdapter {
    fn new(id: ProviderId, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id,
            available: true,
            script,
            calls: AtomicUsize::new(0),
            endpoints: Mutex::new(Vec::new()),
        })
    }

    fn unavailable(id: ProviderId) -> Arc<Self> {
        Arc::new(Self {
            id,
            available: false,
            script: Script::Body(GOOD),
            calls: AtomicUsize::new(0),
            endpoints: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for FakeAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn availability_hint(&self) -> String {
        format!("fake {}", self.id)
    }

    async fn invoke(
        &self,
        _image: &ImageInput,
        call: &CallOptions,
    ) -> Result<RawProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(call.endpoint.clone());
        match self.script.clone() {
            Script::Body(body) => Ok(RawProviderResponse {
                status: 200,
                body: body.to_string(),
            }),
            Script::Status(status, body) => Err(ProviderError::Transport {
                status,
                body: body.to_string(),
            }),
            Script::ModelGone => Err(ProviderError::ModelUnavailable {
                model: "org/vision".to_string(),
                body: "Not Found".to_string(),
            }),
            Script::Refused => Err(ProviderError::Network(
                "error sending request: tcp connect error: Connection refused".to_string(),
            )),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(ProviderError::Network("unreachable".to_string()))
            }
        }
    }

    fn parse_envelope(&self, raw: &RawProviderResponse) -> Result<Value, ProviderError> {
        Ok(parse_payload(&raw.body)?)
    }
}

#[derive(Default)]
struct MemoryStore {
    scans: Mutex<Vec<StoredScan>>,
}

impl ScanStore for MemoryStore {
    fn insert(&self, scan: &StoredScan) -> Result<RowId, StoreError> {
        let mut scans = self.scans.lock().unwrap();
        scans.push(scan.clone());
        Ok(scans.len() as RowId)
    }

    fn get(&self, id: RowId) -> Result<Option<ScanRow>, StoreError> {
        let scans = self.scans.lock().unwrap();
        Ok(scans.get((id - 1) as usize).map(|scan| ScanRow {
            id,
            scan: scan.clone(),
        }))
    }

    fn recent(&self, limit: usize) -> Result<Vec<ScanRow>, StoreError> {
        let scans = self.scans.lock().unwrap();
        Ok(scans
            .iter()
            .enumerate()
            .rev()
            .take(limit)
            .map(|(i, scan)| ScanRow {
                id: i as RowId + 1,
                scan: scan.clone(),
            })
            .collect())
    }
}

struct FailingStore;

fn disk_full() -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
}

impl ScanStore for FailingStore {
    fn insert(&self, _scan: &StoredScan) -> Result<RowId, StoreError> {
        Err(disk_full())
    }

    fn get(&self, _id: RowId) -> Result<Option<ScanRow>, StoreError> {
        Err(disk_full())
    }

    fn recent(&self, _limit: usize) -> Result<Vec<ScanRow>, StoreError> {
        Err(disk_full())
    }
}

fn orchestrator(adapters: &[Arc<FakeAdapter>], max_hops: usize) -> ExtractionOrchestrator {
    let adapters: Vec<Arc<dyn ProviderAdapter>> = adapters
        .iter()
        .map(|adapter| Arc::clone(adapter) as Arc<dyn ProviderAdapter>)
        .collect();
    ExtractionOrchestrator::new(
        adapters,
        FallbackPolicy::new(vec![OcrService, Router, Gemini], max_hops),
    )
}

fn image() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F']
}

fn tried(attempts: &[mailsort::extract::AttemptRecord]) -> Vec<ProviderId> {
    attempts.iter().map(|a| a.provider).collect()
}

#[tokio::test]
async fn test_first_provider_success() {
    let ocr = FakeAdapter::new(OcrService, Script::Body(GOOD));
    let router = FakeAdapter::new(Router, Script::Body(GOOD));
    let orch = orchestrator(&[ocr.clone(), router.clone()], 2);

    let outcome = orch.extract(image(), ExtractOptions::default()).await.unwrap();

    assert_eq!(outcome.provider, OcrService);
    assert_eq!(outcome.record.postal_code, "560001");
    assert_eq!(outcome.record.confidence, 88);
    assert_eq!(outcome.status, ScanStatus::Extracted);
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Success);
    assert_eq!(router.calls(), 0);
    assert!(outcome.row_id.is_none());
}

#[tokio::test]
async fn test_service_unavailable_with_no_other_credentials() {
    let ocr = FakeAdapter::new(OcrService, Script::Status(502, "Bad Gateway"));
    let router = FakeAdapter::unavailable(Router);
    let gemini = FakeAdapter::unavailable(Gemini);
    let orch = orchestrator(&[ocr.clone(), router.clone(), gemini.clone()], 2);

    let err = orch.extract(image(), ExtractOptions::default()).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    assert_eq!(err.attempts.len(), 1);
    assert_eq!(err.provider, Some(OcrService));
    assert_eq!(err.to_string(), ErrorKind::ServiceUnavailable.user_message());
    assert_eq!(ocr.calls(), 1);
    assert_eq!(router.calls(), 0);
    assert_eq!(gemini.calls(), 0);
}

#[tokio::test]
async fn test_model_not_found_moves_to_next_provider() {
    let ocr = FakeAdapter::new(OcrService, Script::Body(GOOD));
    let router = FakeAdapter::new(Router, Script::ModelGone);
    let gemini = FakeAdapter::new(Gemini, Script::Body(GOOD));
    let orch = orchestrator(&[ocr.clone(), router.clone(), gemini.clone()], 2);

    let options = ExtractOptions {
        preferred_provider: Some(Router),
        ..Default::default()
    };
    let outcome = orch.extract(image(), options).await.unwrap();

    // Starting at router walks the order in reverse: router then gemini.
    assert_eq!(tried(&outcome.attempts), vec![Router, Gemini]);
    assert_eq!(outcome.attempts[0].error_kind, Some(ErrorKind::ModelNotFound));
    assert_eq!(outcome.provider, Gemini);
    assert_eq!(router.calls(), 1);
    assert_eq!(ocr.calls(), 0);
}

#[tokio::test]
async fn test_all_fail_each_tried_once() {
    let ocr = FakeAdapter::new(OcrService, Script::Status(503, "busy"));
    let router = FakeAdapter::new(Router, Script::Status(429, "slow down"));
    let gemini = FakeAdapter::new(Gemini, Script::Status(503, "overloaded"));
    let orch = orchestrator(&[ocr.clone(), router.clone(), gemini.clone()], 2);

    let err = orch.extract(image(), ExtractOptions::default()).await.unwrap_err();

    assert_eq!(tried(&err.attempts), vec![OcrService, Router, Gemini]);
    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    assert_eq!(err.provider, Some(Gemini));
    for adapter in [&ocr, &router, &gemini] {
        assert_eq!(adapter.calls(), 1);
    }
}

#[tokio::test]
async fn test_hop_budget_limits_attempts() {
    let ocr = FakeAdapter::new(OcrService, Script::Refused);
    let router = FakeAdapter::new(Router, Script::Refused);
    let gemini = FakeAdapter::new(Gemini, Script::Body(GOOD));
    let orch = orchestrator(&[ocr.clone(), router.clone(), gemini.clone()], 1);

    let err = orch.extract(image(), ExtractOptions::default()).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(tried(&err.attempts), vec![OcrService, Router]);
    assert_eq!(gemini.calls(), 0);
}

#[tokio::test]
async fn test_missing_credentials_skipped_without_budget() {
    let ocr = FakeAdapter::new(OcrService, Script::Status(401, "Unauthorized"));
    let router = FakeAdapter::unavailable(Router);
    let gemini = FakeAdapter::new(Gemini, Script::Body(GOOD));
    let orch = orchestrator(&[ocr.clone(), router.clone(), gemini.clone()], 1);

    let outcome = orch.extract(image(), ExtractOptions::default()).await.unwrap();

    assert_eq!(tried(&outcome.attempts), vec![OcrService, Gemini]);
    assert_eq!(outcome.attempts[0].error_kind, Some(ErrorKind::AuthFailure));
    assert_eq!(router.calls(), 0);
}

#[tokio::test]
async fn test_malformed_success_falls_back() {
    let ocr = FakeAdapter::new(OcrService, Script::Body("<html>tunnel warning</html>"));
    let router = FakeAdapter::new(Router, Script::Body(GOOD));
    let orch = orchestrator(&[ocr.clone(), router.clone()], 2);

    let outcome = orch.extract(image(), ExtractOptions::default()).await.unwrap();

    assert_eq!(
        outcome.attempts[0].error_kind,
        Some(ErrorKind::MalformedResponse)
    );
    assert_eq!(outcome.provider, Router);
}

#[tokio::test]
async fn test_empty_object_yields_blank_record() {
    let ocr = FakeAdapter::new(OcrService, Script::Body("{}"));
    let orch = orchestrator(&[ocr], 2);

    let outcome = orch.extract(image(), ExtractOptions::default()).await.unwrap();

    assert!(outcome.record.is_blank());
    assert_eq!(outcome.record.confidence, 0);
    assert_eq!(outcome.status, ScanStatus::NeedsReview);
}

#[tokio::test]
async fn test_timeout_is_network_failure() {
    let ocr = FakeAdapter::new(OcrService, Script::Hang);
    let router = FakeAdapter::new(Router, Script::Body(GOOD));
    let orch = orchestrator(&[ocr.clone(), router.clone()], 2);

    let options = ExtractOptions {
        timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let outcome = orch.extract(image(), options).await.unwrap();

    assert_eq!(outcome.attempts[0].error_kind, Some(ErrorKind::Network));
    assert_eq!(outcome.provider, Router);
}

#[tokio::test]
async fn test_override_endpoint_enables_ocr_service() {
    let ocr = FakeAdapter::unavailable(OcrService);
    let router = FakeAdapter::new(Router, Script::Body(GOOD));
    let orch = orchestrator(&[ocr.clone(), router.clone()], 2);

    let endpoint = Url::parse("http://10.0.0.5:8000/extract").unwrap();
    let options = ExtractOptions {
        override_endpoint: Some(endpoint.clone()),
        ..Default::default()
    };
    let outcome = orch.extract(image(), options).await.unwrap();

    assert_eq!(outcome.provider, OcrService);
    assert_eq!(ocr.endpoints.lock().unwrap().as_slice(), &[Some(endpoint)]);

    // The override is per call only.
    let outcome = orch.extract(image(), ExtractOptions::default()).await.unwrap();
    assert_eq!(outcome.provider, Router);
}

#[tokio::test]
async fn test_persists_once_with_status() {
    let ocr = FakeAdapter::new(OcrService, Script::Status(503, ""));
    let router = FakeAdapter::new(
        Router,
        Script::Body(r#"{"recipient":"B. Rao","pin_code":"110001","confidence":0.4}"#),
    );
    let store = Arc::new(MemoryStore::default());
    let orch = orchestrator(&[ocr, router], 2).with_store(store.clone());

    let outcome = orch.extract(image(), ExtractOptions::default()).await.unwrap();

    assert_eq!(outcome.row_id, Some(1));
    assert_eq!(outcome.status, ScanStatus::NeedsReview);
    let scans = store.scans.lock().unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].scan_id, outcome.scan_id);
    assert_eq!(scans[0].provider, Router);
    assert_eq!(scans[0].record.confidence, 40);
}

#[tokio::test]
async fn test_failed_extraction_stores_nothing() {
    let ocr = FakeAdapter::new(OcrService, Script::Status(503, ""));
    let store = Arc::new(MemoryStore::default());
    let orch = orchestrator(&[ocr], 2).with_store(store.clone());

    assert!(orch.extract(image(), ExtractOptions::default()).await.is_err());
    assert!(store.scans.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_store_failure_does_not_fail_extraction() {
    let ocr = FakeAdapter::new(OcrService, Script::Body(GOOD));
    let orch = orchestrator(&[ocr], 2).with_store(Arc::new(FailingStore));

    let outcome = orch.extract(image(), ExtractOptions::default()).await.unwrap();

    assert_eq!(outcome.record.recipient, "A. Kumar");
    assert!(outcome.row_id.is_none());
}

#[tokio::test]
async fn test_raw_response_events() {
    let ocr = FakeAdapter::new(OcrService, Script::Status(502, "Bad Gateway"));
    let router = FakeAdapter::new(Router, Script::Body(GOOD));
    let (sink, mut events) = ChannelSink::new();
    let orch = orchestrator(&[ocr, router], 2).with_sink(Arc::new(sink));

    orch.extract(image(), ExtractOptions::default()).await.unwrap();

    let first = events.try_recv().unwrap();
    assert_eq!(first.provider, OcrService);
    assert_eq!(first.http_status, Some(502));
    assert_eq!(first.raw_response_text, "Bad Gateway");

    let second = events.try_recv().unwrap();
    assert_eq!(second.provider, Router);
    assert_eq!(second.http_status, Some(200));
    assert_eq!(second.raw_response_text, GOOD);

    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_sorting_directory_fills_missing_center() {
    let ocr = FakeAdapter::new(
        OcrService,
        Script::Body(r#"{"text":"5 Park St","pin":"700016","confidence":75}"#),
    );
    let directory = SortingDirectory::new(vec![SortingCenterEntry {
        prefix: "700".to_string(),
        id: "CCU-1".to_string(),
        name: "Kolkata GPO".to_string(),
    }]);
    let orch = orchestrator(&[ocr], 2).with_directory(directory);

    let outcome = orch.extract(image(), ExtractOptions::default()).await.unwrap();

    assert_eq!(outcome.record.postal_code, "700016");
    assert_eq!(outcome.record.sorting_center_id, "CCU-1");
    assert_eq!(outcome.record.sorting_center_name, "Kolkata GPO");
}

#[tokio::test]
async fn test_provider_sequence_is_deterministic() {
    let ocr = FakeAdapter::new(OcrService, Script::Refused);
    let router = FakeAdapter::new(Router, Script::Status(500, "boom"));
    let gemini = FakeAdapter::new(Gemini, Script::ModelGone);
    let orch = orchestrator(&[ocr, router, gemini], 2);

    let options = ExtractOptions {
        preferred_provider: Some(Gemini),
        ..Default::default()
    };
    let first = orch.extract(image(), options.clone()).await.unwrap_err();
    let second = orch.extract(image(), options).await.unwrap_err();

    assert_eq!(tried(&first.attempts), vec![Gemini, Router, OcrService]);
    assert_eq!(tried(&first.attempts), tried(&second.attempts));
    assert_eq!(first.kind, ErrorKind::Network);
}
