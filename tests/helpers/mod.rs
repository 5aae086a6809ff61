//! Test helper utilities: in-process server, upload and polling

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use reqwest::multipart;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use med_id_scan::app_state::AppState;
use med_id_scan::config::AppConfig;
use med_id_scan::models::api::{ErrorBody, ScanStatusResponse, SubmitResponse};
use med_id_scan::models::fingerprint::ContentHash;
use med_id_scan::routes;
use med_id_scan::services::catalog::MedicineCatalog;
use med_id_scan::services::recognizer::{
    InferenceError, MockRecognizer, PreparedImage, Recognition, Recognizer,
};

/// A running server bound to an ephemeral port.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub state: AppState,
}

/// Config with fast timings for tests.
pub fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        worker_count: 2,
        mock_delay_ms: 0,
        lease_timeout_ms: 5_000,
        lease_sweep_ms: 20,
        ..AppConfig::default()
    }
}

pub async fn spawn_app(config: AppConfig, recognizer: Arc<dyn Recognizer>) -> TestApp {
    let catalog = Arc::new(MedicineCatalog::builtin().expect("builtin catalog"));
    serve(AppState::with_recognizer(&config, catalog, recognizer)).await
}

/// Build everything the way the binary does, recognizer included.
pub async fn spawn_from_config(config: AppConfig) -> TestApp {
    serve(AppState::from_config(&config).expect("app state from config")).await
}

async fn serve(state: AppState) -> TestApp {
    let app = routes::with_http_layers(routes::router(state.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    TestApp {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        state,
    }
}

pub async fn spawn_mock_app(config: AppConfig) -> TestApp {
    let delay = config.mock_delay();
    spawn_app(config, Arc::new(MockRecognizer::new(delay))).await
}

impl TestApp {
    /// POST /scan and return the raw response.
    pub async fn upload(&self, image: Vec<u8>, request_id: Option<Uuid>) -> reqwest::Response {
        let mut form = multipart::Form::new().part(
            "image",
            multipart::Part::bytes(image)
                .file_name("scan.jpg")
                .mime_str("image/jpeg")
                .expect("mime"),
        );
        if let Some(id) = request_id {
            form = form.text("request_id", id.to_string());
        }

        self.client
            .post(format!("{}/scan", self.base_url))
            .multipart(form)
            .send()
            .await
            .expect("upload request")
    }

    /// Upload and expect acceptance.
    pub async fn submit(&self, image: Vec<u8>) -> SubmitResponse {
        let response = self.upload(image, None).await;
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
        response.json().await.expect("submit body")
    }

    pub async fn poll(&self, request_id: Uuid) -> ScanStatusResponse {
        let response = self
            .client
            .get(format!("{}/scan/{}", self.base_url, request_id))
            .send()
            .await
            .expect("poll request");
        assert!(response.status().is_success(), "poll returned {}", response.status());
        response.json().await.expect("status body")
    }

    /// Poll every 20ms until the scan is terminal.
    pub async fn wait_terminal(&self, request_id: Uuid, timeout: Duration) -> ScanStatusResponse {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.poll(request_id).await;
            if status.status.is_terminal() {
                return status;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "scan {} still {} after {:?}",
                request_id,
                status.status,
                timeout
            );
            sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn get_error(&self, path: &str) -> (reqwest::StatusCode, ErrorBody) {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("get request");
        let status = response.status();
        (status, response.json().await.expect("error body"))
    }
}

/// Recognizer that counts calls, records the order it saw images in and
/// answers like the mock after `delay`.
pub struct RecordingRecognizer {
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<ContentHash>>,
}

impl RecordingRecognizer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<ContentHash> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Recognizer for RecordingRecognizer {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn recognize(&self, image: &PreparedImage) -> Result<Recognition, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(image.fingerprint);
        sleep(self.delay).await;
        MockRecognizer::new(Duration::ZERO).recognize(image).await
    }
}

/// Recognizer that never answers within any reasonable lease.
pub struct HangingRecognizer {
    calls: AtomicUsize,
}

impl HangingRecognizer {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for HangingRecognizer {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn recognize(&self, _image: &PreparedImage) -> Result<Recognition, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_secs(3600)).await;
        Err(InferenceError::NoText)
    }
}

/// Stand-in for the OCR service and the openFDA label endpoint, recording
/// what the clients sent.
///
/// - `POST /ocr` answers with lines that match amlodipine.
/// - `POST /ocr/broken` answers 503.
/// - `GET /drug/label.json` knows `sertraline`, fails with 500 for
///   `crashmab` and answers 404 otherwise.
pub struct StubUpstream {
    pub base_url: String,
    log: Arc<UpstreamLog>,
}

#[derive(Default)]
struct UpstreamLog {
    label_queries: Mutex<Vec<HashMap<String, String>>>,
    ocr_requests: Mutex<Vec<OcrCall>>,
}

/// One request seen by `POST /ocr`.
#[derive(Debug, Clone)]
pub struct OcrCall {
    pub authorization: Option<String>,
    pub format: String,
    pub image_len: usize,
}

pub const SERTRALINE_LABEL: &str = r#"{
    "results": [{
        "indications_and_usage": ["Sertraline is indicated for the treatment of major depressive disorder."],
        "dosage_and_administration": ["50 mg once daily"],
        "active_ingredient": ["Sertraline hydrochloride"],
        "openfda": {
            "brand_name": ["Zoloft"],
            "generic_name": ["SERTRALINE HYDROCHLORIDE"],
            "dosage_form": ["TABLET, FILM COATED"]
        }
    }]
}"#;

pub async fn spawn_upstream() -> StubUpstream {
    let log = Arc::new(UpstreamLog::default());
    let app = Router::new()
        .route("/ocr", post(stub_ocr))
        .route("/ocr/broken", post(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/drug/label.json", get(stub_label))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("upstream server");
    });

    StubUpstream {
        base_url: format!("http://{}", addr),
        log,
    }
}

impl StubUpstream {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn label_queries(&self) -> Vec<HashMap<String, String>> {
        self.log.label_queries.lock().clone()
    }

    pub fn ocr_requests(&self) -> Vec<OcrCall> {
        self.log.ocr_requests.lock().clone()
    }
}

async fn stub_ocr(
    State(log): State<Arc<UpstreamLog>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    log.ocr_requests.lock().push(OcrCall {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        format: body["format"].as_str().unwrap_or_default().to_string(),
        image_len: body["image"].as_str().map_or(0, str::len),
    });
    Json(serde_json::json!({
        "rec_texts": ["Pharmacy", "Amlodipine", "Take one daily"],
        "rec_scores": [0.99, 0.96, 0.9]
    }))
}

async fn stub_label(
    State(log): State<Arc<UpstreamLog>>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let search = query.get("search").cloned().unwrap_or_default();
    log.label_queries.lock().push(query);

    if search.contains("sertraline") {
        (StatusCode::OK, SERTRALINE_LABEL.to_string())
    } else if search.contains("crashmab") {
        (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded".to_string())
    } else {
        (
            StatusCode::NOT_FOUND,
            r#"{"error": {"code": "NOT_FOUND", "message": "No matches found!"}}"#.to_string(),
        )
    }
}
