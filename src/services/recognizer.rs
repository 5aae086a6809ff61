use async_trait::async_trait;
use base64::Engine;
use image::ImageFormat;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::models::fingerprint::ContentHash;
use crate::services::catalog::{MedicineCatalog, OcrLine, MIN_LINE_CONFIDENCE};

/// Decoded and checked image handed to a recognizer.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub fingerprint: ContentHash,
    pub bytes: Arc<[u8]>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Raw recognizer output before the worker applies the confidence policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub medicine_id: String,
    pub name: String,
    pub confidence: f64,
    pub description: String,
}

/// Turns a prepared image into a best-guess medicine identity.
#[async_trait]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recognize(&self, image: &PreparedImage) -> Result<Recognition, InferenceError>;
}

/// Stand-in recognizer: a fixed delay, then always the same paracetamol
/// result the mobile client was built against.
pub struct MockRecognizer {
    delay: Duration,
}

pub const MOCK_MEDICINE_ID: &str = "paracetamol-500mg-tablet";
pub const MOCK_MEDICINE_NAME: &str = "PARACETAMOL 500 mg TABLET";
const MOCK_DESCRIPTION: &str = "Helps relieve mild to moderate pain and reduces fever. \
Commonly used for headaches, toothaches, muscle aches, and other discomforts.";
const MOCK_CONFIDENCE: f64 = 0.92;

impl MockRecognizer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn recognize(&self, _image: &PreparedImage) -> Result<Recognition, InferenceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Recognition {
            medicine_id: MOCK_MEDICINE_ID.to_string(),
            name: MOCK_MEDICINE_NAME.to_string(),
            confidence: MOCK_CONFIDENCE,
            description: MOCK_DESCRIPTION.to_string(),
        })
    }
}

/// Client for an HTTP OCR endpoint whose text is matched against the catalog.
pub struct RemoteRecognizer {
    http: Client,
    url: String,
    api_token: Option<String>,
    catalog: Arc<MedicineCatalog>,
}

/// OCR output in the `rec_texts` / `rec_scores` layout.
#[derive(Debug, Deserialize)]
struct OcrResponse {
    rec_texts: Vec<String>,
    rec_scores: Vec<f64>,
}

impl OcrResponse {
    fn into_lines(self) -> Vec<OcrLine> {
        self.rec_texts
            .into_iter()
            .zip(self.rec_scores)
            .map(|(text, confidence)| OcrLine { text, confidence })
            .collect()
    }
}

impl RemoteRecognizer {
    pub fn new(url: String, api_token: Option<String>, catalog: Arc<MedicineCatalog>) -> Self {
        Self {
            http: Client::new(),
            url,
            api_token,
            catalog,
        }
    }

    async fn read_text(&self, image: &PreparedImage) -> Result<Vec<OcrLine>, RemoteRecognizerError> {
        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(&image.bytes[..]),
            "format": image.format.extensions_str().first().copied().unwrap_or("bin"),
        });

        let mut request = self.http.post(&self.url).json(&request_body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let ocr: OcrResponse = response.json().await?;
        Ok(ocr.into_lines())
    }
}

/// Pick a result from OCR lines: the catalog match if there is one,
/// otherwise the most confident line with no medicine id.
pub fn identify_from_lines(catalog: &MedicineCatalog, lines: &[OcrLine]) -> Option<Recognition> {
    if let Some(found) = catalog.match_lines(lines) {
        return Some(Recognition {
            medicine_id: found.entry.detail.medicine_id.clone(),
            name: found.entry.detail.name.clone(),
            confidence: found.confidence(),
            description: found.entry.detail.description.clone(),
        });
    }

    lines
        .iter()
        .filter(|l| l.confidence > MIN_LINE_CONFIDENCE && !l.text.trim().is_empty())
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|line| Recognition {
            medicine_id: String::new(),
            name: line.text.trim().to_string(),
            // Unmatched text is never a confident identification.
            confidence: (line.confidence * 0.5).clamp(0.0, 1.0),
            description: String::new(),
        })
}

#[async_trait]
impl Recognizer for RemoteRecognizer {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn recognize(&self, image: &PreparedImage) -> Result<Recognition, InferenceError> {
        let lines = self.read_text(image).await?;
        tracing::debug!(
            fingerprint = %image.fingerprint.short(),
            lines = lines.len(),
            "OCR text extracted"
        );
        identify_from_lines(&self.catalog, &lines).ok_or(InferenceError::NoText)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Decode task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Remote(#[from] RemoteRecognizerError),

    #[error("No legible text found on the package")]
    NoText,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteRecognizerError {
    #[error("OCR request failed: {0}")]
    Http(#[from] reqwest::Error),
}
