use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::models::fingerprint::ContentHash;
use crate::models::medicine::IdentificationResult;
use crate::models::scan::{ScanFailure, ScanRecord, ScanStatus};

/// Response after submitting a scan.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub request_id: Uuid,
    pub status: ScanStatus,
}

/// Response for polling a scan.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanStatusResponse {
    pub request_id: Uuid,
    pub status: ScanStatus,
    pub fingerprint: ContentHash,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<IdentificationResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ScanFailure>,
}

impl From<ScanRecord> for ScanStatusResponse {
    fn from(record: ScanRecord) -> Self {
        Self {
            request_id: record.request.request_id,
            status: record.request.status,
            fingerprint: record.request.fingerprint,
            submitted_at: record.request.submitted_at,
            result: record.result.map(|r| (*r).clone()),
            error: record.failure,
        }
    }
}

/// Error kinds that cross the service boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
pub enum ErrorKind {
    ValidationError,
    Overloaded,
    NotFound,
    InternalError,
}

/// Structured error body: `{kind, message}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}
