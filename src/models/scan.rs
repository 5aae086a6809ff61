use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::fingerprint::ContentHash;
use crate::models::medicine::IdentificationResult;

/// Lifecycle of a scan request.
///
/// Transitions only move forward: `Pending -> Running -> Done | Failed`.
/// `Cancelled` is terminal and reachable from `Pending` or `Running`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl ScanStatus {
    fn rank(self) -> u8 {
        match self {
            ScanStatus::Pending => 0,
            ScanStatus::Running => 1,
            ScanStatus::Done | ScanStatus::Failed | ScanStatus::Cancelled => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether moving from `self` to `next` keeps the status sequence monotonic.
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// A single client submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRequest {
    pub request_id: Uuid,
    pub fingerprint: ContentHash,
    pub submitted_at: DateTime<Utc>,
    pub status: ScanStatus,
}

impl ScanRequest {
    pub fn new(request_id: Uuid, fingerprint: ContentHash) -> Self {
        Self {
            request_id,
            fingerprint,
            submitted_at: Utc::now(),
            status: ScanStatus::Pending,
        }
    }
}

/// Why a scan ended in `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
pub enum FailureKind {
    InferenceError,
    LeaseTimeout,
}

/// Final error payload of a failed scan. Written once, never changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanFailure {
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

/// What the status store holds for a request id.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub request: ScanRequest,
    pub result: Option<Arc<IdentificationResult>>,
    pub failure: Option<ScanFailure>,
    pub updated_at: DateTime<Utc>,
}

impl ScanRecord {
    pub fn new(request: ScanRequest) -> Self {
        let updated_at = request.submitted_at;
        Self {
            request,
            result: None,
            failure: None,
            updated_at,
        }
    }

    pub fn status(&self) -> ScanStatus {
        self.request.status
    }
}
