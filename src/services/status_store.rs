//! Scan records keyed by request id.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::medicine::IdentificationResult;
use crate::models::scan::{ScanFailure, ScanRecord, ScanRequest, ScanStatus};

/// In-memory status store.
///
/// Writes to one request id are serialized by the owning shard lock; writes
/// to different ids proceed concurrently. Status changes are monotonic.
#[derive(Debug, Default)]
pub struct StatusStore {
    records: DashMap<Uuid, ScanRecord>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a freshly submitted request.
    pub fn insert(&self, request: ScanRequest) -> Result<(), StatusError> {
        match self.records.entry(request.request_id) {
            Entry::Occupied(_) => Err(StatusError::Duplicate(request.request_id)),
            Entry::Vacant(slot) => {
                slot.insert(ScanRecord::new(request));
                Ok(())
            }
        }
    }

    pub fn contains(&self, request_id: &Uuid) -> bool {
        self.records.contains_key(request_id)
    }

    pub fn get(&self, request_id: &Uuid) -> Option<ScanRecord> {
        self.records.get(request_id).map(|r| r.value().clone())
    }

    pub fn status(&self, request_id: &Uuid) -> Option<ScanStatus> {
        self.records.get(request_id).map(|r| r.status())
    }

    /// Move a request forward. `result` is attached on `Done`, `failure` on
    /// `Failed`; both are ignored for other statuses.
    pub fn set_status(
        &self,
        request_id: &Uuid,
        status: ScanStatus,
        result: Option<Arc<IdentificationResult>>,
        failure: Option<ScanFailure>,
    ) -> Result<ScanStatus, StatusError> {
        let mut record = self
            .records
            .get_mut(request_id)
            .ok_or(StatusError::NotFound(*request_id))?;

        let current = record.status();
        if !current.can_transition_to(status) {
            return Err(StatusError::InvalidTransition {
                request_id: *request_id,
                from: current,
                to: status,
            });
        }

        record.request.status = status;
        record.updated_at = Utc::now();
        match status {
            ScanStatus::Done => record.result = result,
            ScanStatus::Failed => record.failure = failure,
            _ => {}
        }
        Ok(status)
    }

    /// Drop terminal records that have not changed for longer than `retention`.
    pub fn purge_expired(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;
        let before = self.records.len();
        self.records
            .retain(|_, record| !(record.status().is_terminal() && record.updated_at < cutoff));
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StatusError {
    #[error("Unknown request id {0}")]
    NotFound(Uuid),

    #[error("Request id {0} already submitted")]
    Duplicate(Uuid),

    #[error("Request {request_id} cannot move from {from} to {to}")]
    InvalidTransition {
        request_id: Uuid,
        from: ScanStatus,
        to: ScanStatus,
    },
}
