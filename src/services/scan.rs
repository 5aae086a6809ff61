use std::sync::Arc;
use uuid::Uuid;

use crate::models::fingerprint::ContentHash;
use crate::models::scan::{ScanRecord, ScanRequest};
use crate::services::dispatcher::{Admission, DispatchError, Dispatcher};
use crate::services::ingress::{Ingress, IngressError};
use crate::services::status_store::{StatusError, StatusStore};

/// Submission, polling and cancellation of scans.
pub struct ScanService {
    ingress: Ingress,
    dispatcher: Arc<Dispatcher>,
    store: Arc<StatusStore>,
}

impl ScanService {
    pub fn new(ingress: Ingress, dispatcher: Arc<Dispatcher>, store: Arc<StatusStore>) -> Self {
        Self {
            ingress,
            dispatcher,
            store,
        }
    }

    pub fn ingress(&self) -> &Ingress {
        &self.ingress
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Validate and admit an upload. Returns as soon as the request is
    /// recorded; inference happens in the worker pool.
    pub fn submit(
        &self,
        image: Vec<u8>,
        request_id: Option<&str>,
    ) -> Result<(ScanRequest, Admission), ScanError> {
        let request_id = self.ingress.request_id(request_id)?;
        let info = self.ingress.validate_image(&image)?;
        if self.store.contains(&request_id) {
            return Err(StatusError::Duplicate(request_id).into());
        }

        let fingerprint = ContentHash::of(&image);
        let request = ScanRequest::new(request_id, fingerprint);
        let admission = self.dispatcher.enqueue(request.clone(), Arc::from(image))?;
        metrics::counter!("scan_requests_total").increment(1);

        tracing::info!(
            request_id = %request_id,
            fingerprint = %fingerprint.short(),
            format = ?info.format,
            width = info.width,
            height = info.height,
            "Scan submitted"
        );

        let request = self
            .store
            .get(&request_id)
            .map(|record| record.request)
            .unwrap_or(request);
        Ok((request, admission))
    }

    pub fn status(&self, request_id: &Uuid) -> Result<ScanRecord, ScanError> {
        self.store
            .get(request_id)
            .ok_or_else(|| StatusError::NotFound(*request_id).into())
    }

    pub fn cancel(&self, request_id: &Uuid) -> Result<ScanRecord, ScanError> {
        Ok(self.dispatcher.cancel(request_id)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Invalid(#[from] IngressError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Status(#[from] StatusError),
}
