use dashmap::DashMap;
use std::sync::Arc;

use crate::models::medicine::MedicineDetail;
use crate::services::catalog::MedicineCatalog;
use crate::services::openfda::{OpenFdaClient, OpenFdaError};

/// Resolves medicine ids to full detail records.
pub struct MedicineDirectory {
    catalog: Arc<MedicineCatalog>,
    openfda: Option<OpenFdaClient>,
    remote_hits: DashMap<String, MedicineDetail>,
}

impl MedicineDirectory {
    pub fn new(catalog: Arc<MedicineCatalog>, openfda: Option<OpenFdaClient>) -> Self {
        Self {
            catalog,
            openfda,
            remote_hits: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<MedicineCatalog> {
        &self.catalog
    }

    /// Catalog first, then openFDA when enabled.
    pub async fn detail(&self, medicine_id: &str) -> Result<MedicineDetail, DirectoryError> {
        let medicine_id = medicine_id.trim();
        if medicine_id.is_empty() {
            return Err(DirectoryError::NotFound(String::new()));
        }

        if let Some(entry) = self.catalog.get(medicine_id) {
            return Ok(entry.detail.clone());
        }
        if let Some(hit) = self.remote_hits.get(medicine_id) {
            return Ok(hit.clone());
        }

        let Some(openfda) = &self.openfda else {
            return Err(DirectoryError::NotFound(medicine_id.to_string()));
        };

        tracing::debug!(medicine_id, "Catalog miss, querying openFDA");
        match openfda.lookup(medicine_id).await? {
            Some(detail) => {
                self.remote_hits
                    .insert(medicine_id.to_string(), detail.clone());
                Ok(detail)
            }
            None => Err(DirectoryError::NotFound(medicine_id.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Unknown medicine id {0:?}")]
    NotFound(String),

    #[error(transparent)]
    OpenFda(#[from] OpenFdaError),
}
