use std::path::Path;
use std::sync::Arc;

use crate::config::{AppConfig, ConfigError, RecognizerKind};
use crate::services::{
    cache::ResultCache,
    catalog::{CatalogError, MedicineCatalog},
    directory::MedicineDirectory,
    dispatcher::{DispatchConfig, Dispatcher},
    ingress::Ingress,
    openfda::OpenFdaClient,
    recognizer::{MockRecognizer, Recognizer, RemoteRecognizer},
    scan::ScanService,
    status_store::StatusStore,
    worker::{WorkerPool, WorkerSettings},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub scans: Arc<ScanService>,
    pub directory: Arc<MedicineDirectory>,
    pub cache: ResultCache,
    pub workers: Arc<WorkerPool>,
}

impl AppState {
    pub fn new(
        scans: ScanService,
        directory: MedicineDirectory,
        cache: ResultCache,
        workers: WorkerPool,
    ) -> Self {
        Self {
            scans: Arc::new(scans),
            directory: Arc::new(directory),
            cache,
            workers: Arc::new(workers),
        }
    }

    /// Build every service from configuration and start the worker pool.
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let catalog = Arc::new(load_catalog(config)?);
        let recognizer: Arc<dyn Recognizer> = match config.recognizer {
            RecognizerKind::Mock => Arc::new(MockRecognizer::new(config.mock_delay())),
            RecognizerKind::Remote => {
                let url = config
                    .recognizer_url
                    .clone()
                    .ok_or(ConfigError::Missing("RECOGNIZER_URL"))?;
                Arc::new(RemoteRecognizer::new(
                    url,
                    config.recognizer_token.clone(),
                    catalog.clone(),
                ))
            }
        };
        Ok(Self::with_recognizer(config, catalog, recognizer))
    }

    /// Same as [`AppState::from_config`] with an explicit recognizer.
    pub fn with_recognizer(
        config: &AppConfig,
        catalog: Arc<MedicineCatalog>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        let store = Arc::new(StatusStore::new());
        let cache = ResultCache::new(config.cache_capacity);
        let dispatcher = Arc::new(Dispatcher::new(
            DispatchConfig {
                max_queue_depth: config.max_queue_depth,
                lease_timeout: config.lease_timeout(),
                retry_limit: config.retry_limit,
            },
            cache.clone(),
            store.clone(),
        ));

        let workers = WorkerPool::spawn(
            dispatcher.clone(),
            store.clone(),
            recognizer,
            WorkerSettings {
                worker_count: config.worker_count,
                low_confidence_threshold: config.low_confidence_threshold,
                lease_sweep_interval: config.lease_sweep_interval(),
                status_retention: config.status_retention(),
            },
        );

        let openfda = config.openfda_enabled.then(|| {
            let api_key = config.openfda_api_key.clone();
            match &config.openfda_url {
                Some(url) => OpenFdaClient::with_base_url(url.clone(), api_key),
                None => OpenFdaClient::new(api_key),
            }
        });
        let scans = ScanService::new(Ingress::new(config.max_image_bytes), dispatcher, store);
        let directory = MedicineDirectory::new(catalog, openfda);

        Self::new(scans, directory, cache, workers)
    }
}

fn load_catalog(config: &AppConfig) -> Result<MedicineCatalog, StartupError> {
    let mut catalog = MedicineCatalog::builtin()?;
    if let Some(path) = &config.catalog_path {
        let added = catalog.load_file(Path::new(path))?;
        tracing::info!(path = %path, added, "Loaded extra catalog records");
    }
    Ok(catalog)
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
