//! Identification worker pool.
//!
//! Workers are identical tokio tasks that claim leased jobs from the
//! dispatcher, decode the image on the blocking pool and run the configured
//! recognizer. They hold no state between jobs.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::models::fingerprint::ContentHash;
use crate::models::medicine::IdentificationResult;
use crate::models::scan::FailureKind;
use crate::services::dispatcher::{Assignment, Dispatcher};
use crate::services::recognizer::{InferenceError, PreparedImage, Recognizer};
use crate::services::status_store::StatusStore;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_count: usize,
    pub low_confidence_threshold: f64,
    pub lease_sweep_interval: Duration,
    pub status_retention: Duration,
}

/// Running workers plus the lease and retention sweepers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    size: usize,
    recognizer: &'static str,
}

impl WorkerPool {
    /// Spawn the pool on the current tokio runtime.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        store: Arc<StatusStore>,
        recognizer: Arc<dyn Recognizer>,
        settings: WorkerSettings,
    ) -> Self {
        let mut handles = Vec::with_capacity(settings.worker_count + 2);

        for worker_id in 0..settings.worker_count {
            handles.push(tokio::spawn(run_worker(
                worker_id,
                dispatcher.clone(),
                recognizer.clone(),
                settings.low_confidence_threshold,
            )));
        }
        handles.push(tokio::spawn(sweep_leases(
            dispatcher,
            settings.lease_sweep_interval,
        )));
        handles.push(tokio::spawn(sweep_finished(store, settings.status_retention)));

        tracing::info!(
            workers = settings.worker_count,
            recognizer = recognizer.name(),
            "Worker pool started"
        );

        Self {
            handles,
            size: settings.worker_count,
            recognizer: recognizer.name(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn recognizer(&self) -> &'static str {
        self.recognizer
    }

    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker(
    worker_id: usize,
    dispatcher: Arc<Dispatcher>,
    recognizer: Arc<dyn Recognizer>,
    low_confidence_threshold: f64,
) {
    tracing::debug!(worker_id, "Worker ready");
    loop {
        let Assignment { lease, image } = dispatcher.claim(worker_id).await;

        tracing::info!(
            worker_id,
            lease_id = %lease.id,
            fingerprint = %lease.fingerprint.short(),
            attempt = lease.attempt,
            "Processing identification job"
        );

        // Stop at lease expiry; the sweeper would requeue the job anyway.
        let budget = lease.expires_at.saturating_duration_since(Instant::now());
        let outcome = tokio::time::timeout(
            budget,
            identify(
                recognizer.as_ref(),
                lease.fingerprint,
                image,
                low_confidence_threshold,
            ),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => {
                dispatcher.complete(&lease, result);
            }
            Ok(Err(e)) => {
                tracing::error!(worker_id, lease_id = %lease.id, error = %e, "Identification failed");
                dispatcher.fail(&lease, FailureKind::InferenceError, &e.to_string());
            }
            Err(_) => {
                tracing::warn!(worker_id, lease_id = %lease.id, "Identification exceeded its lease");
                dispatcher.fail(&lease, FailureKind::LeaseTimeout, "identification exceeded its lease");
            }
        }
    }
}

/// Decode `image` and run the recognizer over it.
pub async fn identify(
    recognizer: &dyn Recognizer,
    fingerprint: ContentHash,
    image: Arc<[u8]>,
    low_confidence_threshold: f64,
) -> Result<IdentificationResult, InferenceError> {
    let prepared = prepare(fingerprint, image).await?;

    let start = Instant::now();
    let recognition = recognizer.recognize(&prepared).await?;
    let elapsed = start.elapsed();
    metrics::histogram!("scan_inference_seconds").record(elapsed.as_secs_f64());

    let confidence = recognition.confidence.clamp(0.0, 1.0);
    let low_confidence = confidence < low_confidence_threshold;
    tracing::info!(
        fingerprint = %fingerprint.short(),
        width = prepared.width,
        height = prepared.height,
        inference_ms = elapsed.as_millis() as u64,
        medicine = %recognition.name,
        confidence,
        low_confidence,
        "Recognition complete"
    );

    Ok(IdentificationResult {
        fingerprint,
        medicine_id: recognition.medicine_id,
        name: recognition.name,
        confidence,
        description: recognition.description,
        low_confidence,
        computed_at: Utc::now(),
    })
}

async fn prepare(fingerprint: ContentHash, bytes: Arc<[u8]>) -> Result<PreparedImage, InferenceError> {
    tokio::task::spawn_blocking(move || -> Result<PreparedImage, InferenceError> {
        let format = image::guess_format(&bytes)?;
        let decoded = image::load_from_memory_with_format(&bytes, format)?;
        Ok(PreparedImage {
            fingerprint,
            format,
            width: decoded.width(),
            height: decoded.height(),
            bytes,
        })
    })
    .await?
}

async fn sweep_leases(dispatcher: Arc<Dispatcher>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let expired = dispatcher.reap_expired(Instant::now());
        if expired > 0 {
            tracing::info!(expired, "Released expired leases");
        }
    }
}

async fn sweep_finished(store: Arc<StatusStore>, retention: Duration) {
    let mut ticker = tokio::time::interval(retention.min(Duration::from_secs(60)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let purged = store.purge_expired(retention);
        if purged > 0 {
            tracing::debug!(purged, "Purged finished scan records");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::recognizer::{MockRecognizer, Recognition};
    use async_trait::async_trait;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png() -> Arc<[u8]> {
        let img = ImageBuffer::from_fn(8, 6, |x, y| Rgb([x as u8 * 20, y as u8 * 30, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        Arc::from(out.into_inner())
    }

    struct Unsure;

    #[async_trait]
    impl Recognizer for Unsure {
        fn name(&self) -> &'static str {
            "unsure"
        }

        async fn recognize(&self, _image: &PreparedImage) -> Result<Recognition, InferenceError> {
            Ok(Recognition {
                medicine_id: String::new(),
                name: "Xyzmab".to_string(),
                confidence: 0.3,
                description: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_identify_decodes_and_tags_result() {
        let bytes = png();
        let fingerprint = ContentHash::of(&bytes);
        let recognizer = MockRecognizer::new(Duration::ZERO);

        let result = identify(&recognizer, fingerprint, bytes, 0.6).await.unwrap();
        assert_eq!(result.fingerprint, fingerprint);
        assert_eq!(result.name, "PARACETAMOL 500 mg TABLET");
        assert!(!result.low_confidence);
    }

    #[tokio::test]
    async fn test_low_confidence_is_flagged_not_failed() {
        let bytes = png();
        let result = identify(&Unsure, ContentHash::of(&bytes), bytes, 0.6)
            .await
            .unwrap();
        assert!(result.low_confidence);
        assert_eq!(result.name, "Xyzmab");
    }

    #[tokio::test]
    async fn test_corrupt_image_is_inference_error() {
        let mut bytes = png().to_vec();
        bytes.truncate(40);
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let err = identify(&Unsure, ContentHash::of(&bytes), bytes, 0.6)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
    }
}
