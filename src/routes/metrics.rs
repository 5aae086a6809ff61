use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Install the global Prometheus recorder and describe the scan metrics.
/// Can only succeed once per process.
pub fn install_recorder() -> Result<Arc<PrometheusHandle>, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("scan_requests_total", "Scans accepted by ingress");
    metrics::describe_counter!(
        "scan_cache_hits_total",
        "Scans answered from the result cache without inference"
    );
    metrics::describe_counter!(
        "scan_rejected_overloaded_total",
        "Scans rejected because the queue was full"
    );
    metrics::describe_counter!("scan_jobs_completed", "Identification jobs completed");
    metrics::describe_counter!("scan_jobs_failed", "Identification jobs failed after retries");
    metrics::describe_counter!("scan_job_retries_total", "Identification attempts re-queued");
    metrics::describe_gauge!("scan_queue_depth", "Jobs waiting for a worker");
    metrics::describe_histogram!(
        "scan_inference_seconds",
        "Recognizer time per identification attempt"
    );

    Ok(Arc::new(handle))
}

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
