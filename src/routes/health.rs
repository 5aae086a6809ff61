use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub queue: QueueHealth,
    pub cache: CacheHealth,
    pub workers: WorkerHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueHealth {
    pub status: String,
    pub depth: usize,
    pub capacity: usize,
    pub in_flight: usize,
    pub leased: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheHealth {
    pub entries: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub count: usize,
    pub recognizer: String,
}

/// GET /health: queue saturation, cache size and worker pool shape.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let dispatcher = state.scans.dispatcher();
    let stats = dispatcher.stats();
    let capacity = dispatcher.config().max_queue_depth;
    let saturated = stats.queue_depth >= capacity;

    let status_code = if saturated {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status: if saturated { "degraded" } else { "ok" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            queue: QueueHealth {
                status: if saturated { "full" } else { "ok" }.to_string(),
                depth: stats.queue_depth,
                capacity,
                in_flight: stats.in_flight,
                leased: stats.leased,
            },
            cache: CacheHealth {
                entries: state.cache.entry_count(),
            },
            workers: WorkerHealth {
                count: state.workers.size(),
                recognizer: state.workers.recognizer().to_string(),
            },
        },
    };

    (status_code, Json(response))
}
