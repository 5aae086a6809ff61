use axum::routing::get;
use tracing_subscriber::EnvFilter;

use med_id_scan::app_state::AppState;
use med_id_scan::config::AppConfig;
use med_id_scan::routes;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        recognizer = %config.recognizer,
        workers = config.worker_count,
        max_queue_depth = config.max_queue_depth,
        "Initializing med-id-scan server"
    );

    let prometheus_handle =
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder");

    let state = AppState::from_config(&config).expect("Failed to initialize services");

    let app = routes::with_http_layers(routes::router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
