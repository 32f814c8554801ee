use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ocr_overlay::app_state::AppState;
use ocr_overlay::config::AppConfig;
use ocr_overlay::routes;
use ocr_overlay::services::{inference::HttpInferenceClient, storage::S3Store};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing ocr-overlay server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("ocr_jobs_submitted_total", "OCR jobs accepted, by model");
    metrics::describe_counter!("ocr_status_checks_total", "Job status lookups served");
    metrics::describe_counter!("ocr_upload_urls_issued_total", "Signed upload URLs issued");

    tracing::info!(bucket = %config.s3_bucket, endpoint = %config.s3_endpoint, "Initializing object store");
    let storage = S3Store::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize object store");

    let inference = HttpInferenceClient::new(
        &config.inference_endpoint,
        config.inference_api_token.clone(),
    )
    .expect("Failed to initialize inference client");

    // Base64 inflates inline images by a third
    let body_limit = (config.max_upload_bytes as usize).saturating_mul(4) / 3 + 64 * 1024;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(Arc::new(storage), Arc::new(inference), config);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/upload-url", post(routes::upload::create_upload_url))
        .route("/api/ocr", post(routes::ocr::submit_ocr))
        .route("/api/ocr/{job_id}", get(routes::ocr::get_ocr_status))
        .route("/api/jobs", get(routes::jobs::list_jobs))
        .route(
            "/api/images/{*key}",
            get(routes::images::get_image_url).delete(routes::images::delete_image),
        )
        .with_state(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
