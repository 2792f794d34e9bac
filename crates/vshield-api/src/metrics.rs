//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vshield_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vshield_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vshield_http_requests_in_flight";

    // Analysis metrics
    pub const ANALYSES_TOTAL: &str = "vshield_analyses_total";
    pub const ANALYSIS_DURATION_SECONDS: &str = "vshield_analysis_duration_seconds";
    pub const FRAMES_SAMPLED: &str = "vshield_frames_sampled";
    pub const UPLOAD_BYTES: &str = "vshield_upload_bytes";
}

/// Routes reported under their own label; anything else is `other`.
const KNOWN_PATHS: &[&str] = &["/health", "/ready", "/models", "/analyze", "/metrics"];

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished analysis request.
///
/// `outcome` is `success` or an error kind.
pub fn record_analysis(model: &str, outcome: &str, duration_secs: f64) {
    let labels = [
        ("model", model.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::ANALYSES_TOTAL, &labels).increment(1);
    histogram!(names::ANALYSIS_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record how many frames were sampled from an upload.
pub fn record_frames_sampled(count: usize) {
    histogram!(names::FRAMES_SAMPLED).record(count as f64);
}

/// Record the size of a stored upload.
pub fn record_upload_bytes(bytes: u64) {
    histogram!(names::UPLOAD_BYTES).record(bytes as f64);
}

/// Collapse unknown paths so requests for random URLs don't create new series.
fn sanitize_path(path: &str) -> String {
    let trimmed = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };

    if KNOWN_PATHS.contains(&trimmed) {
        trimmed.to_string()
    } else {
        "other".to_string()
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
