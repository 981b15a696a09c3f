//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that renders the scrape output.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "hookclip_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "hookclip_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "hookclip_http_requests_in_flight";

    // Progress streams
    pub const SSE_STREAMS_ACTIVE: &str = "hookclip_sse_streams_active";

    // Clip delivery
    pub const CLIP_DOWNLOADS_TOTAL: &str = "hookclip_clip_downloads_total";
    pub const CLIP_BYTES_SERVED_TOTAL: &str = "hookclip_clip_bytes_served_total";

    // Queue
    pub const QUEUE_LENGTH: &str = "hookclip_queue_length";
}

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

pub fn sse_stream_opened() {
    gauge!(names::SSE_STREAMS_ACTIVE).increment(1.0);
}

pub fn sse_stream_closed() {
    gauge!(names::SSE_STREAMS_ACTIVE).decrement(1.0);
}

/// Record a clip download; `partial` marks a ranged read.
pub fn record_clip_download(partial: bool, bytes: u64) {
    let labels = [("partial", partial.to_string())];
    counter!(names::CLIP_DOWNLOADS_TOTAL, &labels).increment(1);
    counter!(names::CLIP_BYTES_SERVED_TOTAL).increment(bytes);
}

pub fn set_queue_length(length: u64) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").expect("valid id regex")
    })
}

fn clip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/api/clips/[^/]+/[^/]+$").expect("valid clip regex"))
}

/// Sanitize path for metrics labels (remove IDs, file names).
fn sanitize_path(path: &str) -> String {
    if clip_regex().is_match(path) {
        return "/api/clips/:job_id/:filename".to_string();
    }
    id_regex().replace_all(path, ":id").into_owned()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/clips/550e8400-e29b-41d4-a716-446655440000/clip_1.mp4"),
            "/api/clips/:job_id/:filename"
        );
        assert_eq!(
            sanitize_path("/api/jobs/550e8400-e29b-41d4-a716-446655440000/events"),
            "/api/jobs/:id/events"
        );
        assert_eq!(sanitize_path("/api/admin/stats"), "/api/admin/stats");
    }
}
