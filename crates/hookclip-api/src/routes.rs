//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    cancel_job, download_clip, get_job, get_stats, health, job_events, list_accounts, list_jobs,
    oauth_callback, oauth_url, publish_job, retry_job, retry_stuck, submit_batch, submit_job, tools,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, propagate_request_id_layer, security_headers, set_request_id_layer, trace_layer,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(submit_job))
        .route("/batch", post(submit_batch))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/retry", post(retry_job))
        .route("/jobs/:job_id/cancel", post(cancel_job))
        .route("/jobs/:job_id/events", get(job_events));

    // Clip delivery is gated on the signed token in the query string
    let clip_routes = Router::new().route("/clips/:job_id/:filename", get(download_clip));

    let upload_routes = Router::new()
        .route("/upload/accounts", get(list_accounts))
        .route("/upload/:job_id", post(publish_job))
        .route("/oauth/url", get(oauth_url))
        .route("/oauth/callback", get(oauth_callback));

    let admin_routes = Router::new()
        .route("/admin/stats", get(get_stats))
        .route("/admin/jobs", get(list_jobs))
        .route("/admin/retry-stuck", post(retry_stuck));

    let api_routes = Router::new()
        .merge(job_routes)
        .merge(clip_routes)
        .merge(upload_routes)
        .merge(admin_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/tools", get(tools));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(trace_layer())
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use hookclip_models::{JobId, Stage};
    use hookclip_queue::JobQueue;
    use hookclip_storage::DeliveryConfig;
    use hookclip_worker::run_job;
    use hookclip_worker::test_support::{harness, harness_with, Harness, TEST_URL};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::ApiConfig;

    fn app(h: &Harness) -> (Router, AppState) {
        let state = AppState::new(
            ApiConfig::default(),
            Arc::clone(&h.ctx),
            DeliveryConfig::new("test-secret"),
        );
        (create_router(state.clone(), None), state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = send(app, request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    /// Run the queued delivery of `job_id` to completion.
    async fn process(h: &Harness, job_id: &JobId) {
        let delivery = h.queue.consume("test", 100, 1).await.unwrap().remove(0);
        let cancel = h.ctx.cancels.register(job_id);
        let _ = run_job(&h.ctx, &delivery.message, false, cancel).await;
        h.ctx.cancels.unregister(job_id);
        h.queue.ack(&delivery.id).await.unwrap();
    }

    async fn submit(app: &Router) -> JobId {
        let (status, body) = send_json(
            app,
            post_json("/api/jobs", json!({ "url": TEST_URL, "clip_count": 2, "clip_duration": 30 })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{}", body);
        JobId::from_string(body["job_id"].as_str().unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness().await;
        let (app, _) = app(&h);
        let (status, headers, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key("x-request-id"));
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_submit_and_get_status() {
        let h = harness().await;
        let (app, _) = app(&h);
        let job_id = submit(&app).await;

        let (status, body) = send_json(&app, get(&format!("/api/jobs/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stage"], "queued");
        assert_eq!(body["clip_count"], 2);
        assert_eq!(body["title"], "Test talk");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let h = harness().await;
        let (app, _) = app(&h);

        let (status, body) = send_json(&app, post_json("/api/jobs", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let (status, _) = send_json(&app, get("/api/jobs/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let job_id = submit(&app).await;
        let (status, _) = send_json(&app, post_json(&format!("/api/jobs/{}/retry", job_id), json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send_json(&app, get("/api/admin/jobs?stage=bogus")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let h = harness().await;
        let (app, _) = app(&h);
        let job_id = submit(&app).await;

        let (status, body) = send_json(&app, post_json(&format!("/api/jobs/{}/cancel", job_id), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stage"], "failed");
        assert_eq!(body["error"], "Cancelled by user");

        let (status, _) = send_json(&app, post_json(&format!("/api/jobs/{}/cancel", job_id), json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_clip_download_with_ranges() {
        let h = harness().await;
        let (app, _) = app(&h);
        let job_id = submit(&app).await;
        process(&h, &job_id).await;

        let (_, body) = send_json(&app, get(&format!("/api/jobs/{}", job_id))).await;
        assert_eq!(body["stage"], "completed");
        let url = body["clips"][0]["download_url"].as_str().unwrap().to_string();

        let (status, headers, bytes) = send(&app, get(&url)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(headers[header::CONTENT_LENGTH], "4");
        assert_eq!(bytes, b"clip");

        let ranged = Request::get(&url).header(header::RANGE, "bytes=1-2").body(Body::empty()).unwrap();
        let (status, headers, bytes) = send(&app, ranged).await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 1-2/4");
        assert_eq!(headers[header::CONTENT_LENGTH], "2");
        assert_eq!(bytes, b"li");

        let bad = Request::get(&url).header(header::RANGE, "bytes=10-20").body(Body::empty()).unwrap();
        let (status, headers, _) = send(&app, bad).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes */4");
    }

    #[tokio::test]
    async fn test_clip_download_rejects_bad_tokens() {
        let h = harness().await;
        let (app, state) = app(&h);
        let job_id = submit(&app).await;
        process(&h, &job_id).await;

        let base = format!("/api/clips/{}/clip_1.mp4", job_id);
        let (status, _) = send_json(&app, get(&base)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send_json(&app, get(&format!("{}?token=garbage", base))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A token for clip 2 does not open clip 1
        let other = state.signer.issue(&job_id, "clip_2.mp4", None).unwrap();
        let (status, _) = send_json(&app, get(&format!("{}?token={}", base, other))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Expired clips are gone even with a valid token
        let mut job = h.ctx.store.get(&job_id).await.unwrap().unwrap();
        job.clips[0].expired = true;
        h.ctx.store.put(&job).await.unwrap();
        let token = state.signer.issue(&job_id, "clip_1.mp4", None).unwrap();
        let (status, _) = send_json(&app, get(&format!("{}?token={}", base, token))).await;
        assert_eq!(status, StatusCode::GONE);

        let (_, body) = send_json(&app, get(&format!("/api/jobs/{}", job_id))).await;
        assert!(body["clips"][0].get("download_url").is_none());
    }

    #[tokio::test]
    async fn test_events_for_finished_job_send_snapshot() {
        let h = harness().await;
        let (app, _) = app(&h);
        let job_id = submit(&app).await;
        process(&h, &job_id).await;

        let (status, headers, body) = send(&app, get(&format!("/api/jobs/{}/events", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("event: status"));
        assert!(text.contains("\"stage\":\"completed\""));
    }

    #[tokio::test]
    async fn test_publish_and_accounts() {
        let h = harness_with(vec!["a".to_string(), "b".to_string()]).await;
        let (app, _) = app(&h);
        let job_id = submit(&app).await;

        let (status, _) = send_json(&app, post_json(&format!("/api/upload/{}", job_id), json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        process(&h, &job_id).await;
        let (status, body) = send_json(&app, post_json(&format!("/api/upload/{}", job_id), json!({}))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["uploaded"], 2);
        assert_eq!(body["failed"], 0);

        let (status, body) = send_json(&app, get("/api/upload/accounts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["configured"], true);
        assert_eq!(body["accounts"].as_array().unwrap().len(), 2);

        let (status, body) = send_json(&app, get("/api/oauth/callback?code=abc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refresh_token"], "refresh-abc");

        let (status, _) = send_json(&app, get("/api/oauth/callback")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_publish_without_accounts() {
        let h = harness_with(Vec::new()).await;
        let (app, _) = app(&h);
        let job_id = submit(&app).await;
        process(&h, &job_id).await;

        let (status, body) = send_json(&app, post_json(&format!("/api/upload/{}", job_id), json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn test_admin_endpoints() {
        let h = harness().await;
        let (app, _) = app(&h);
        submit(&app).await;
        submit(&app).await;

        let (status, body) = send_json(&app, get("/api/admin/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["by_stage"]["queued"], 2);
        assert_eq!(body["queue_length"], 2);

        let (status, body) = send_json(&app, get("/api/admin/jobs?stage=queued&page=1&limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["jobs"].as_array().unwrap().len(), 1);
        assert_eq!(body["jobs"][0]["stage"], Stage::Queued.as_str());

        let (status, body) = send_json(&app, post_json("/api/admin/retry-stuck?timeout_minutes=30", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }
}
