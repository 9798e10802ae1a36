mod helpers;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::Harness;
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use scholar_pipeline::app_state::AppState;
use scholar_pipeline::models::JobPhase;
use scholar_pipeline::routes;
use scholar_pipeline::store::{fields, JobStateStore};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(harness: &Harness) -> Router {
    let state = AppState::new(
        harness.store.clone(),
        harness.publisher(),
        harness.queues.clone(),
    );
    let prometheus = Arc::new(PrometheusBuilder::new().build_recorder().handle());
    routes::router(state, prometheus)
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_scan_queues_a_job() {
    let harness = Harness::new();
    let response = app(&harness)
        .oneshot(request("POST", "/api/scan?author=J.%20Smith"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert_eq!(job_id.len(), 32);
    assert!(job_id.chars().all(|c| c.is_ascii_hexdigit()));

    assert_eq!(
        harness.field(&job_id, fields::STATE).await.as_deref(),
        Some(JobPhase::Queued.label())
    );
    assert_eq!(
        harness.field(&job_id, fields::AUTHOR).await.as_deref(),
        Some("J. Smith")
    );
    assert!(harness.field(&job_id, fields::SUBMITTED_AT).await.is_some());
    assert_eq!(
        harness.transport.payloads(&harness.queues.scrape),
        vec![json!({"job_id": job_id, "author": "J. Smith"})]
    );
}

#[tokio::test]
async fn test_scan_rejects_blank_author() {
    let harness = Harness::new();
    for uri in [
        "/api/scan?author=",
        "/api/scan?author=%20%20",
        "/api/scan?author=...",
        "/api/scan?author=%3F%21",
        "/api/scan",
    ] {
        let response = app(&harness).oneshot(request("POST", uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
    assert!(harness.transport.payloads(&harness.queues.scrape).is_empty());
}

#[tokio::test]
async fn test_scan_fails_when_store_is_down() {
    let harness = Harness::new();
    harness.store.set_offline(true);
    let response = app(&harness)
        .oneshot(request("POST", "/api/scan?author=Ada"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.transport.payloads(&harness.queues.scrape).is_empty());
}

#[tokio::test]
async fn test_status_defaults_to_pending() {
    let harness = Harness::new();
    let response = app(&harness)
        .oneshot(request("GET", "/api/status/unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"job_id": "unknown", "status": "pending", "terminal": false})
    );
}

#[tokio::test]
async fn test_status_reports_stored_labels() {
    let harness = Harness::new();
    harness
        .store
        .set("j1", fields::STATE, "DOIs resolved.")
        .await
        .unwrap();
    harness
        .store
        .set("j1", fields::AI_ANALYZE_STATUS, "AI analyzer started.")
        .await
        .unwrap();

    let main = app(&harness)
        .oneshot(request("GET", "/api/status/j1"))
        .await
        .unwrap();
    let main = json_body(main).await;
    assert_eq!(main["status"], "DOIs resolved.");
    assert_eq!(main["terminal"], false);

    let ai = app(&harness)
        .oneshot(request("GET", "/api/status/j1/ai"))
        .await
        .unwrap();
    assert_eq!(json_body(ai).await["status"], "AI analyzer started.");

    let plagiarism = app(&harness)
        .oneshot(request("GET", "/api/status/j1/plagiarism"))
        .await
        .unwrap();
    assert_eq!(json_body(plagiarism).await["status"], "pending");

    let unknown = app(&harness)
        .oneshot(request("GET", "/api/status/j1/other"))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_flags_terminal_phases() {
    let harness = Harness::new();
    harness
        .store
        .set("j1", fields::STATE, JobPhase::TextExtracted.label())
        .await
        .unwrap();
    harness
        .store
        .set("j1", fields::PLAGIARISM_CHECK_STATUS, "Plagiarism checker error.")
        .await
        .unwrap();

    let main = app(&harness)
        .oneshot(request("GET", "/api/status/j1"))
        .await
        .unwrap();
    assert_eq!(json_body(main).await["terminal"], true);

    let plagiarism = app(&harness)
        .oneshot(request("GET", "/api/status/j1/plagiarism"))
        .await
        .unwrap();
    let plagiarism = json_body(plagiarism).await;
    assert_eq!(plagiarism["status"], "Plagiarism checker error.");
    assert_eq!(plagiarism["terminal"], true);
}

#[tokio::test]
async fn test_result_parses_job_data() {
    let harness = Harness::new();
    harness
        .store
        .set("j1", fields::JOB_DATA, r#"{"job_id":"j1","results":[]}"#)
        .await
        .unwrap();
    harness
        .store
        .set("j2", fields::JOB_DATA, "not json")
        .await
        .unwrap();

    let parsed = app(&harness)
        .oneshot(request("GET", "/api/jobs/j1/result"))
        .await
        .unwrap();
    assert_eq!(json_body(parsed).await, json!({"job_id": "j1", "results": []}));

    let raw = app(&harness)
        .oneshot(request("GET", "/api/jobs/j2/result"))
        .await
        .unwrap();
    assert_eq!(json_body(raw).await, json!({"raw": "not json"}));

    let missing = app(&harness)
        .oneshot(request("GET", "/api/jobs/j3/result"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_job_fields_snapshot() {
    let harness = Harness::new();
    harness.store.set("j1", fields::STATE, "Job queued.").await.unwrap();
    harness.store.set("j1", fields::AUTHOR, "Ada").await.unwrap();

    let response = app(&harness)
        .oneshot(request("GET", "/api/jobs/j1"))
        .await
        .unwrap();
    assert_eq!(
        json_body(response).await,
        json!({"state": "Job queued.", "author": "Ada"})
    );

    let missing = app(&harness)
        .oneshot(request("GET", "/api/jobs/none"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_degrades_when_store_is_down() {
    let harness = Harness::new();
    let healthy = app(&harness).oneshot(request("GET", "/health")).await.unwrap();
    assert_eq!(healthy.status(), StatusCode::OK);

    harness.store.set_offline(true);
    let degraded = app(&harness).oneshot(request("GET", "/health")).await.unwrap();
    assert_eq!(degraded.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(degraded).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["store"]["status"], "error");
    assert_eq!(body["checks"]["broker"]["status"], "ok");

    let live = app(&harness).oneshot(request("GET", "/healthz")).await.unwrap();
    assert_eq!(live.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let harness = Harness::new();
    let response = app(&harness).oneshot(request("GET", "/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
