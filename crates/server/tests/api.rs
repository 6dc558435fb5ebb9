//! End-to-end tests: HTTP surface -> tracker -> mock scan backend.
//!
//! Real time with short intervals; every wait is bounded.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use scanwatch_core::{Config, JobPhase, SubjectKey};
use scanwatch_server::{create_app, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(backend: &MockServer) -> Config {
    let mut config = Config::default();
    config.backend.base_url = backend.uri();
    config.backend.request_timeout_secs = 5;
    config.tracker.poll_interval_ms = 50;
    config.tracker.display_window_ms = 2_000;
    config
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Poll `check` every 20ms until it returns true or 5s pass.
async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn notice_is(state: &AppState, key: &SubjectKey, text: &str) -> bool {
    state
        .notifier
        .message(key)
        .is_some_and(|notice| notice.text == text)
}

async fn status_requests(backend: &MockServer, job_id: &str) -> usize {
    let wanted = format!("/api/job_status/{job_id}");
    backend
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == wanted)
        .count()
}

#[tokio::test]
async fn scan_runs_to_completion_and_reloads_findings() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scan"))
        .and(body_json(json!({ "repo": "acme/widgets" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "42" })))
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job_status/42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "job_id": "42", "status": "pending" })),
        )
        .up_to_n_times(2)
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job_status/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({ "job_id": "42", "status": "done", "findings_count": 3 }),
        ))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "repo": "acme/widgets", "findings": [{ "severity": "HIGH" }] }
        ])))
        .mount(&backend)
        .await;

    let state = AppState::new(config(&backend)).unwrap();
    let app = create_app(Arc::clone(&state));
    let key = SubjectKey::new("acme/widgets").unwrap();

    let (status, first) = send(&app, Method::POST, "/api/scan", Some(json!({ "subject": "acme/widgets" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["phase"], "submitting");

    // Duplicate start joins the running job
    let (status, second) = send(&app, Method::POST, "/api/scan", Some(json!({ "repo": "acme/widgets" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["generation"], first["generation"]);

    eventually(|| state.tracker.get_state(&key).phase == JobPhase::Done).await;

    let (status, job) = send(&app, Method::GET, "/api/jobs/state/acme/widgets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["phase"], "done");
    assert_eq!(job["jobId"], "42");
    assert_eq!(job["checks"], 3);
    assert_eq!(job["outcome"]["payload"]["findings_count"], 3);
    assert_eq!(status_requests(&backend, "42").await, 3);

    eventually(|| notice_is(&state, &key, "Scan complete")).await;
    let (_, notices) = send(&app, Method::GET, "/api/notices", None).await;
    assert_eq!(notices[0]["text"], "Scan complete");
    assert_eq!(notices[0]["level"], "success");

    eventually(|| state.findings.snapshot().loaded_at.is_some()).await;
    let (_, findings) = send(&app, Method::GET, "/api/findings", None).await;
    assert_eq!(findings["groups"][0]["repo"], "acme/widgets");
}

#[tokio::test]
async fn rejected_submission_fails_without_polling() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scan"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "No repo provided" })))
        .mount(&backend)
        .await;

    let state = AppState::new(config(&backend)).unwrap();
    let app = create_app(Arc::clone(&state));
    let key = SubjectKey::new("acme/widgets").unwrap();

    send(&app, Method::POST, "/api/scan", Some(json!({ "subject": "acme/widgets" }))).await;
    eventually(|| state.tracker.get_state(&key).phase == JobPhase::Failed).await;

    let (_, job) = send(&app, Method::GET, "/api/jobs/state/acme/widgets", None).await;
    assert_eq!(job["outcome"]["kind"], "submission");
    assert_eq!(job["outcome"]["detail"], "No repo provided");

    eventually(|| notice_is(&state, &key, "Error: No repo provided")).await;
    let (_, notices) = send(&app, Method::GET, "/api/notices", None).await;
    assert_eq!(notices[0]["text"], "Error: No repo provided");
    assert_eq!(notices[0]["level"], "error");
}

#[tokio::test]
async fn cancel_stops_status_checks() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "7" })))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job_status/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "running" })))
        .mount(&backend)
        .await;

    let state = AppState::new(config(&backend)).unwrap();
    let app = create_app(Arc::clone(&state));
    let key = SubjectKey::new("acme/widgets").unwrap();

    send(&app, Method::POST, "/api/scan", Some(json!({ "subject": "acme/widgets" }))).await;
    eventually(|| state.tracker.get_state(&key).checks >= 2).await;

    let (status, job) = send(&app, Method::DELETE, "/api/jobs/state/acme/widgets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["phase"], "failed");
    assert_eq!(job["outcome"]["kind"], "cancelled");

    // Let any request already on the wire land, then make sure nothing follows
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = status_requests(&backend, "7").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(status_requests(&backend, "7").await, settled);

    let (status, _) = send(&app, Method::DELETE, "/api/jobs/state/acme/widgets", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refresh_job_uses_reserved_subject() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/refresh_reports"))
        .and(query_param("days", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_id": "r1" })))
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job_status/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "done" })))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&backend)
        .await;

    let state = AppState::new(config(&backend)).unwrap();
    let app = create_app(Arc::clone(&state));

    let (status, job) = send(&app, Method::POST, "/api/refresh?days=3", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(job["kind"], "refresh");
    assert_eq!(job["subject"], "reports:refresh");

    eventually(|| state.tracker.get_state(&SubjectKey::refresh()).phase == JobPhase::Done).await;
    eventually(|| notice_is(&state, &SubjectKey::refresh(), "Refresh complete!")).await;

    let (_, notices) = send(&app, Method::GET, "/api/notices", None).await;
    assert_eq!(notices[0]["text"], "Refresh complete!");
}

#[tokio::test]
async fn job_stream_emits_transitions() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "s1" })))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job_status/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "done" })))
        .mount(&backend)
        .await;

    let state = AppState::new(config(&backend)).unwrap();
    let app = create_app(Arc::clone(&state));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/jobs/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    send(&app, Method::POST, "/api/scan", Some(json!({ "subject": "acme/stream" }))).await;

    let mut body = response.into_body().into_data_stream();
    let mut seen = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(chunk)) = body.next().await {
            seen.push_str(&String::from_utf8_lossy(&chunk));
            if seen.contains("event: done") {
                break;
            }
        }
    })
    .await;
    assert!(read.is_ok(), "no done event within 5s, got: {seen}");

    let submitting = seen.find("event: submitting").unwrap();
    let polling = seen.find("event: polling").unwrap();
    let done = seen.find("event: done").unwrap();
    assert!(submitting < polling && polling < done);
    assert!(seen.contains("\"subject\":\"acme/stream\""));
}

#[tokio::test]
async fn scan_history_is_proxied() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/scans/acme%2Fwidgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "_id": "old", "timestamp": 1735689600, "findings_count": 5 },
            { "_id": "new", "timestamp": 1735776000, "findings_count": 2 }
        ])))
        .mount(&backend)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/scans/delete/old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Scan deleted" })))
        .mount(&backend)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/scans/delete/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Scan not found" })))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&backend)
        .await;

    let state = AppState::new(config(&backend)).unwrap();
    let app = create_app(state);

    let (status, scans) = send(&app, Method::GET, "/api/scans/acme/widgets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scans[0]["_id"], "new");
    assert_eq!(scans[1]["_id"], "old");

    let (status, _) = send(&app, Method::DELETE, "/api/scans/delete/old", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::DELETE, "/api/scans/delete/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Scan not found");
}

#[tokio::test]
async fn backend_down_surfaces_as_502() {
    let mut config = Config::default();
    config.backend.base_url = "http://127.0.0.1:9".into();
    config.backend.request_timeout_secs = 2;
    let state = AppState::new(config).unwrap();
    let app = create_app(state);

    let (status, body) = send(&app, Method::GET, "/api/scans/acme/widgets", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}
