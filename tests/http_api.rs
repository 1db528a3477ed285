//! HTTP surface tests: auth classes, idempotent ingest semantics, error
//! shapes, and the operator endpoints, driven through the assembled router.

mod common;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use riskcast_backend::api::build_router;
use riskcast_backend::auth::AuthState;
use riskcast_backend::middleware::{RateLimitConfig, RateLimitLayer};
use riskcast_backend::registry::Services;
use std::net::SocketAddr;
use tower::ServiceExt;

fn app() -> (Router, Services, AuthState) {
    let services = common::services();
    let auth = AuthState::new(&services.config, services.audit.clone());
    let limiter = RateLimitLayer::new(RateLimitConfig::default());
    let router = build_router(services.clone(), auth.clone(), limiter);
    (router, services, auth)
}

async fn send(router: &Router, mut request: Request<Body>) -> (StatusCode, serde_json::Value) {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9999))));
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn ingest_request(signal_id: &str, api_key: Option<&str>, idempotency: Option<&str>) -> Request<Body> {
    let event = common::signal_event(signal_id, 0.7, 0.8, "SUPPLY_CHAIN");
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/signals/ingest")
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    if let Some(key) = idempotency {
        builder = builder.header("X-Idempotency-Key", key);
    }
    builder
        .body(Body::from(serde_json::to_vec(&event).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_ingest_requires_api_key() {
    let (router, _, _) = app();
    let (status, _) = send(&router, ingest_request("OMEN-H-1", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&router, ingest_request("OMEN-H-1", Some("wrong"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ingest_idempotency_over_http() {
    let (router, _, _) = app();

    let (status, body) = send(&router, ingest_request("OMEN-H-2", Some("dev-api-key"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let ack = body["ack_id"].as_str().unwrap().to_string();
    assert!(ack.starts_with("riskcast-ack-"));

    let (status, body) = send(&router, ingest_request("OMEN-H-2", Some("dev-api-key"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ack_id"].as_str().unwrap(), ack);
    assert_eq!(body["duplicate"], serde_json::json!(true));
}

#[tokio::test]
async fn test_idempotency_key_mismatch_is_400() {
    let (router, _, _) = app();
    let (status, body) = send(
        &router,
        ingest_request("OMEN-H-3", Some("dev-api-key"), Some("OMEN-OTHER")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["error_id"].is_string());
}

#[tokio::test]
async fn test_assessment_requires_bearer_token() {
    let (router, _, auth) = app();

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/assessments/order/ORD-1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = auth.issue_token("dev-tenant", "tester", 3600);
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/assessments/order/ORD-1")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n_signals"], serde_json::json!(0));
    assert_eq!(body["risk_score"], serde_json::json!(0.0));
}

#[tokio::test]
async fn test_outcome_repost_conflicts() {
    let (router, _, auth) = app();
    let token = auth.issue_token("dev-tenant", "tester", 3600);

    let body = serde_json::json!({
        "decision_id": "dec_http_1",
        "outcome_type": "no_impact",
        "predicted": {
            "entity_type": "order",
            "entity_id": "ORD-1",
            "risk_score": 55.0,
            "confidence": 0.8,
            "loss_usd": 10000.0,
            "action": "insure"
        }
    });
    let make_request = || {
        Request::builder()
            .method("POST")
            .uri("/outcomes")
            .header("content-type", "application/json")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    };

    let (status, first) = send(&router, make_request()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["decision_id"], "dec_http_1");

    let (status, second) = send(&router, make_request()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(second["error"], "outcome_exists");
}

#[tokio::test]
async fn test_reconcile_validation_and_run() {
    let (router, _, _) = app();

    let bad = Request::builder()
        .method("POST")
        .uri("/reconcile/run")
        .header("content-type", "application/json")
        .header("X-API-Key", "dev-api-key")
        .body(Body::from(r#"{"since_days": 500}"#))
        .unwrap();
    let (status, _) = send(&router, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let good = Request::builder()
        .method("POST")
        .uri("/reconcile/run")
        .header("content-type", "application/json")
        .header("X-API-Key", "dev-api-key")
        .body(Body::from(r#"{"since_days": 7}"#))
        .unwrap();
    let (status, body) = send(&router, good).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["missing_count"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_is_public_text() {
    let (router, _, _) = app();
    let request = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();

    let mut request = request;
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9999))));
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("riskcast_ingest_received_total"));
    assert!(text.contains("riskcast_ledger_depth"));
}

#[tokio::test]
async fn test_audit_integrity_endpoint() {
    let (router, services, auth) = app();
    services
        .ingest
        .ingest(
            "dev-tenant",
            &common::signal_event("OMEN-H-4", 0.7, 0.8, "WEATHER"),
        )
        .unwrap();

    let token = auth.issue_token("dev-tenant", "tester", 3600);
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/audit-trail/integrity")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chain_intact"], serde_json::json!(true));
    assert!(body["total_entries"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_cross_tenant_reads_return_nothing() {
    let (router, services, auth) = app();
    services
        .ingest
        .ingest(
            "dev-tenant",
            &common::signal_event("OMEN-H-5", 0.7, 0.8, "MARKET"),
        )
        .unwrap();

    // A bearer token for another tenant sees no trace of the signal.
    let token = auth.issue_token("tenant-b", "intruder", 3600);
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/pipeline/trace/OMEN-H-5")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_complete"], serde_json::json!(false));
    assert_eq!(body["steps"].as_array().unwrap().len(), 0);
}
