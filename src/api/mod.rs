//! HTTP surface.
//!
//! Routers are thin: extract the tenant context, call the service, map
//! typed errors to responses. All tenant scoping happens in the service
//! and repository layers.

pub mod audit_api;
pub mod decisions_api;
pub mod ingest_api;
pub mod metrics_api;
pub mod outcomes_api;
pub mod pipeline_api;
pub mod reconcile_api;

use crate::auth::{auth_middleware, AuthState};
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitLayer};
use crate::registry::Services;
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

pub fn build_router(services: Services, auth: AuthState, limiter: RateLimitLayer) -> Router {
    Router::new()
        // Public
        .route("/health", get(metrics_api::health))
        .route("/ready", get(metrics_api::ready))
        .route("/metrics", get(metrics_api::prometheus_metrics))
        // Ingest (API-key auth)
        .route("/api/v1/signals/ingest", post(ingest_api::ingest_signal))
        // Reconcile (API-key auth)
        .route("/reconcile/run", post(reconcile_api::run_reconcile))
        .route(
            "/reconcile/status/:target_date",
            get(reconcile_api::reconcile_status),
        )
        .route(
            "/reconcile/history/:target_date",
            get(reconcile_api::reconcile_history),
        )
        // Pipeline observability
        .route("/api/v1/pipeline/validate", post(pipeline_api::validate_signal))
        .route("/api/v1/pipeline/health", get(pipeline_api::pipeline_health))
        .route(
            "/api/v1/pipeline/integrity",
            get(pipeline_api::integrity_check),
        )
        .route(
            "/api/v1/pipeline/integrity/replay",
            get(pipeline_api::signals_needing_replay),
        )
        .route(
            "/api/v1/pipeline/trace/decision/:decision_id",
            get(pipeline_api::trace_decision),
        )
        .route(
            "/api/v1/pipeline/trace/:signal_id",
            get(pipeline_api::trace_signal),
        )
        .route("/api/v1/pipeline/coverage", get(pipeline_api::pipeline_coverage))
        .route("/api/v1/pipeline/upstream", get(pipeline_api::upstream_health))
        // Assessments & decisions
        .route(
            "/api/v1/assessments/:entity_type/:entity_id",
            get(decisions_api::get_assessment),
        )
        .route(
            "/api/v1/decisions/generate",
            post(decisions_api::generate_decision),
        )
        .route(
            "/api/v1/decisions/generate-all",
            post(decisions_api::generate_all_decisions),
        )
        // Outcomes & flywheel
        .route(
            "/outcomes",
            post(outcomes_api::record_outcome).get(outcomes_api::list_outcomes),
        )
        .route("/outcomes/accuracy", get(outcomes_api::accuracy_report))
        .route("/outcomes/roi", get(outcomes_api::roi_report))
        .route("/outcomes/flywheel", get(outcomes_api::flywheel_summary))
        .route("/outcomes/flywheel/run", post(outcomes_api::run_flywheel))
        // Audit trail
        .route("/api/v1/audit-trail", get(audit_api::list_audit_trail))
        .route(
            "/api/v1/audit-trail/integrity",
            get(audit_api::check_integrity),
        )
        .with_state(services)
        .layer(
            // Outermost first: CORS → logging → rate limit → auth → routes.
            tower::ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(axum_mw::from_fn(request_logging))
                .layer(axum_mw::from_fn_with_state(limiter, rate_limit_middleware))
                .layer(axum_mw::from_fn_with_state(auth, auth_middleware)),
        )
}
