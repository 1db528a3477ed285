//! Signal ingest endpoint — the entry point for the upstream producer.

use crate::auth::TenantContext;
use crate::errors::ApiError;
use crate::models::SignalEvent;
use crate::registry::Services;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

/// POST /api/v1/signals/ingest
///
/// 200 with a fresh ack for a new signal, 409 with the original ack for a
/// duplicate (idempotent success). An `X-Idempotency-Key` header, when
/// present, must equal the body's signal_id.
pub async fn ingest_signal(
    State(services): State<Services>,
    Extension(ctx): Extension<TenantContext>,
    headers: HeaderMap,
    Json(event): Json<SignalEvent>,
) -> Result<Response, ApiError> {
    if let Some(key) = headers
        .get("X-Idempotency-Key")
        .and_then(|v| v.to_str().ok())
    {
        if key != event.signal_id {
            return Err(ApiError::validation(
                "X-Idempotency-Key",
                "idempotency key does not match signal_id in body",
            ));
        }
    }

    let (ack, duplicate) = services.ingest.ingest(&ctx.tenant_id, &event)?;
    let status = if duplicate {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ack)).into_response())
}
