//! Authentication and tenant resolution.
//!
//! Three classes of path:
//! - public (`/health`, `/ready`, `/metrics`) — no auth;
//! - service-to-service (ingest, reconcile) — shared-secret `X-API-Key`
//!   header, mapped to a tenant by configuration;
//! - everything else — HS256 bearer token carrying the tenant claim.
//!
//! Every authenticated request gets a [`TenantContext`] extension; handlers
//! read the tenant from it and nowhere else.

use crate::audit::{AuditEvent, AuditLog};
use crate::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::warn;

const PUBLIC_PATHS: &[&str] = &["/health", "/ready", "/metrics"];
const API_KEY_PATHS: &[&str] = &["/api/v1/signals/ingest"];
const API_KEY_PREFIXES: &[&str] = &["/reconcile"];

/// Identity attached to every authenticated request
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    /// `user:<id>` for bearer tokens, `apikey:<prefix>` for API keys.
    pub actor: String,
}

/// Bearer token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub tenant_id: String,
    pub user_id: String,
    pub exp: usize,
}

#[derive(Clone)]
pub struct AuthState {
    api_keys: HashMap<String, String>,
    jwt_secret: String,
    audit: AuditLog,
}

impl AuthState {
    pub fn new(config: &Config, audit: AuditLog) -> Self {
        Self {
            api_keys: config.api_keys.clone(),
            jwt_secret: config.jwt_secret.clone(),
            audit,
        }
    }

    /// Issue a bearer token. Used by tests and operator tooling; login
    /// flows are outside this crate.
    pub fn issue_token(&self, tenant_id: &str, user_id: &str, ttl_secs: u64) -> String {
        let claims = Claims {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            exp: (chrono::Utc::now().timestamp() as usize) + ttl_secs as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .expect("token encoding cannot fail with HS256")
    }

    fn tenant_for_api_key(&self, key: &str) -> Option<&str> {
        self.api_keys.get(key).map(String::as_str)
    }

    fn decode_bearer(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .ok()
    }
}

fn unauthorized(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized", "detail": detail })),
    )
        .into_response()
}

/// Tenant-resolution middleware
pub async fn auth_middleware(
    axum::extract::State(state): axum::extract::State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if PUBLIC_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }

    let wants_api_key = API_KEY_PATHS.contains(&path.as_str())
        || API_KEY_PREFIXES.iter().any(|p| path.starts_with(p));

    let context = if wants_api_key {
        let Some(key) = request
            .headers()
            .get("X-API-Key")
            .and_then(|v| v.to_str().ok())
        else {
            return unauthorized("Missing X-API-Key header");
        };
        match state.tenant_for_api_key(key) {
            Some(tenant_id) => {
                let prefix: String = key.chars().take(8).collect();
                TenantContext {
                    tenant_id: tenant_id.to_string(),
                    actor: format!("apikey:{prefix}"),
                }
            }
            None => {
                warn!(path = %path, "invalid API key");
                state.audit.record_best_effort(
                    AuditEvent::new("auth_failed")
                        .denied()
                        .resource("path", path.clone()),
                );
                return unauthorized("Invalid or expired API key");
            }
        }
    } else {
        let token = request
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let Some(token) = token else {
            return unauthorized("Missing authentication token");
        };
        match state.decode_bearer(token) {
            Some(claims) => TenantContext {
                tenant_id: claims.tenant_id,
                actor: format!("user:{}", claims.user_id),
            },
            None => {
                warn!(path = %path, "invalid bearer token");
                state.audit.record_best_effort(
                    AuditEvent::new("auth_failed")
                        .denied()
                        .resource("path", path.clone()),
                );
                return unauthorized("Invalid or expired token");
            }
        }
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn state() -> AuthState {
        let db = Database::open_in_memory().unwrap();
        AuthState::new(&Config::default(), AuditLog::new(db))
    }

    #[test]
    fn test_token_roundtrip() {
        let auth = state();
        let token = auth.issue_token("tenant-a", "user-1", 3600);
        let claims = auth.decode_bearer(&token).unwrap();
        assert_eq!(claims.tenant_id, "tenant-a");
        assert_eq!(claims.user_id, "user-1");
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = state();
        let claims = Claims {
            tenant_id: "t".to_string(),
            user_id: "u".to_string(),
            exp: 1_000, // long past
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("dev-jwt-secret-change-in-production".as_bytes()),
        )
        .unwrap();
        assert!(auth.decode_bearer(&token).is_none());
    }

    #[test]
    fn test_api_key_maps_to_tenant() {
        let auth = state();
        assert_eq!(auth.tenant_for_api_key("dev-api-key"), Some("dev-tenant"));
        assert_eq!(auth.tenant_for_api_key("wrong-key"), None);
    }
}
