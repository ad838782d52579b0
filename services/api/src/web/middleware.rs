//! services/api/src/web/middleware.rs
//!
//! Shared-secret checks for protecting routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::web::{state::AppState, HandlerError};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Compares without stopping at the first differing byte.
fn secrets_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// An unset secret locks the route (403), a missing one is 401, a wrong one 403.
pub fn verify_secret(name: &str, expected: Option<&str>, provided: Option<&str>) -> Result<(), HandlerError> {
    let Some(expected) = expected else {
        warn!(secret = name, "request refused, secret is not configured");
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": format!("{} is not configured", name) })),
        ));
    };
    match provided {
        None => Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })))),
        Some(p) if secrets_match(expected, p.trim()) => Ok(()),
        Some(_) => {
            warn!(secret = name, "request refused, wrong secret");
            Err((StatusCode::FORBIDDEN, Json(json!({ "error": "forbidden" }))))
        }
    }
}

/// Middleware guarding the voucher and CMS routes with the `X-Admin-Token` header.
pub async fn require_admin(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match verify_secret("ADMIN_TOKEN", state.config.admin_token.as_deref(), provided.as_deref()) {
        Ok(()) => next.run(req).await,
        Err(rejection) => rejection.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_outcomes() {
        assert!(verify_secret("S", Some("abc"), Some("abc")).is_ok());
        assert!(verify_secret("S", Some("abc"), Some(" abc ")).is_ok());
        assert_eq!(verify_secret("S", Some("abc"), None).unwrap_err().0, StatusCode::UNAUTHORIZED);
        assert_eq!(verify_secret("S", Some("abc"), Some("abd")).unwrap_err().0, StatusCode::FORBIDDEN);
        assert_eq!(verify_secret("S", None, Some("abc")).unwrap_err().0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn length_mismatch_never_matches() {
        assert!(!secrets_match("abc", "abcd"));
        assert!(!secrets_match("", "a"));
    }
}
