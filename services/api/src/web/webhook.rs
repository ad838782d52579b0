//! services/api/src/web/webhook.rs
//!
//! The Meta webhook: the verify-token handshake and inbound Messenger, comment
//! and WhatsApp deliveries.

use crate::web::state::AppState;
use academy_core::inbox::{extract_events, WebhookPayload};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Echoes `hub.challenge` when the subscription request carries our verify token.
#[utoipa::path(
    get,
    path = "/webhook",
    params(VerifyQuery),
    responses(
        (status = 200, description = "The challenge, as plain text"),
        (status = 403, description = "Wrong mode or verify token")
    )
)]
pub async fn verify_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    let expected = app_state.config.facebook_verify_token.as_str();
    if query.mode.as_deref() == Some("subscribe") && query.verify_token.as_deref() == Some(expected) {
        info!("webhook subscription verified");
        (StatusCode::OK, query.challenge.unwrap_or_default())
    } else {
        warn!(mode = ?query.mode, "webhook verification failed");
        (StatusCode::FORBIDDEN, "Forbidden".to_string())
    }
}

/// Acknowledges at once and answers the messages in the background, so that a
/// slow LLM never makes Meta retry the delivery.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body(content_type = "application/json", description = "A Meta webhook delivery."),
    responses((status = 200, description = "Always `OK` once the body was read"))
)]
pub async fn receive_handler(State(app_state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "webhook body is not a known payload");
            return (StatusCode::OK, "OK");
        }
    };

    let events = extract_events(&payload);
    info!(object = %payload.object, events = events.len(), "webhook received");
    if !events.is_empty() {
        let inbox = app_state.inbox.clone();
        tokio::spawn(async move {
            let sent = inbox.handle_all(&events).await;
            info!(sent, total = events.len(), "webhook replies finished");
        });
    }
    (StatusCode::OK, "OK")
}
