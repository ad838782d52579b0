//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the public, cron and voucher endpoints and the
//! master definition for the OpenAPI specification.

use crate::web::middleware::{verify_secret, CRON_SECRET_HEADER};
use crate::web::state::{AppState, Integrations};
use crate::web::{cms, error_response, telegram, webhook, HandlerError};
use academy_core::domain::{BotConfigUpdate, Mood};
use academy_core::subscription;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        root_handler,
        health_handler,
        status_handler,
        update_config_handler,
        publisher_tick_handler,
        auto_post_trigger_handler,
        gen_vouchers_handler,
        activate_handler,
        subscription_status_handler,
        self_test_handler,
        webhook::verify_handler,
        webhook::receive_handler,
        telegram::telegram_webhook_handler,
        cms::list_rows_handler,
        cms::pending_rows_handler,
        cms::enqueue_handler,
        cms::generate_handler,
        cms::update_caption_handler,
        cms::post_now_handler,
        cms::reset_row_handler,
        cms::delete_row_handler,
        cms::get_academy_handler,
        cms::put_academy_handler,
    ),
    components(
        schemas(
            StatusResponse,
            GenVouchersRequest,
            VouchersResponse,
            ActivateRequest,
            ActivateResponse,
            SubscriptionStatusResponse,
            SelfTestResponse,
            Integrations,
            cms::EnqueueRequest,
            cms::EnqueueKind,
            cms::GenerateRequest,
            cms::CaptionRequest,
        )
    ),
    tags(
        (name = "Academy Automation API", description = "Webhooks, the publishing queue and the voucher gate.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    status: String,
    time_cairo: String,
    active_hours: Vec<u32>,
    #[schema(value_type = String)]
    mood: Mood,
    rss_count: usize,
    last_post_hour: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SecretQuery {
    secret: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct GenVouchersRequest {
    #[serde(default = "default_voucher_count")]
    count: u32,
    #[serde(default = "default_voucher_days", alias = "duration_days")]
    days: u32,
}

fn default_voucher_count() -> u32 {
    1
}

fn default_voucher_days() -> u32 {
    30
}

#[derive(Serialize, ToSchema)]
pub struct VouchersResponse {
    codes: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ActivateRequest {
    user_id: String,
    code: String,
}

#[derive(Serialize, ToSchema)]
pub struct ActivateResponse {
    status: String,
    user_id: String,
    subscription_end: DateTime<Utc>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubscriptionQuery {
    user_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct SubscriptionStatusResponse {
    user_id: String,
    premium: bool,
}

#[derive(Serialize, ToSchema)]
pub struct SelfTestResponse {
    integrations: Integrations,
    sheet_ok: bool,
    sheet_rows: Option<usize>,
    sheet_error: Option<String>,
}

/// The cron secret may come as `?secret=` (what schedulers can send) or as a header.
fn check_cron_secret(state: &AppState, headers: &HeaderMap, query: &SecretQuery) -> Result<(), HandlerError> {
    let provided = query
        .secret
        .as_deref()
        .or_else(|| headers.get(CRON_SECRET_HEADER).and_then(|v| v.to_str().ok()));
    verify_secret("CRON_SECRET", state.config.cron_secret.as_deref(), provided)
}

//=========================================================================================
// Public Handlers
//=========================================================================================

#[utoipa::path(get, path = "/", responses((status = 200, description = "Service banner")))]
pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "status": "running",
        "service": "Academy Manager Webhook",
        "version": "1.0",
    }))
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Liveness probe")))]
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Current runtime configuration, with times in the academy's local zone.
#[utoipa::path(get, path = "/status", responses((status = 200, body = StatusResponse)))]
pub async fn status_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let offset = app_state.config.local_offset;
    let cfg = app_state.bot_config.read().await.clone();
    Json(StatusResponse {
        status: "running".to_string(),
        time_cairo: Utc::now().with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string(),
        active_hours: cfg.active_hours,
        mood: cfg.mood,
        rss_count: cfg.rss_feeds.len(),
        last_post_hour: cfg.last_auto_post.map(|t| t.with_timezone(&offset).hour()),
    })
}

//=========================================================================================
// Cron-protected Handlers
//=========================================================================================

/// Replaces any subset of `active_hours`, `mood` and `rss_feeds`.
#[utoipa::path(
    post,
    request_body(content_type = "application/json", description = "A partial bot configuration update."),
    path = "/update-config",
    params(SecretQuery),
    responses(
        (status = 200, description = "Configuration updated"),
        (status = 400, description = "An active hour is outside 0-23"),
        (status = 401, description = "Missing secret"),
        (status = 403, description = "Wrong or unconfigured secret")
    )
)]
pub async fn update_config_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
    Json(update): Json<BotConfigUpdate>,
) -> Result<impl IntoResponse, HandlerError> {
    check_cron_secret(&app_state, &headers, &query)?;
    let mut cfg = app_state.bot_config.write().await;
    cfg.apply(update)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))))?;
    info!(active_hours = ?cfg.active_hours, mood = ?cfg.mood, feeds = cfg.rss_feeds.len(), "bot config updated");
    Ok(Json(json!({ "status": "updated", "config": &*cfg })))
}

/// One publisher tick. Driven by the `publisher` binary or any external cron.
#[utoipa::path(
    get,
    path = "/publisher-tick",
    params(SecretQuery),
    responses(
        (status = 200, description = "Tick outcome: published, failed, prefilled, prefill_failed, idle or busy"),
        (status = 503, description = "The sheet is not configured or rate limited")
    )
)]
pub async fn publisher_tick_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    check_cron_secret(&app_state, &headers, &query)?;
    let report = app_state.publisher.tick(Utc::now()).await.map_err(|e| {
        error!(error = %e, "publisher tick failed");
        error_response(e)
    })?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/auto-post-trigger",
    params(SecretQuery),
    responses((status = 200, description = "Auto-post outcome: posted, failed, skipped or busy"))
)]
pub async fn auto_post_trigger_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    check_cron_secret(&app_state, &headers, &query)?;
    let report = app_state.publisher.auto_post(Utc::now()).await.map_err(|e| {
        error!(error = %e, "auto-post failed");
        error_response(e)
    })?;
    Ok(Json(report))
}

//=========================================================================================
// Voucher Handlers
//=========================================================================================

/// Issue a batch of vouchers. Requires `X-Admin-Token`.
#[utoipa::path(
    post,
    path = "/gen-vouchers",
    request_body = GenVouchersRequest,
    responses(
        (status = 200, body = VouchersResponse),
        (status = 400, description = "count or days out of range"),
        (status = 401, description = "Missing admin token"),
        (status = 403, description = "Wrong or unconfigured admin token")
    ),
    params(("x-admin-token" = String, Header, description = "The admin token."))
)]
pub async fn gen_vouchers_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<GenVouchersRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let codes = subscription::generate_vouchers(app_state.subscriptions.as_ref(), req.count, req.days, Utc::now())
        .await
        .map_err(error_response)?;
    Ok(Json(VouchersResponse { codes }))
}

#[utoipa::path(
    post,
    path = "/activate",
    request_body = ActivateRequest,
    responses(
        (status = 200, body = ActivateResponse),
        (status = 400, description = "Missing user id or code"),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Code already used")
    )
)]
pub async fn activate_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ActivateRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let activated =
        subscription::activate_voucher(app_state.subscriptions.as_ref(), &req.user_id, &req.code, Utc::now())
            .await
            .map_err(error_response)?;
    Ok(Json(ActivateResponse {
        status: "activated".to_string(),
        user_id: activated.user_id,
        subscription_end: activated.subscription_end,
    }))
}

#[utoipa::path(
    get,
    path = "/subscription-status",
    params(SubscriptionQuery),
    responses((status = 200, body = SubscriptionStatusResponse))
)]
pub async fn subscription_status_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let premium = subscription::is_premium(app_state.subscriptions.as_ref(), &query.user_id, Utc::now())
        .await
        .map_err(error_response)?;
    Ok(Json(SubscriptionStatusResponse {
        user_id: query.user_id.trim().to_string(),
        premium,
    }))
}

//=========================================================================================
// Diagnostics
//=========================================================================================

/// Which integrations are configured, plus a live read of the queue sheet.
#[utoipa::path(
    get,
    path = "/self-test",
    responses((status = 200, body = SelfTestResponse)),
    params(("x-admin-token" = String, Header, description = "The admin token."))
)]
pub async fn self_test_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let (sheet_ok, sheet_rows, sheet_error) = match app_state.queue().rows().await {
        Ok(rows) => (true, Some(rows.len()), None),
        Err(e) => (false, None, Some(e.to_string())),
    };
    Json(SelfTestResponse {
        integrations: app_state.integrations,
        sheet_ok,
        sheet_rows,
        sheet_error,
    })
}
