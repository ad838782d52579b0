pub mod cms;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod telegram;
pub mod webhook;

use academy_core::ports::PortError;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub use middleware::require_admin;
pub use state::AppState;

/// The rejection every JSON handler returns: a status plus `{"error": "..."}`.
pub type HandlerError = (StatusCode, Json<Value>);

/// Maps a port failure to its HTTP status in one place.
pub fn error_response(e: PortError) -> HandlerError {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Unavailable(_) | PortError::RateLimited(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::Upstream(_) => StatusCode::BAD_GATEWAY,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

/// Builds every route of the service. Swagger, CORS and tracing layers are added
/// by the binary.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no secret required)
    let public_routes = Router::new()
        .route("/", get(rest::root_handler))
        .route("/health", get(rest::health_handler))
        .route("/status", get(rest::status_handler))
        .route("/activate", post(rest::activate_handler))
        .route("/subscription-status", get(rest::subscription_status_handler))
        .route("/webhook", get(webhook::verify_handler).post(webhook::receive_handler));

    // Routes that check their own secret (query, cron header or Telegram header)
    let secret_routes = Router::new()
        .route("/update-config", post(rest::update_config_handler))
        .route(
            "/publisher-tick",
            get(rest::publisher_tick_handler).post(rest::publisher_tick_handler),
        )
        .route(
            "/auto-post-trigger",
            get(rest::auto_post_trigger_handler).post(rest::auto_post_trigger_handler),
        )
        .route("/telegram/webhook", post(telegram::telegram_webhook_handler));

    // Admin routes (X-Admin-Token required)
    let admin_routes = Router::new()
        .route("/gen-vouchers", post(rest::gen_vouchers_handler))
        .route("/self-test", get(rest::self_test_handler))
        .route("/cms/rows", get(cms::list_rows_handler))
        .route("/cms/pending", get(cms::pending_rows_handler))
        .route("/cms/enqueue", post(cms::enqueue_handler))
        .route("/cms/generate", post(cms::generate_handler))
        .route("/cms/rows/{row}", delete(cms::delete_row_handler))
        .route("/cms/rows/{row}/caption", put(cms::update_caption_handler))
        .route("/cms/rows/{row}/post-now", post(cms::post_now_handler))
        .route("/cms/rows/{row}/reset", post(cms::reset_row_handler))
        .route("/cms/academy", get(cms::get_academy_handler).put(cms::put_academy_handler))
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(secret_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(app_state)
}
