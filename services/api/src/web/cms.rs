//! services/api/src/web/cms.rs
//!
//! Admin endpoints over the post queue and the academy facts. Every route here
//! sits behind `require_admin`.

use crate::web::state::AppState;
use crate::web::{error_response, HandlerError};
use academy_core::domain::{AcademyData, NewBufferRow, PostSource};
use academy_core::ports::PortError;
use academy_core::prompts;
use academy_core::sheet;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueKind {
    /// A ready caption, with an optional image.
    Caption,
    /// An idea the LLM turns into a caption.
    Prompt,
    /// An image URL; the caption is written by the LLM when absent.
    Image,
    /// A video URL with its caption.
    Video,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueRequest {
    pub kind: EnqueueKind,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    /// Defaults to the next free slot.
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// Scenario key such as `training_tip`; random when absent.
    #[serde(default)]
    pub scenario: Option<String>,
    /// Arabic sport name; random among the academy's sports when absent.
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default = "yes")]
    pub include_cta: bool,
    /// Queue the generated post at the next slot instead of only returning it.
    #[serde(default = "yes")]
    pub enqueue: bool,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CaptionRequest {
    pub caption: String,
}

fn bad_request(message: &str) -> HandlerError {
    error_response(PortError::InvalidInput(message.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn queued_json(row: &NewBufferRow) -> serde_json::Value {
    json!({ "status": "queued", "row": row.to_fields() })
}

//=========================================================================================
// Queue Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/cms/rows",
    responses((status = 200, description = "Every queue row with its `_row_number`")),
    params(("x-admin-token" = String, Header, description = "The admin token."))
)]
pub async fn list_rows_handler(State(app_state): State<Arc<AppState>>) -> Result<impl IntoResponse, HandlerError> {
    let rows = app_state.queue().rows().await.map_err(error_response)?;
    Ok(Json(json!({ "rows": rows })))
}

#[utoipa::path(
    get,
    path = "/cms/pending",
    responses((status = 200, description = "Scheduled rows in publishing order")),
    params(("x-admin-token" = String, Header, description = "The admin token."))
)]
pub async fn pending_rows_handler(State(app_state): State<Arc<AppState>>) -> Result<impl IntoResponse, HandlerError> {
    let rows = app_state.queue().pending().await.map_err(error_response)?;
    Ok(Json(json!({ "rows": rows })))
}

#[utoipa::path(
    post,
    path = "/cms/enqueue",
    request_body = EnqueueRequest,
    responses(
        (status = 201, description = "Row appended to the queue"),
        (status = 400, description = "A field the kind needs is missing")
    ),
    params(("x-admin-token" = String, Header, description = "The admin token."))
)]
pub async fn enqueue_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<EnqueueRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let image_url = non_blank(req.image_url);
    let (caption, media_url, source) = match req.kind {
        EnqueueKind::Caption => {
            let caption = non_blank(req.caption).ok_or_else(|| bad_request("caption is required"))?;
            let source = if image_url.is_some() { PostSource::UserUpload } else { PostSource::UserText };
            (caption, image_url.unwrap_or_default(), source)
        }
        EnqueueKind::Prompt => {
            let idea = non_blank(req.prompt).ok_or_else(|| bad_request("prompt is required"))?;
            let data = app_state.academy.read().await.clone();
            let mood = app_state.bot_config.read().await.mood;
            let caption = app_state
                .studio
                .caption_from_prompt(&data, mood, &idea)
                .await
                .map_err(error_response)?;
            (caption, image_url.unwrap_or_default(), PostSource::UserText)
        }
        EnqueueKind::Image => {
            let url = image_url.ok_or_else(|| bad_request("image_url is required"))?;
            let caption = match non_blank(req.caption) {
                Some(c) => c,
                None => app_state.studio.caption_for_image(&url).await.map_err(error_response)?,
            };
            (caption, url, PostSource::UserUpload)
        }
        EnqueueKind::Video => {
            let url = non_blank(req.video_url).ok_or_else(|| bad_request("video_url is required"))?;
            let caption = non_blank(req.caption).ok_or_else(|| bad_request("caption is required for videos"))?;
            (caption, url, PostSource::UserVideo)
        }
    };

    let now = Utc::now();
    let row = match req.scheduled_time {
        Some(at) => {
            let row = NewBufferRow::scheduled(now, at, caption, media_url, source);
            app_state.queue().append(&row).await.map_err(error_response)?;
            row
        }
        None => app_state
            .publisher
            .enqueue(caption, media_url, source, now)
            .await
            .map_err(error_response)?,
    };
    Ok((StatusCode::CREATED, Json(queued_json(&row))))
}

/// Generates a scenario post and, unless told otherwise, queues it.
#[utoipa::path(
    post,
    path = "/cms/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "The generated caption, image and queue row"),
        (status = 400, description = "Unknown scenario")
    ),
    params(("x-admin-token" = String, Header, description = "The admin token."))
)]
pub async fn generate_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let data = app_state.academy.read().await.clone();
    let mood = app_state.bot_config.read().await.mood;

    let generated = match non_blank(req.scenario) {
        None => app_state.studio.random_post(&data, mood).await,
        Some(key) => {
            let scenario = prompts::scenario_by_key(&key).ok_or_else(|| bad_request("unknown scenario"))?;
            let sport = non_blank(req.sport)
                .or_else(|| data.sports().choose(&mut rand::rng()).map(|s| s.to_string()))
                .unwrap_or_else(|| "كاراتيه".to_string());
            app_state
                .studio
                .scenario_post(&data, mood, scenario, &sport, req.include_cta)
                .await
        }
    }
    .map_err(|e| {
        error!(error = %e, "post generation failed");
        error_response(e)
    })?;

    let queued = if req.enqueue {
        let row = app_state
            .publisher
            .enqueue(
                generated.caption.clone(),
                generated.image_url.clone(),
                PostSource::AiGenerated,
                Utc::now(),
            )
            .await
            .map_err(error_response)?;
        Some(sheet::format_time_utc(row.scheduled_time))
    } else {
        None
    };
    Ok(Json(json!({ "post": generated, "scheduled_time": queued })))
}

#[utoipa::path(
    put,
    path = "/cms/rows/{row}/caption",
    request_body = CaptionRequest,
    responses(
        (status = 200, description = "Caption replaced"),
        (status = 404, description = "No such row")
    ),
    params(
        ("row" = u32, Path, description = "1-based sheet row number"),
        ("x-admin-token" = String, Header, description = "The admin token.")
    )
)]
pub async fn update_caption_handler(
    State(app_state): State<Arc<AppState>>,
    Path(row): Path<u32>,
    Json(req): Json<CaptionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    app_state
        .publisher
        .update_caption(row, &req.caption)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "status": "updated", "row": row })))
}

#[utoipa::path(
    post,
    path = "/cms/rows/{row}/post-now",
    responses(
        (status = 200, description = "Publish attempt; `status` is Posted or Failed"),
        (status = 404, description = "No such row"),
        (status = 409, description = "Already posted, or the publisher is busy")
    ),
    params(
        ("row" = u32, Path, description = "1-based sheet row number"),
        ("x-admin-token" = String, Header, description = "The admin token.")
    )
)]
pub async fn post_now_handler(
    State(app_state): State<Arc<AppState>>,
    Path(row): Path<u32>,
) -> Result<impl IntoResponse, HandlerError> {
    let report = app_state.publisher.post_now(row).await.map_err(error_response)?;
    Ok(Json(report))
}

/// Puts a row (typically a failed one) back in the queue at the next free slot.
#[utoipa::path(
    post,
    path = "/cms/rows/{row}/reset",
    responses(
        (status = 200, description = "Row is Scheduled again"),
        (status = 404, description = "No such row")
    ),
    params(
        ("row" = u32, Path, description = "1-based sheet row number"),
        ("x-admin-token" = String, Header, description = "The admin token.")
    )
)]
pub async fn reset_row_handler(
    State(app_state): State<Arc<AppState>>,
    Path(row): Path<u32>,
) -> Result<impl IntoResponse, HandlerError> {
    let at = app_state.publisher.next_slot(Utc::now()).await;
    app_state.publisher.reschedule(row, at).await.map_err(error_response)?;
    Ok(Json(json!({
        "status": "scheduled",
        "row": row,
        "scheduled_time": sheet::format_time_utc(at),
    })))
}

#[utoipa::path(
    delete,
    path = "/cms/rows/{row}",
    responses(
        (status = 200, description = "Row deleted; later rows shift up"),
        (status = 400, description = "Row 1 is the header"),
        (status = 404, description = "No such row")
    ),
    params(
        ("row" = u32, Path, description = "1-based sheet row number"),
        ("x-admin-token" = String, Header, description = "The admin token.")
    )
)]
pub async fn delete_row_handler(
    State(app_state): State<Arc<AppState>>,
    Path(row): Path<u32>,
) -> Result<impl IntoResponse, HandlerError> {
    app_state.publisher.delete_row(row).await.map_err(error_response)?;
    Ok(Json(json!({ "status": "deleted", "row": row })))
}

//=========================================================================================
// Academy Facts
//=========================================================================================

#[utoipa::path(
    get,
    path = "/cms/academy",
    responses((status = 200, description = "The academy facts injected into prompts")),
    params(("x-admin-token" = String, Header, description = "The admin token."))
)]
pub async fn get_academy_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(app_state.academy.read().await.clone())
}

/// Replaces the academy facts in memory and on disk.
#[utoipa::path(
    put,
    path = "/cms/academy",
    request_body(content_type = "application/json", description = "The full academy document."),
    responses(
        (status = 200, description = "Saved"),
        (status = 500, description = "The file could not be written")
    ),
    params(("x-admin-token" = String, Header, description = "The admin token."))
)]
pub async fn put_academy_handler(
    State(app_state): State<Arc<AppState>>,
    Json(data): Json<AcademyData>,
) -> Result<impl IntoResponse, HandlerError> {
    let mut academy = app_state.academy.write().await;
    app_state.academy_file.save(&data).await.map_err(|e| {
        error!(error = %e, path = %app_state.academy_file.path().display(), "academy data could not be saved");
        error_response(PortError::Unexpected(e.to_string()))
    })?;
    *academy = data;
    info!("academy data replaced");
    Ok(Json(json!({ "status": "saved" })))
}
