//! services/api/src/web/telegram.rs
//!
//! The Telegram admin bot in webhook mode. Photos are hosted, captioned and
//! queued; plain text becomes a captioned text post; commands manage the queue.

use crate::web::middleware::{verify_secret, TELEGRAM_SECRET_HEADER};
use crate::web::state::AppState;
use crate::web::HandlerError;
use academy_core::domain::{NewBufferRow, PostSource, PostStatus};
use academy_core::ports::{PortError, PortResult};
use academy_core::sheet::{self, COL_SCHEDULED_TIME};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{Message, Update, UpdateKind};
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

const PHOTO_RECEIVED: &str = "📥 استلمت الصورة… جاري الرفع وتجهيز الكابشن ✨";
const QUEUE_LISTING_LIMIT: usize = 10;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Academy queue commands:")]
pub enum AdminCommand {
    #[command(description = "list the next scheduled posts")]
    Queue,
    #[command(description = "publish a row now: /post <row>")]
    Post(String),
    #[command(description = "delete a row: /delete <row>")]
    Delete(String),
    #[command(description = "replace a caption: /caption <row> <text>")]
    Caption(String),
    #[command(description = "show the publisher settings")]
    Status,
    #[command(description = "display this text")]
    Help,
}

/// Parses `/command[@bot] args`. The bot mention is dropped because the webhook
/// does not know its own username.
pub fn parse_command(text: &str) -> Option<AdminCommand> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let head = head.split('@').next().unwrap_or(head);
    let normalized = if rest.trim().is_empty() {
        head.to_string()
    } else {
        format!("{} {}", head, rest.trim())
    };
    AdminCommand::parse(&normalized, "").ok()
}

fn parse_row(arg: &str) -> PortResult<u32> {
    arg.trim()
        .parse::<u32>()
        .map_err(|_| PortError::InvalidInput(format!("'{}' is not a row number", arg.trim())))
}

fn shorten(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

fn saved_message(row: &NewBufferRow, now: DateTime<Utc>) -> String {
    let minutes = (row.scheduled_time - now).num_minutes().max(0);
    format!(
        "✅ Saved to queue. Will post in {} mins.\n\n⏰ {}",
        minutes,
        sheet::format_time_utc(row.scheduled_time)
    )
}

//=========================================================================================
// Bot Actions (transport independent)
//=========================================================================================

/// Runs one admin command and returns the reply text.
pub async fn run_command(state: &AppState, command: AdminCommand) -> String {
    match execute(state, command).await {
        Ok(reply) => reply,
        Err(e) => format!("❌ Error: {}", e),
    }
}

async fn execute(state: &AppState, command: AdminCommand) -> PortResult<String> {
    match command {
        AdminCommand::Help => Ok(AdminCommand::descriptions().to_string()),
        AdminCommand::Queue => {
            let pending = state.queue().pending().await?;
            if pending.is_empty() {
                return Ok("📭 The queue is empty.".to_string());
            }
            let mut lines = vec![format!("📋 {} scheduled post(s):", pending.len())];
            lines.extend(pending.iter().take(QUEUE_LISTING_LIMIT).map(|r| {
                format!("#{} ⏰ {} | {}", r.row_number, r.get(COL_SCHEDULED_TIME), shorten(r.caption(), 40))
            }));
            Ok(lines.join("\n"))
        }
        AdminCommand::Post(arg) => {
            let row = parse_row(&arg)?;
            let report = state.publisher.post_now(row).await?;
            Ok(match (report.status, report.error) {
                (PostStatus::Posted, _) => format!(
                    "✅ Row {} posted ({}).",
                    row,
                    report.post_id.unwrap_or_else(|| "no id".to_string())
                ),
                (_, error) => format!("❌ Row {} failed: {}", row, error.unwrap_or_default()),
            })
        }
        AdminCommand::Delete(arg) => {
            let row = parse_row(&arg)?;
            state.publisher.delete_row(row).await?;
            Ok(format!("🗑 Row {} deleted.", row))
        }
        AdminCommand::Caption(args) => {
            let (row, caption) = args
                .trim()
                .split_once(char::is_whitespace)
                .ok_or_else(|| PortError::InvalidInput("usage: /caption <row> <text>".to_string()))?;
            let row = parse_row(row)?;
            state.publisher.update_caption(row, caption).await?;
            Ok(format!("✏️ Caption of row {} updated.", row))
        }
        AdminCommand::Status => {
            let now = Utc::now();
            let pending = state.queue().pending().await?.len();
            let next = state.publisher.next_slot(now).await;
            let cfg = state.bot_config.read().await.clone();
            Ok(format!(
                "📊 Pending: {}\n⏭ Next slot: {}\n🕒 Active hours: {}\n🎭 Mood: {:?}",
                pending,
                sheet::format_time_utc(next),
                if cfg.active_hours.is_empty() {
                    "any".to_string()
                } else {
                    cfg.active_hours.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
                },
                cfg.mood
            ))
        }
    }
}

/// Captions an operator's idea and queues it as a text post.
pub async fn queue_text(state: &AppState, idea: &str, now: DateTime<Utc>) -> String {
    let result = async {
        let data = state.academy.read().await.clone();
        let mood = state.bot_config.read().await.mood;
        let caption = state.studio.caption_from_prompt(&data, mood, idea).await?;
        state
            .publisher
            .enqueue(caption, String::new(), PostSource::UserText, now)
            .await
    }
    .await;
    match result {
        Ok(row) => saved_message(&row, now),
        Err(e) => format!("❌ Error: {}", e),
    }
}

/// Hosts the photo, captions it and queues it.
pub async fn queue_photo(state: &AppState, image: &[u8], now: DateTime<Utc>) -> String {
    let result = async {
        let name = format!("telegram_{}", now.format("%Y%m%d_%H%M%S"));
        let image_url = state.images.upload(image, &name).await?;
        let caption = state.studio.caption_for_image(&image_url).await?;
        state
            .publisher
            .enqueue(caption, image_url, PostSource::UserUpload, now)
            .await
    }
    .await;
    match result {
        Ok(row) => saved_message(&row, now),
        Err(e) => format!("❌ Error: {}", e),
    }
}

//=========================================================================================
// Webhook Transport
//=========================================================================================

async fn download_largest_photo(bot: &Bot, msg: &Message) -> Result<Option<Vec<u8>>, String> {
    let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) else {
        return Ok(None);
    };
    let file = bot.get_file(photo.file.id.clone()).await.map_err(|e| e.to_string())?;
    let mut buf: Vec<u8> = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| e.to_string())?;
    Ok(Some(buf))
}

async fn reply(bot: &Bot, chat: ChatId, text: String) {
    if let Err(e) = bot.send_message(chat, text).await {
        warn!(error = %e, chat = chat.0, "telegram reply failed");
    }
}

async fn handle_message(state: Arc<AppState>, bot: Bot, msg: Message) {
    let chat = msg.chat.id;
    let now = Utc::now();

    if msg.photo().is_some() {
        reply(&bot, chat, PHOTO_RECEIVED.to_string()).await;
        let text = match download_largest_photo(&bot, &msg).await {
            Ok(Some(bytes)) => queue_photo(&state, &bytes, now).await,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "telegram photo download failed");
                format!("❌ Error: {}", e)
            }
        };
        reply(&bot, chat, text).await;
        return;
    }

    let Some(text) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
        return;
    };
    let answer = if text.starts_with('/') {
        match parse_command(text) {
            Some(command) => run_command(&state, command).await,
            None => AdminCommand::descriptions().to_string(),
        }
    } else {
        queue_text(&state, text, now).await
    };
    reply(&bot, chat, answer).await;
}

/// The admin is identified by user id, so they can also work from a group chat.
/// Without a configured admin every sender is served.
fn sent_by_admin(admin: Option<i64>, msg: &Message) -> bool {
    let Some(admin) = admin else { return true };
    msg.from()
        .is_some_and(|user| i64::try_from(user.id.0).is_ok_and(|id| id == admin))
}

/// Receives Telegram updates. Work happens in the background so Telegram gets
/// its 200 immediately and does not redeliver.
#[utoipa::path(
    post,
    path = "/telegram/webhook",
    request_body(content_type = "application/json", description = "A Telegram Update."),
    responses(
        (status = 200, description = "Update accepted"),
        (status = 401, description = "Missing secret header"),
        (status = 403, description = "Wrong or unconfigured secret"),
        (status = 503, description = "TELEGRAM_BOT_TOKEN is not set")
    ),
    params(("x-telegram-bot-api-secret-token" = String, Header, description = "The webhook secret."))
)]
pub async fn telegram_webhook_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HandlerError> {
    let provided = headers.get(TELEGRAM_SECRET_HEADER).and_then(|v| v.to_str().ok());
    verify_secret(
        "TELEGRAM_WEBHOOK_SECRET",
        app_state.config.telegram_webhook_secret.as_deref(),
        provided,
    )?;
    let Some(bot) = app_state.telegram.clone() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "TELEGRAM_BOT_TOKEN is not set" })),
        ));
    };

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "unreadable telegram update");
            return Ok(Json(json!({ "ok": true })));
        }
    };
    let UpdateKind::Message(msg) = update.kind else {
        return Ok(Json(json!({ "ok": true })));
    };

    if !sent_by_admin(app_state.config.telegram_admin_id, &msg) {
        info!(
            chat = msg.chat.id.0,
            sender = ?msg.from().map(|u| u.id.0),
            "ignoring telegram message from a non-admin sender"
        );
        return Ok(Json(json!({ "ok": true })));
    }

    tokio::spawn(handle_message(app_state.clone(), bot, msg));
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_message(sender: u64) -> Message {
        serde_json::from_value(json!({
            "message_id": 7,
            "date": 1_767_225_600,
            "chat": { "id": -1_001_234_567_890i64, "type": "supergroup", "title": "Academy staff" },
            "from": { "id": sender, "is_bot": false, "first_name": "Coach" },
            "text": "/queue"
        }))
        .unwrap()
    }

    #[test]
    fn admin_is_recognised_by_sender_not_chat() {
        assert!(sent_by_admin(Some(42), &group_message(42)));
        assert!(!sent_by_admin(Some(42), &group_message(43)));
        assert!(!sent_by_admin(Some(-1_001_234_567_890), &group_message(43)));
        assert!(sent_by_admin(None, &group_message(43)));
    }

    #[test]
    fn commands_parse_with_and_without_mention() {
        assert_eq!(parse_command("/queue"), Some(AdminCommand::Queue));
        assert_eq!(parse_command("/queue@academy_bot"), Some(AdminCommand::Queue));
        assert_eq!(parse_command("/post 5"), Some(AdminCommand::Post("5".to_string())));
        assert_eq!(
            parse_command("/caption 4 كابشن جديد"),
            Some(AdminCommand::Caption("4 كابشن جديد".to_string()))
        );
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/unknown"), None);
    }

    #[test]
    fn row_numbers_must_be_numeric() {
        assert_eq!(parse_row(" 7 "), Ok(7));
        assert!(matches!(parse_row("seven"), Err(PortError::InvalidInput(_))));
    }

    #[test]
    fn long_captions_are_shortened() {
        assert_eq!(shorten("abc", 5), "abc");
        assert_eq!(shorten("abcdef", 3), "abc…");
    }
}
