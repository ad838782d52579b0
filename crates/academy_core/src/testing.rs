//! crates/academy_core/src/testing.rs
//!
//! In-memory port implementations for unit tests here and route tests in the
//! service crate (enable the `testing` feature).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::domain::{
    ActivatedSubscription, OutgoingPost, PostMedia, PublishMethod, PublishReceipt, SheetRow, UserSubscription, Voucher,
};
use crate::ports::{
    ChatPrompt, HeadlineSource, ImageHost, PagePublisher, PortError, PortResult, ReplySender, SheetStore,
    SubscriptionStore, TextGenerationService,
};
use crate::sheet::{self, HeaderPlan};

fn poisoned() -> PortError {
    PortError::Unexpected("test fake lock poisoned".to_string())
}

//=========================================================================================
// Sheet
//=========================================================================================

/// A worksheet held as a grid of cells; row 1 is the header once written.
#[derive(Default)]
pub struct MemorySheet {
    grid: Mutex<Vec<Vec<String>>>,
}

impl MemorySheet {
    pub fn with_grid(grid: Vec<Vec<String>>) -> Self {
        Self { grid: Mutex::new(grid) }
    }

    pub fn data_rows(&self) -> usize {
        self.grid.lock().map(|g| g.len().saturating_sub(1)).unwrap_or(0)
    }

    /// The value of `column` in 1-based sheet row `row_number`.
    pub fn cell(&self, row_number: u32, column: &str) -> Option<String> {
        let grid = self.grid.lock().ok()?;
        let col = grid.first()?.iter().position(|c| c == column)?;
        let row = grid.get((row_number as usize).checked_sub(1)?)?;
        Some(row.get(col).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SheetStore for MemorySheet {
    async fn ensure_headers(&self) -> PortResult<Vec<String>> {
        let mut grid = self.grid.lock().map_err(|_| poisoned())?;
        let plan = sheet::plan_headers(grid.first().map(Vec::as_slice));
        match plan {
            HeaderPlan::AppendRequired(header) => {
                grid.insert(0, header.clone());
                Ok(header)
            }
            HeaderPlan::Rewrite(header) => {
                let data = sheet::remap_rows(&grid[0], &header, &grid[1..]);
                *grid = std::iter::once(header.clone()).chain(data).collect();
                Ok(header)
            }
            HeaderPlan::Keep(header) => Ok(header),
        }
    }

    async fn list_rows(&self) -> PortResult<Vec<SheetRow>> {
        let grid = self.grid.lock().map_err(|_| poisoned())?;
        Ok(sheet::rows_from_values(&grid))
    }

    async fn append_row(&self, header: &[String], row: &BTreeMap<String, String>) -> PortResult<()> {
        let mut grid = self.grid.lock().map_err(|_| poisoned())?;
        grid.push(sheet::row_payload(header, row));
        Ok(())
    }

    async fn update_fields(
        &self,
        row_number: u32,
        header: &[String],
        fields: &BTreeMap<String, String>,
    ) -> PortResult<()> {
        let mut grid = self.grid.lock().map_err(|_| poisoned())?;
        let missing = || PortError::NotFound(format!("row {}", row_number));
        let idx = (row_number as usize).checked_sub(1).ok_or_else(missing)?;
        let row = grid.get_mut(idx).ok_or_else(missing)?;
        for (name, value) in fields {
            let Some(col) = sheet::column_index(header, name) else { continue };
            if row.len() < col {
                row.resize(col, String::new());
            }
            row[col - 1] = value.clone();
        }
        Ok(())
    }

    async fn delete_row(&self, row_number: u32) -> PortResult<()> {
        let mut grid = self.grid.lock().map_err(|_| poisoned())?;
        if row_number < 2 || row_number as usize > grid.len() {
            return Err(PortError::NotFound(format!("row {}", row_number)));
        }
        grid.remove(row_number as usize - 1);
        Ok(())
    }
}

//=========================================================================================
// Subscriptions
//=========================================================================================

#[derive(Default)]
pub struct MemorySubscriptions {
    vouchers: Mutex<HashMap<String, Voucher>>,
    users: Mutex<HashMap<String, UserSubscription>>,
}

impl MemorySubscriptions {
    pub fn put_subscription(&self, sub: UserSubscription) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(sub.user_id.clone(), sub);
        }
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptions {
    async fn insert_vouchers(&self, vouchers: &[Voucher]) -> PortResult<Vec<String>> {
        let mut stored = self.vouchers.lock().map_err(|_| poisoned())?;
        let mut inserted = Vec::new();
        for v in vouchers {
            if !stored.contains_key(&v.code) {
                stored.insert(v.code.clone(), v.clone());
                inserted.push(v.code.clone());
            }
        }
        Ok(inserted)
    }

    async fn activate_voucher(
        &self,
        user_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> PortResult<ActivatedSubscription> {
        let mut vouchers = self.vouchers.lock().map_err(|_| poisoned())?;
        let voucher = vouchers
            .get_mut(code)
            .ok_or_else(|| PortError::NotFound("code not found".to_string()))?;
        if voucher.is_used {
            return Err(PortError::Conflict("code already used".to_string()));
        }
        voucher.is_used = true;
        voucher.used_by = Some(user_id.to_string());
        voucher.used_at = Some(sheet::format_time_utc(now));

        let end = now + Duration::days(i64::from(voucher.duration_days));
        self.put_subscription(UserSubscription {
            user_id: user_id.to_string(),
            subscription_end: sheet::format_time_utc(end),
            created_at: sheet::format_time_utc(now),
        });
        Ok(ActivatedSubscription {
            user_id: user_id.to_string(),
            subscription_end: end,
        })
    }

    async fn get_subscription(&self, user_id: &str) -> PortResult<Option<UserSubscription>> {
        let users = self.users.lock().map_err(|_| poisoned())?;
        Ok(users.get(user_id).cloned())
    }
}

//=========================================================================================
// Text Generation, Headlines, Image Hosting
//=========================================================================================

enum Script {
    Always(String),
    Failing(PortError),
}

/// Answers every prompt the same way and remembers what it was asked.
pub struct ScriptedText {
    script: Script,
    seen: Mutex<Vec<ChatPrompt>>,
}

impl ScriptedText {
    pub fn always(text: &str) -> Self {
        Self {
            script: Script::Always(text.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: PortError) -> Self {
        Self {
            script: Script::Failing(error),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<ChatPrompt> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerationService for ScriptedText {
    async fn complete(&self, prompt: &ChatPrompt) -> PortResult<String> {
        self.seen.lock().map_err(|_| poisoned())?.push(prompt.clone());
        match &self.script {
            Script::Always(text) => Ok(text.clone()),
            Script::Failing(e) => Err(e.clone()),
        }
    }
}

pub struct StaticHeadlines(pub Option<String>);

#[async_trait]
impl HeadlineSource for StaticHeadlines {
    async fn random_headline(&self, _feeds: &[String]) -> PortResult<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Pretends to host images under a predictable URL.
#[derive(Default)]
pub struct MemoryImageHost {
    uploads: Mutex<Vec<(String, usize)>>,
}

impl MemoryImageHost {
    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageHost for MemoryImageHost {
    async fn upload(&self, image: &[u8], name: &str) -> PortResult<String> {
        self.uploads
            .lock()
            .map_err(|_| poisoned())?
            .push((name.to_string(), image.len()));
        Ok(format!("https://i.ibb.co/test/{}.jpg", name))
    }
}

//=========================================================================================
// Publishing and Replies
//=========================================================================================

pub struct RecordingPublisher {
    failure: Option<String>,
    posts: Mutex<Vec<OutgoingPost>>,
}

impl RecordingPublisher {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            posts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            posts: Mutex::new(Vec::new()),
        }
    }

    /// Posts that were accepted.
    pub fn posts(&self) -> Vec<OutgoingPost> {
        self.posts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PagePublisher for RecordingPublisher {
    async fn publish(&self, post: &OutgoingPost) -> PortResult<PublishReceipt> {
        if let Some(message) = &self.failure {
            return Err(PortError::Upstream(message.clone()));
        }
        let mut posts = self.posts.lock().map_err(|_| poisoned())?;
        posts.push(post.clone());
        let method = match post.media {
            PostMedia::None => PublishMethod::Feed,
            PostMedia::Image(_) => PublishMethod::PhotoUpload,
            PostMedia::Video(_) => PublishMethod::Video,
        };
        Ok(PublishReceipt {
            post_id: Some(format!("page_{}", posts.len())),
            method,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentReply {
    Messenger(String, String),
    Comment(String, String),
    WhatsApp(String, String, String),
}

#[derive(Default)]
pub struct RecordingReplies {
    sent: Mutex<Vec<SentReply>>,
}

impl RecordingReplies {
    pub fn sent(&self) -> Vec<SentReply> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, reply: SentReply) -> PortResult<()> {
        self.sent.lock().map_err(|_| poisoned())?.push(reply);
        Ok(())
    }
}

#[async_trait]
impl ReplySender for RecordingReplies {
    async fn send_messenger(&self, recipient_id: &str, text: &str) -> PortResult<()> {
        self.record(SentReply::Messenger(recipient_id.to_string(), text.to_string()))
    }

    async fn reply_to_comment(&self, comment_id: &str, text: &str) -> PortResult<()> {
        self.record(SentReply::Comment(comment_id.to_string(), text.to_string()))
    }

    async fn send_whatsapp(&self, phone_number_id: &str, to: &str, text: &str) -> PortResult<()> {
        self.record(SentReply::WhatsApp(
            phone_number_id.to_string(),
            to.to_string(),
            text.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn legacy_sheet_keeps_its_data_after_header_rewrite() {
        let sheet = MemorySheet::with_grid(vec![
            strings(&["Scheduled_Time", "AI_Caption", "Status", "Owner"]),
            strings(&["2026-01-01T09:00:00+00:00", "first", "Scheduled", "ops"]),
            strings(&["2026-01-02T09:00:00+00:00", "second", "Posted"]),
        ]);
        let header = sheet.ensure_headers().await.unwrap();
        assert_eq!(&header[..6], &sheet::required_header()[..]);
        assert_eq!(header[6], "Owner");

        let rows = sheet.list_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].caption(), "first");
        assert_eq!(rows[0].get("Owner"), "ops");
        assert!(rows[0].is_scheduled());
        assert_eq!(rows[1].caption(), "second");
        assert_eq!(rows[1].get("Scheduled_Time"), "2026-01-02T09:00:00+00:00");
        assert_eq!(rows[1].get("Owner"), "");
    }
}
