//! crates/academy_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database, spreadsheet or wire format,
//! except for the serde derives the web layer reuses for its JSON bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::sheet::{self, COL_CAPTION, COL_IMAGE_URL, COL_SCHEDULED_TIME, COL_SOURCE, COL_STATUS, COL_TIMESTAMP};

//=========================================================================================
// Buffer Queue Rows
//=========================================================================================

/// Lifecycle of a queued post. `Posted` and `Failed` are terminal for the publisher;
/// only an operator moves a row out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostStatus {
    Scheduled,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "Scheduled",
            PostStatus::Posted => "Posted",
            PostStatus::Failed => "Failed",
        }
    }

    /// Case-insensitive, whitespace-tolerant parse of a sheet cell.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "scheduled" => Some(PostStatus::Scheduled),
            "posted" => Some(PostStatus::Posted),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a queued post came from. The sheet column is free text, so unknown
/// values are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostSource {
    AiGenerated,
    UserUpload,
    UserText,
    UserVideo,
    Other(String),
}

impl PostSource {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "AI_Generated" => PostSource::AiGenerated,
            "User_Upload" => PostSource::UserUpload,
            "User_Text" => PostSource::UserText,
            "User_Video" => PostSource::UserVideo,
            other => PostSource::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PostSource::AiGenerated => "AI_Generated",
            PostSource::UserUpload => "User_Upload",
            PostSource::UserText => "User_Text",
            PostSource::UserVideo => "User_Video",
            PostSource::Other(s) => s,
        }
    }
}

impl fmt::Display for PostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data row read back from the sheet. Identity is the 1-based sheet row number;
/// `fields` holds every header column, including ones this service does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetRow {
    #[serde(rename = "_row_number")]
    pub row_number: u32,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl SheetRow {
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn status(&self) -> Option<PostStatus> {
        PostStatus::parse(self.get(COL_STATUS))
    }

    pub fn is_scheduled(&self) -> bool {
        self.status() == Some(PostStatus::Scheduled)
    }

    pub fn scheduled_time(&self) -> Option<DateTime<Utc>> {
        sheet::parse_time_utc(self.get(COL_SCHEDULED_TIME))
    }

    pub fn caption(&self) -> &str {
        self.get(COL_CAPTION).trim()
    }

    pub fn image_url(&self) -> &str {
        self.get(COL_IMAGE_URL).trim()
    }

    pub fn source(&self) -> PostSource {
        PostSource::parse(self.get(COL_SOURCE))
    }

    /// Row numbers shift when rows above are deleted; the content does not.
    pub fn same_entry(&self, other: &SheetRow) -> bool {
        [COL_TIMESTAMP, COL_SCHEDULED_TIME, COL_CAPTION, COL_IMAGE_URL]
            .iter()
            .all(|col| self.get(col) == other.get(col))
    }
}

/// A row about to be appended to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBufferRow {
    pub timestamp: DateTime<Utc>,
    pub image_url: String,
    pub caption: String,
    pub status: PostStatus,
    pub scheduled_time: DateTime<Utc>,
    pub source: PostSource,
}

impl NewBufferRow {
    pub fn scheduled(now: DateTime<Utc>, at: DateTime<Utc>, caption: String, image_url: String, source: PostSource) -> Self {
        Self {
            timestamp: now,
            image_url,
            caption,
            status: PostStatus::Scheduled,
            scheduled_time: at,
            source,
        }
    }

    /// Column name → cell value, ready for positional layout against a header.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (COL_TIMESTAMP.to_string(), sheet::format_time_utc(self.timestamp)),
            (COL_IMAGE_URL.to_string(), self.image_url.clone()),
            (COL_CAPTION.to_string(), self.caption.clone()),
            (COL_STATUS.to_string(), self.status.as_str().to_string()),
            (COL_SCHEDULED_TIME.to_string(), sheet::format_time_utc(self.scheduled_time)),
            (COL_SOURCE.to_string(), self.source.as_str().to_string()),
        ])
    }
}

//=========================================================================================
// Publishing
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostMedia {
    None,
    Image(String),
    Video(String),
}

/// The payload handed to a page publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPost {
    pub caption: String,
    pub media: PostMedia,
}

impl OutgoingPost {
    /// Builds the post for a queue row. `User_Video` rows carry the video URL in
    /// the `Image_URL` column.
    pub fn from_row(row: &SheetRow) -> Self {
        let url = row.image_url();
        let media = match (url.is_empty(), row.source()) {
            (true, _) => PostMedia::None,
            (false, PostSource::UserVideo) => PostMedia::Video(url.to_string()),
            (false, _) => PostMedia::Image(url.to_string()),
        };
        Self {
            caption: row.caption().to_string(),
            media,
        }
    }
}

/// Which Graph API call ended up accepting the post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMethod {
    PhotoUpload,
    PhotoUrl,
    Feed,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub post_id: Option<String>,
    pub method: PublishMethod,
}

/// Caption plus image chosen for a generated post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedPost {
    pub caption: String,
    pub image_prompt: String,
    pub image_url: String,
}

//=========================================================================================
// Vouchers and Subscriptions
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voucher {
    pub code: String,
    pub duration_days: u32,
    pub is_used: bool,
    pub used_by: Option<String>,
    pub used_at: Option<String>,
    pub created_at: String,
}

/// Stored subscription row. Dates stay as text so that a corrupt value can be
/// treated as "not premium" instead of failing the lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSubscription {
    pub user_id: String,
    pub subscription_end: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivatedSubscription {
    pub user_id: String,
    pub subscription_end: DateTime<Utc>,
}

//=========================================================================================
// Academy Facts and Bot Runtime Configuration
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSource {
    pub name: String,
    pub url: String,
}

/// Static business facts injected into every prompt. Persisted as `academy_data.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcademyData {
    pub academy_name: String,
    pub manager: String,
    pub phone: String,
    pub phone_alt: String,
    pub location: String,
    pub map_link: String,
    pub facebook: String,
    pub schedules: BTreeMap<String, Vec<String>>,
    pub pricing: BTreeMap<String, String>,
    pub offers: Vec<String>,
    pub content_sources: BTreeMap<String, Vec<ContentSource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_subtitle: Option<String>,
}

impl AcademyData {
    pub fn sports(&self) -> Vec<&str> {
        self.schedules.keys().map(String::as_str).collect()
    }

    /// "primary أو alternate", or just the primary number.
    pub fn phones(&self) -> String {
        if self.phone_alt.trim().is_empty() {
            self.phone.clone()
        } else {
            format!("{} أو {}", self.phone, self.phone_alt)
        }
    }
}

impl Default for AcademyData {
    fn default() -> Self {
        let schedules = [
            ("كاراتيه", vec!["الأحد والثلاثاء والخميس - 4:30 م"]),
            ("كونغ فو", vec!["الاثنين والأربعاء - 6:00 م"]),
            ("كيك بوكسينج", vec!["الأحد والثلاثاء والأربعاء - 7:30 م"]),
            ("جمباز", vec!["الاثنين والخميس - 3:00 م (مبتدئين)", "الاثنين والخميس - 5:30 م"]),
            ("ملاكمة", vec!["بالاتفاق مع الكابتن"]),
            ("تايكوندو", vec!["بالاتفاق مع الكابتن"]),
        ];
        let pricing = [
            ("كاراتيه", "500 جنيه/شهر"),
            ("كونغ فو", "500 جنيه/شهر"),
            ("كيك بوكسينج", "500 جنيه/شهر"),
            ("جمباز", "600 جنيه/شهر"),
            ("تايكوندو", "600 جنيه/شهر"),
            ("ملاكمة", "600 جنيه/شهر"),
        ];
        Self {
            academy_name: "أكاديمية أبطال أكتوبر".to_string(),
            manager: "كابتن عز غريب".to_string(),
            phone: "01004945997".to_string(),
            phone_alt: "01033111786".to_string(),
            location: "الحي الثاني، المجاورة السابعة، عمارة 2151، مدينة 6 أكتوبر".to_string(),
            map_link: "https://maps.app.goo.gl/LLN1UTGfgcaFihqL8".to_string(),
            facebook: "https://www.facebook.com/october.heroes.academy".to_string(),
            schedules: schedules
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
                .collect(),
            pricing: pricing
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            offers: vec![
                "🎉 بمناسبة العام الجديد - بادر بالحجز لفترة محدودة!".to_string(),
                "💪 اشتراك شهري للكاراتيه والكونغ فو والكيك بوكس 500 جنيه فقط!".to_string(),
                "🤸 الجمباز والتايكوندو والملاكمة 600 جنيه لفترة محدودة!".to_string(),
            ],
            content_sources: BTreeMap::new(),
            system_name: None,
            system_subtitle: None,
        }
    }
}

/// Tone preset injected into prompts. Accepts the Arabic labels the operator UI sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    #[serde(alias = "رسمي جداً", alias = "رسمي")]
    Formal,
    #[serde(alias = "متوازن")]
    Balanced,
    #[default]
    #[serde(alias = "حماسي جداً", alias = "حماسي")]
    Enthusiastic,
}

/// Process-local bot settings. Lost on restart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BotConfig {
    pub active_hours: Vec<u32>,
    pub mood: Mood,
    pub rss_feeds: Vec<String>,
    /// Start of the local clock hour of the last auto-post, in UTC.
    #[serde(skip)]
    pub last_auto_post: Option<DateTime<Utc>>,
}

/// Partial update accepted by `/update-config`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfigUpdate {
    pub active_hours: Option<Vec<u32>>,
    pub mood: Option<Mood>,
    pub rss_feeds: Option<Vec<String>>,
}

impl BotConfig {
    /// Applies the fields present in `update`. Rejects hours outside 0-23 without
    /// changing anything.
    pub fn apply(&mut self, update: BotConfigUpdate) -> Result<(), String> {
        if let Some(hours) = &update.active_hours {
            if let Some(bad) = hours.iter().find(|h| **h > 23) {
                return Err(format!("active hour {} is outside 0-23", bad));
            }
        }
        if let Some(mut hours) = update.active_hours {
            hours.sort_unstable();
            hours.dedup();
            self.active_hours = hours;
        }
        if let Some(mood) = update.mood {
            self.mood = mood;
        }
        if let Some(feeds) = update.rss_feeds {
            self.rss_feeds = feeds
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, &str)]) -> SheetRow {
        SheetRow {
            row_number: 2,
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(PostStatus::parse(" scheduled "), Some(PostStatus::Scheduled));
        assert_eq!(PostStatus::parse("POSTED"), Some(PostStatus::Posted));
        assert_eq!(PostStatus::parse("draft"), None);
    }

    #[test]
    fn video_rows_publish_as_video() {
        let r = row(&[("Image_URL", "https://x/v.mp4"), ("Source", "User_Video"), ("AI_Caption", " hi ")]);
        let post = OutgoingPost::from_row(&r);
        assert_eq!(post.media, PostMedia::Video("https://x/v.mp4".to_string()));
        assert_eq!(post.caption, "hi");

        let r = row(&[("Source", "User_Text")]);
        assert_eq!(OutgoingPost::from_row(&r).media, PostMedia::None);
    }

    #[test]
    fn config_update_rejects_bad_hours() {
        let mut cfg = BotConfig::default();
        let err = cfg.apply(BotConfigUpdate {
            active_hours: Some(vec![9, 24]),
            mood: Some(Mood::Formal),
            ..Default::default()
        });
        assert!(err.is_err());
        assert_eq!(cfg, BotConfig::default());

        cfg.apply(BotConfigUpdate {
            active_hours: Some(vec![20, 9, 9]),
            rss_feeds: Some(vec![" https://a/feed ".into(), "".into()]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.active_hours, vec![9, 20]);
        assert_eq!(cfg.rss_feeds, vec!["https://a/feed".to_string()]);
    }

    #[test]
    fn mood_accepts_arabic_labels() {
        let mood: Mood = serde_json::from_str("\"متوازن\"").unwrap();
        assert_eq!(mood, Mood::Balanced);
        let mood: Mood = serde_json::from_str("\"formal\"").unwrap();
        assert_eq!(mood, Mood::Formal);
    }
}
