//! crates/academy_core/src/publisher.rs
//!
//! The publisher: drains due rows from the queue one per tick, keeps the queue
//! from running dry, and runs the hourly automatic post.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use crate::content::ContentStudio;
use crate::domain::{
    AcademyData, BotConfig, NewBufferRow, OutgoingPost, PostMedia, PostSource, PostStatus, PublishMethod, SheetRow,
};
use crate::ports::{HeadlineSource, PagePublisher, PortError, PortResult};
use crate::prompts::PostTheme;
use crate::queue::BufferQueue;
use crate::schedule::{self, SchedulePolicy, PREFILL_HOURS_RANGE};
use crate::sheet;

/// Deployment-level knobs. Runtime-editable settings live in `BotConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    pub buffer_minutes: i64,
    pub prefill_hours: i64,
    pub local_offset: FixedOffset,
}

/// Outcome of one publisher tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TickReport {
    Published {
        row: u32,
        post_id: Option<String>,
        method: PublishMethod,
    },
    Failed {
        row: u32,
        error: String,
    },
    Prefilled {
        scheduled_time: String,
    },
    PrefillFailed {
        error: String,
    },
    /// Nothing due and the lookahead window already has a post.
    Idle,
    /// Another tick or auto-post is still running.
    Busy,
}

/// Outcome of `/auto-post-trigger`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AutoPostReport {
    Posted {
        theme: String,
        post_id: Option<String>,
        headline: Option<String>,
    },
    Failed {
        theme: String,
        error: String,
    },
    Skipped {
        reason: String,
    },
    Busy,
}

/// Result of publishing one specific row on operator request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostNowReport {
    pub row: u32,
    pub status: PostStatus,
    pub post_id: Option<String>,
    pub error: Option<String>,
}

pub struct Publisher {
    queue: BufferQueue,
    studio: ContentStudio,
    page: Arc<dyn PagePublisher>,
    headlines: Arc<dyn HeadlineSource>,
    settings: PublisherSettings,
    config: Arc<RwLock<BotConfig>>,
    academy: Arc<RwLock<AcademyData>>,
    // Serialises publishing and row edits inside this process.
    running: Mutex<()>,
}

impl Publisher {
    pub fn new(
        queue: BufferQueue,
        studio: ContentStudio,
        page: Arc<dyn PagePublisher>,
        headlines: Arc<dyn HeadlineSource>,
        settings: PublisherSettings,
        config: Arc<RwLock<BotConfig>>,
        academy: Arc<RwLock<AcademyData>>,
    ) -> Self {
        Self {
            queue,
            studio,
            page,
            headlines,
            settings,
            config,
            academy,
            running: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &BufferQueue {
        &self.queue
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// The policy in force right now (active hours are runtime-editable).
    pub async fn policy(&self) -> SchedulePolicy {
        let hours = self.config.read().await.active_hours.clone();
        SchedulePolicy::new(self.settings.buffer_minutes, hours, self.settings.local_offset)
    }

    pub async fn next_slot(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.policy().await.next_available_slot(now)
    }

    /// Queues a post at the next free slot and returns the appended row.
    pub async fn enqueue(
        &self,
        caption: String,
        image_url: String,
        source: PostSource,
        now: DateTime<Utc>,
    ) -> PortResult<NewBufferRow> {
        let at = self.next_slot(now).await;
        let row = NewBufferRow::scheduled(now, at, caption, image_url, source);
        self.queue.append(&row).await?;
        Ok(row)
    }

    /// One tick: publish the oldest due row, or prefill when the lookahead is empty.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> PortResult<TickReport> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("tick skipped, previous run still in progress");
            return Ok(TickReport::Busy);
        };

        let rows = self.queue.rows().await?;
        if let Some(row) = schedule::find_due_scheduled(&rows, now).first() {
            return self.publish_row(row).await;
        }

        let lookahead = self
            .settings
            .prefill_hours
            .clamp(*PREFILL_HOURS_RANGE.start(), *PREFILL_HOURS_RANGE.end());
        let horizon = now
            .checked_add_signed(Duration::hours(lookahead))
            .ok_or_else(|| PortError::InvalidInput("prefill horizon is out of range".to_string()))?;
        if schedule::has_scheduled_within(&rows, now, horizon) {
            return Ok(TickReport::Idle);
        }

        Ok(self.prefill(now).await)
    }

    async fn publish_row(&self, row: &SheetRow) -> PortResult<TickReport> {
        let report = self.publish_and_mark(row).await?;
        Ok(match report.error {
            None => TickReport::Published {
                row: report.row,
                post_id: report.post_id,
                method: report.method.unwrap_or(PublishMethod::Feed),
            },
            Some(error) => TickReport::Failed { row: report.row, error },
        })
    }

    async fn prefill(&self, now: DateTime<Utc>) -> TickReport {
        let data = self.academy.read().await.clone();
        let mood = self.config.read().await.mood;
        let generated = match self.studio.random_post(&data, mood).await {
            Ok(post) => post,
            Err(e) => {
                error!(error = %e, "prefill generation failed");
                return TickReport::PrefillFailed { error: e.to_string() };
            }
        };
        match self
            .enqueue(generated.caption, generated.image_url, PostSource::AiGenerated, now)
            .await
        {
            Ok(row) => TickReport::Prefilled {
                scheduled_time: sheet::format_time_utc(row.scheduled_time),
            },
            Err(e) => {
                error!(error = %e, "prefill row could not be queued");
                TickReport::PrefillFailed { error: e.to_string() }
            }
        }
    }

    /// Publishes `row_number` immediately, whatever its scheduled time.
    /// Posted rows are refused so an operator cannot double-post by accident.
    pub async fn post_now(&self, row_number: u32) -> PortResult<PostNowReport> {
        let Ok(_guard) = self.running.try_lock() else {
            return Err(PortError::Conflict("the publisher is busy, try again".to_string()));
        };
        let row = self.queue.get(row_number).await?;
        if row.status() == Some(PostStatus::Posted) {
            return Err(PortError::Conflict(format!("row {} is already posted", row_number)));
        }
        let report = self.publish_and_mark(&row).await?;
        Ok(PostNowReport {
            row: report.row,
            status: if report.error.is_none() { PostStatus::Posted } else { PostStatus::Failed },
            post_id: report.post_id,
            error: report.error,
        })
    }

    async fn publish_and_mark(&self, row: &SheetRow) -> PortResult<Attempt> {
        let post = OutgoingPost::from_row(row);
        let outcome = self.page.publish(&post).await;
        let status = if outcome.is_ok() { PostStatus::Posted } else { PostStatus::Failed };

        // The sheet may have shifted while the vendor call was in flight.
        let at = match self.locate(row).await? {
            Some(at) => {
                self.queue.set_status(at, status).await?;
                at
            }
            None => {
                warn!(row = row.row_number, status = %status, "row left the sheet while publishing, status not recorded");
                row.row_number
            }
        };

        Ok(match outcome {
            Ok(receipt) => {
                info!(row = at, post_id = ?receipt.post_id, method = ?receipt.method, "row published");
                Attempt {
                    row: at,
                    post_id: receipt.post_id,
                    method: Some(receipt.method),
                    error: None,
                }
            }
            Err(e) => {
                warn!(row = at, error = %e, "publishing failed, row marked failed");
                Attempt {
                    row: at,
                    post_id: None,
                    method: None,
                    error: Some(e.to_string()),
                }
            }
        })
    }

    /// Current row number of `row`, matched on content rather than position.
    async fn locate(&self, row: &SheetRow) -> PortResult<Option<u32>> {
        let rows = self.queue.rows().await?;
        if rows
            .iter()
            .any(|r| r.row_number == row.row_number && r.same_entry(row))
        {
            return Ok(Some(row.row_number));
        }
        Ok(rows.iter().find(|r| r.same_entry(row)).map(|r| r.row_number))
    }

    // Row edits wait for any publish in progress so a row cannot move underneath it.

    pub async fn update_caption(&self, row_number: u32, caption: &str) -> PortResult<()> {
        let _guard = self.running.lock().await;
        self.queue.update_caption(row_number, caption).await
    }

    pub async fn reschedule(&self, row_number: u32, at: DateTime<Utc>) -> PortResult<()> {
        let _guard = self.running.lock().await;
        self.queue.reschedule(row_number, at).await
    }

    pub async fn delete_row(&self, row_number: u32) -> PortResult<()> {
        let _guard = self.running.lock().await;
        self.queue.delete(row_number).await
    }

    /// The hourly themed post: generate, publish right away, log to the sheet.
    #[instrument(skip(self))]
    pub async fn auto_post(&self, now: DateTime<Utc>) -> PortResult<AutoPostReport> {
        let Ok(_guard) = self.running.try_lock() else {
            return Ok(AutoPostReport::Busy);
        };

        let policy = self.policy().await;
        if !policy.is_active_at(now) {
            return Ok(skipped("outside active hours"));
        }
        let hour = policy.local_hour(now);
        let Some(theme) = PostTheme::for_hour(hour) else {
            return Ok(skipped("sleeping hours"));
        };
        let this_hour = schedule::hour_start(now);

        let (mood, feeds, last) = {
            let cfg = self.config.read().await;
            (cfg.mood, cfg.rss_feeds.clone(), cfg.last_auto_post)
        };
        if last == Some(this_hour) {
            return Ok(skipped("already posted this hour"));
        }

        let headline = match self.headlines.random_headline(&feeds).await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "no headline inspiration available");
                None
            }
        };

        let data = self.academy.read().await.clone();
        let generated = self
            .studio
            .themed_post(&data, mood, theme, headline.as_deref())
            .await?;

        let post = OutgoingPost {
            caption: generated.caption.clone(),
            media: PostMedia::Image(generated.image_url.clone()),
        };
        let outcome = self.page.publish(&post).await;
        let status = if outcome.is_ok() { PostStatus::Posted } else { PostStatus::Failed };

        let log_row = NewBufferRow {
            status,
            ..NewBufferRow::scheduled(now, now, generated.caption, generated.image_url, PostSource::AiGenerated)
        };
        if let Err(e) = self.queue.append(&log_row).await {
            warn!(error = %e, "auto-post could not be logged to the sheet");
        }

        let theme = theme.label().to_string();
        Ok(match outcome {
            Ok(receipt) => {
                self.config.write().await.last_auto_post = Some(this_hour);
                info!(theme = %theme, post_id = ?receipt.post_id, "auto-post published");
                AutoPostReport::Posted {
                    theme,
                    post_id: receipt.post_id,
                    headline,
                }
            }
            Err(e) => {
                error!(theme = %theme, error = %e, "auto-post failed");
                AutoPostReport::Failed {
                    theme,
                    error: e.to_string(),
                }
            }
        })
    }
}

struct Attempt {
    row: u32,
    post_id: Option<String>,
    method: Option<PublishMethod>,
    error: Option<String>,
}

fn skipped(reason: &str) -> AutoPostReport {
    AutoPostReport::Skipped {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ImageStrategy;
    use crate::domain::{Mood, PublishReceipt};
    use crate::ports::SheetStore;
    use crate::testing::{MemorySheet, RecordingPublisher, ScriptedText, StaticHeadlines};
    use chrono::TimeZone;

    struct Harness {
        sheet: Arc<MemorySheet>,
        page: Arc<RecordingPublisher>,
        config: Arc<RwLock<BotConfig>>,
        publisher: Publisher,
    }

    fn build(
        sheet: Arc<MemorySheet>,
        page: Arc<dyn PagePublisher>,
        llm: ScriptedText,
        prefill_hours: i64,
        config: Arc<RwLock<BotConfig>>,
    ) -> Publisher {
        Publisher::new(
            BufferQueue::new(sheet),
            ContentStudio::new(Arc::new(llm), ImageStrategy::Fallback),
            page,
            Arc::new(StaticHeadlines(Some("Local champion wins gold".to_string()))),
            PublisherSettings {
                buffer_minutes: 30,
                prefill_hours,
                local_offset: FixedOffset::east_opt(0).unwrap(),
            },
            config,
            Arc::new(RwLock::new(AcademyData::default())),
        )
    }

    fn config() -> Arc<RwLock<BotConfig>> {
        Arc::new(RwLock::new(BotConfig {
            mood: Mood::Balanced,
            ..BotConfig::default()
        }))
    }

    fn harness_with(page: RecordingPublisher, llm: ScriptedText, prefill_hours: i64) -> Harness {
        let sheet = Arc::new(MemorySheet::default());
        let page = Arc::new(page);
        let config = config();
        let publisher = build(sheet.clone(), page.clone(), llm, prefill_hours, config.clone());
        Harness {
            sheet,
            page,
            config,
            publisher,
        }
    }

    fn harness(page: RecordingPublisher, llm: ScriptedText) -> Harness {
        harness_with(page, llm, 6)
    }

    /// Deletes a sheet row while the post is "in flight".
    struct ShiftingPublisher {
        sheet: Arc<MemorySheet>,
        delete: u32,
    }

    #[async_trait::async_trait]
    impl PagePublisher for ShiftingPublisher {
        async fn publish(&self, _post: &OutgoingPost) -> PortResult<PublishReceipt> {
            self.sheet.delete_row(self.delete).await?;
            Ok(PublishReceipt {
                post_id: Some("p1".to_string()),
                method: PublishMethod::PhotoUpload,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    async fn queue_at(h: &Harness, at: DateTime<Utc>, caption: &str) {
        h.publisher
            .queue()
            .append(&NewBufferRow::scheduled(
                now() - Duration::hours(1),
                at,
                caption.to_string(),
                "https://i.ibb.co/p.jpg".to_string(),
                PostSource::UserUpload,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn due_row_is_posted_once() {
        let h = harness(RecordingPublisher::succeeding(), ScriptedText::always("x"));
        queue_at(&h, now() - Duration::minutes(10), "due").await;
        queue_at(&h, now() + Duration::hours(2), "later").await;

        let first = h.publisher.tick(now()).await.unwrap();
        assert!(matches!(first, TickReport::Published { row: 2, .. }));
        assert_eq!(h.sheet.cell(2, "Status").as_deref(), Some("Posted"));

        let second = h.publisher.tick(now()).await.unwrap();
        assert_eq!(second, TickReport::Idle);
        assert_eq!(h.page.posts().len(), 1);
        assert_eq!(
            h.page.posts()[0].media,
            PostMedia::Image("https://i.ibb.co/p.jpg".to_string())
        );
    }

    #[tokio::test]
    async fn status_follows_the_row_when_the_sheet_shifts() {
        let sheet = Arc::new(MemorySheet::default());
        let page = Arc::new(ShiftingPublisher {
            sheet: sheet.clone(),
            delete: 2,
        });
        let publisher = build(sheet.clone(), page, ScriptedText::always("x"), 6, config());
        let queue = publisher.queue().clone();
        for (at, caption) in [
            (now() - Duration::hours(3), "old-failed"),
            (now() - Duration::minutes(10), "due"),
            (now() + Duration::hours(2), "future"),
        ] {
            queue
                .append(&NewBufferRow::scheduled(
                    now() - Duration::hours(4),
                    at,
                    caption.to_string(),
                    String::new(),
                    PostSource::UserText,
                ))
                .await
                .unwrap();
        }
        queue.set_status(2, PostStatus::Failed).await.unwrap();

        let report = publisher.tick(now()).await.unwrap();
        assert!(matches!(report, TickReport::Published { row: 2, .. }));
        assert_eq!(sheet.cell(2, "AI_Caption").as_deref(), Some("due"));
        assert_eq!(sheet.cell(2, "Status").as_deref(), Some("Posted"));
        assert_eq!(sheet.cell(3, "AI_Caption").as_deref(), Some("future"));
        assert_eq!(sheet.cell(3, "Status").as_deref(), Some("Scheduled"));
    }

    #[tokio::test]
    async fn row_edits_wait_for_a_running_publish() {
        let h = harness(RecordingPublisher::succeeding(), ScriptedText::always("x"));
        queue_at(&h, now() + Duration::hours(2), "later").await;

        let held = h.publisher.running.lock().await;
        let blocked = tokio::time::timeout(std::time::Duration::from_millis(50), h.publisher.delete_row(2)).await;
        assert!(blocked.is_err());
        assert_eq!(h.sheet.data_rows(), 1);

        drop(held);
        h.publisher.update_caption(2, "edited").await.unwrap();
        assert_eq!(h.sheet.cell(2, "AI_Caption").as_deref(), Some("edited"));
        h.publisher.delete_row(2).await.unwrap();
        assert_eq!(h.sheet.data_rows(), 0);
    }

    #[tokio::test]
    async fn lookahead_below_one_hour_does_not_flood_the_queue() {
        for hours in [0, -3] {
            let h = harness_with(RecordingPublisher::succeeding(), ScriptedText::always("x"), hours);
            assert!(matches!(h.publisher.tick(now()).await.unwrap(), TickReport::Prefilled { .. }));
            for _ in 0..4 {
                assert_eq!(h.publisher.tick(now()).await.unwrap(), TickReport::Idle);
            }
            assert_eq!(h.sheet.data_rows(), 1);
        }
    }

    #[tokio::test]
    async fn huge_lookahead_is_capped() {
        let h = harness_with(RecordingPublisher::succeeding(), ScriptedText::always("x"), 2_000_000_000_000);
        assert!(matches!(h.publisher.tick(now()).await.unwrap(), TickReport::Prefilled { .. }));
        assert_eq!(h.publisher.tick(now()).await.unwrap(), TickReport::Idle);
    }

    #[tokio::test]
    async fn only_oldest_due_row_per_tick() {
        let h = harness(RecordingPublisher::succeeding(), ScriptedText::always("x"));
        queue_at(&h, now() - Duration::minutes(5), "newer").await;
        queue_at(&h, now() - Duration::minutes(50), "older").await;

        h.publisher.tick(now()).await.unwrap();
        assert_eq!(h.page.posts()[0].caption, "older");
        assert_eq!(h.sheet.cell(2, "Status").as_deref(), Some("Scheduled"));
        assert_eq!(h.sheet.cell(3, "Status").as_deref(), Some("Posted"));
    }

    #[tokio::test]
    async fn publish_failure_marks_row_failed_without_retry() {
        let h = harness(RecordingPublisher::failing("(#200) permissions"), ScriptedText::always("x"));
        queue_at(&h, now() - Duration::minutes(10), "due").await;
        queue_at(&h, now() + Duration::hours(1), "later").await;

        let report = h.publisher.tick(now()).await.unwrap();
        assert!(matches!(report, TickReport::Failed { row: 2, .. }));
        assert_eq!(h.sheet.cell(2, "Status").as_deref(), Some("Failed"));
        assert_eq!(h.publisher.tick(now()).await.unwrap(), TickReport::Idle);
    }

    #[tokio::test]
    async fn empty_lookahead_is_prefilled() {
        let h = harness(RecordingPublisher::succeeding(), ScriptedText::always("منشور جديد"));
        let report = h.publisher.tick(now()).await.unwrap();
        assert_eq!(
            report,
            TickReport::Prefilled {
                scheduled_time: "2026-05-10T12:30:00+00:00".to_string()
            }
        );
        assert_eq!(h.sheet.cell(2, "Source").as_deref(), Some("AI_Generated"));
        assert_eq!(h.sheet.cell(2, "AI_Caption").as_deref(), Some("منشور جديد"));
        // The new row is within the lookahead, so the next tick has nothing to do.
        assert_eq!(h.publisher.tick(now()).await.unwrap(), TickReport::Idle);
    }

    #[tokio::test]
    async fn prefill_failure_is_reported() {
        let h = harness(
            RecordingPublisher::succeeding(),
            ScriptedText::failing(PortError::Upstream("groq down".into())),
        );
        let report = h.publisher.tick(now()).await.unwrap();
        assert!(matches!(report, TickReport::PrefillFailed { .. }));
        assert_eq!(h.sheet.data_rows(), 0);
    }

    #[tokio::test]
    async fn overlapping_tick_reports_busy() {
        let h = harness(RecordingPublisher::succeeding(), ScriptedText::always("x"));
        let _held = h.publisher.running.lock().await;
        assert_eq!(h.publisher.tick(now()).await.unwrap(), TickReport::Busy);
    }

    #[tokio::test]
    async fn post_now_refuses_posted_rows() {
        let h = harness(RecordingPublisher::succeeding(), ScriptedText::always("x"));
        queue_at(&h, now() + Duration::hours(3), "manual").await;

        let report = h.publisher.post_now(2).await.unwrap();
        assert_eq!(report.status, PostStatus::Posted);
        assert!(matches!(h.publisher.post_now(2).await, Err(PortError::Conflict(_))));
        assert!(matches!(h.publisher.post_now(7).await, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn auto_post_runs_once_per_hour() {
        let h = harness(RecordingPublisher::succeeding(), ScriptedText::always("صحة وتغذية"));
        let report = h.publisher.auto_post(now()).await.unwrap();
        match report {
            AutoPostReport::Posted { headline, .. } => {
                assert_eq!(headline.as_deref(), Some("Local champion wins gold"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.sheet.cell(2, "Status").as_deref(), Some("Posted"));

        let again = h.publisher.auto_post(now() + Duration::minutes(20)).await.unwrap();
        assert!(matches!(again, AutoPostReport::Skipped { .. }));
        assert_eq!(h.page.posts().len(), 1);
    }

    #[tokio::test]
    async fn auto_post_respects_hours() {
        let h = harness(RecordingPublisher::succeeding(), ScriptedText::always("x"));
        let night = Utc.with_ymd_and_hms(2026, 5, 10, 3, 0, 0).unwrap();
        assert!(matches!(
            h.publisher.auto_post(night).await.unwrap(),
            AutoPostReport::Skipped { .. }
        ));

        h.config.write().await.active_hours = vec![9];
        assert!(matches!(
            h.publisher.auto_post(now()).await.unwrap(),
            AutoPostReport::Skipped { .. }
        ));
        assert!(h.page.posts().is_empty());
    }
}
