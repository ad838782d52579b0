//! crates/academy_core/src/queue.rs
//!
//! The post queue as the rest of the application sees it: typed operations over
//! the raw `SheetStore` port.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{NewBufferRow, PostStatus, SheetRow};
use crate::ports::{PortError, PortResult, SheetStore};
use crate::schedule;
use crate::sheet::{self, COL_CAPTION, COL_SCHEDULED_TIME, COL_STATUS};

#[derive(Clone)]
pub struct BufferQueue {
    store: Arc<dyn SheetStore>,
}

impl BufferQueue {
    pub fn new(store: Arc<dyn SheetStore>) -> Self {
        Self { store }
    }

    pub async fn rows(&self) -> PortResult<Vec<SheetRow>> {
        self.store.ensure_headers().await?;
        self.store.list_rows().await
    }

    /// Scheduled rows in the order the publisher will take them.
    pub async fn pending(&self) -> PortResult<Vec<SheetRow>> {
        let rows = self.rows().await?;
        Ok(schedule::pending_rows(&rows).into_iter().cloned().collect())
    }

    pub async fn get(&self, row_number: u32) -> PortResult<SheetRow> {
        self.rows()
            .await?
            .into_iter()
            .find(|r| r.row_number == row_number)
            .ok_or_else(|| PortError::NotFound(format!("row {}", row_number)))
    }

    pub async fn append(&self, row: &NewBufferRow) -> PortResult<()> {
        let header = self.store.ensure_headers().await?;
        self.store.append_row(&header, &row.to_fields()).await?;
        info!(
            source = %row.source,
            status = %row.status,
            at = %sheet::format_time_utc(row.scheduled_time),
            "queued post"
        );
        Ok(())
    }

    pub async fn set_status(&self, row_number: u32, status: PostStatus) -> PortResult<()> {
        self.update(row_number, [(COL_STATUS, status.as_str().to_string())]).await?;
        debug!(row = row_number, status = %status, "row status updated");
        Ok(())
    }

    pub async fn update_caption(&self, row_number: u32, caption: &str) -> PortResult<()> {
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(PortError::InvalidInput("caption must not be empty".to_string()));
        }
        self.get(row_number).await?;
        self.update(row_number, [(COL_CAPTION, caption.to_string())]).await
    }

    /// Puts a row back into the queue at `at`, whatever its current status.
    pub async fn reschedule(&self, row_number: u32, at: DateTime<Utc>) -> PortResult<()> {
        self.get(row_number).await?;
        self.update(
            row_number,
            [
                (COL_STATUS, PostStatus::Scheduled.as_str().to_string()),
                (COL_SCHEDULED_TIME, sheet::format_time_utc(at)),
            ],
        )
        .await?;
        info!(row = row_number, at = %sheet::format_time_utc(at), "row rescheduled");
        Ok(())
    }

    pub async fn delete(&self, row_number: u32) -> PortResult<()> {
        if row_number < 2 {
            return Err(PortError::InvalidInput("the header row cannot be deleted".to_string()));
        }
        self.get(row_number).await?;
        self.store.delete_row(row_number).await?;
        info!(row = row_number, "row deleted");
        Ok(())
    }

    async fn update<const N: usize>(&self, row_number: u32, fields: [(&str, String); N]) -> PortResult<()> {
        let header = self.store.ensure_headers().await?;
        let fields: BTreeMap<String, String> = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.store.update_fields(row_number, &header, &fields).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PostSource;
    use crate::testing::MemorySheet;
    use chrono::TimeZone;

    fn queue() -> (Arc<MemorySheet>, BufferQueue) {
        let sheet = Arc::new(MemorySheet::default());
        (sheet.clone(), BufferQueue::new(sheet))
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let (_, q) = queue();
        q.append(&NewBufferRow::scheduled(at(8), at(9), "c1".into(), "u1".into(), PostSource::UserUpload))
            .await
            .unwrap();
        let rows = q.rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[0].caption(), "c1");
        assert_eq!(rows[0].get("Scheduled_Time"), "2026-04-01T09:00:00+00:00");
        assert_eq!(rows[0].source(), PostSource::UserUpload);
    }

    #[tokio::test]
    async fn reschedule_and_delete() {
        let (sheet, q) = queue();
        for h in [9, 10] {
            q.append(&NewBufferRow::scheduled(at(8), at(h), "c".into(), "".into(), PostSource::UserText))
                .await
                .unwrap();
        }
        q.set_status(2, PostStatus::Failed).await.unwrap();
        assert_eq!(q.pending().await.unwrap().len(), 1);

        q.reschedule(2, at(12)).await.unwrap();
        let pending = q.pending().await.unwrap();
        assert_eq!(pending.iter().map(|r| r.row_number).collect::<Vec<_>>(), vec![3, 2]);

        q.delete(2).await.unwrap();
        assert_eq!(sheet.data_rows(), 1);
        assert!(matches!(q.delete(9).await, Err(PortError::NotFound(_))));
        assert!(matches!(q.delete(1).await, Err(PortError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn empty_caption_is_rejected() {
        let (_, q) = queue();
        q.append(&NewBufferRow::scheduled(at(8), at(9), "c".into(), "".into(), PostSource::UserText))
            .await
            .unwrap();
        assert!(matches!(q.update_caption(2, "  ").await, Err(PortError::InvalidInput(_))));
        q.update_caption(2, " new ").await.unwrap();
        assert_eq!(q.get(2).await.unwrap().caption(), "new");
    }
}
