//! crates/academy_core/src/schedule.rs
//!
//! Scheduling policy for the post queue: which rows are due, whether the queue
//! has anything coming up, and where the next post slot falls given the active
//! posting hours.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};

use crate::domain::SheetRow;

/// Upper bound on the hour-by-hour forward scan.
const MAX_SLOT_SCAN_HOURS: u32 = 72;

/// Accepted range for the gap between "now" and a new slot.
pub const BUFFER_MINUTES_RANGE: std::ops::RangeInclusive<i64> = 0..=1440;
/// Accepted range for the prefill lookahead. A zero window never sees the
/// rows it just queued.
pub const PREFILL_HOURS_RANGE: std::ops::RangeInclusive<i64> = 1..=168;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Minimum distance between "now" and a new slot.
    pub buffer: Duration,
    /// Allowed local hours of day. Empty means no restriction.
    pub active_hours: Vec<u32>,
    /// The zone the active hours are expressed in.
    pub local_offset: FixedOffset,
}

impl SchedulePolicy {
    pub fn new(buffer_minutes: i64, active_hours: Vec<u32>, local_offset: FixedOffset) -> Self {
        Self {
            buffer: Duration::minutes(buffer_minutes.clamp(*BUFFER_MINUTES_RANGE.start(), *BUFFER_MINUTES_RANGE.end())),
            active_hours,
            local_offset,
        }
    }

    pub fn local_hour(&self, at: DateTime<Utc>) -> u32 {
        at.with_timezone(&self.local_offset).hour()
    }

    /// True when `at` falls inside an active hour (or there is no restriction).
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.active_hours.is_empty() || self.active_hours.contains(&self.local_hour(at))
    }

    /// `now + buffer` if that instant is allowed; otherwise the start of the first
    /// allowed local hour after it.
    pub fn next_available_slot(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let candidate = now.checked_add_signed(self.buffer).unwrap_or(now);
        if self.is_active_at(candidate) {
            return candidate;
        }

        let mut slot = truncate_to_hour(candidate);
        for _ in 0..MAX_SLOT_SCAN_HOURS {
            let Some(next) = slot.checked_add_signed(Duration::hours(1)) else { break };
            slot = next;
            if self.is_active_at(slot) {
                return slot;
            }
        }
        candidate
    }
}

/// Drops minutes, seconds and sub-seconds. Whole-hour offsets keep this aligned
/// with local hour boundaries.
fn truncate_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Start of the local clock hour containing `at`, expressed in UTC.
pub fn hour_start(at: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_hour(at)
}

/// Scheduled rows whose time has come, oldest first. Rows with an unparsable
/// `Scheduled_Time` are never due.
pub fn find_due_scheduled(rows: &[SheetRow], now: DateTime<Utc>) -> Vec<&SheetRow> {
    let mut due: Vec<(DateTime<Utc>, &SheetRow)> = rows
        .iter()
        .filter(|r| r.is_scheduled())
        .filter_map(|r| r.scheduled_time().map(|t| (t, r)))
        .filter(|(t, _)| *t <= now)
        .collect();
    due.sort_by_key(|(t, _)| *t);
    due.into_iter().map(|(_, r)| r).collect()
}

/// Whether any scheduled row falls inside `[start, end]`.
pub fn has_scheduled_within(rows: &[SheetRow], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    rows.iter()
        .filter(|r| r.is_scheduled())
        .filter_map(SheetRow::scheduled_time)
        .any(|t| start <= t && t <= end)
}

/// Scheduled rows in queue order (by time, unparsable times last).
pub fn pending_rows(rows: &[SheetRow]) -> Vec<&SheetRow> {
    let mut pending: Vec<&SheetRow> = rows.iter().filter(|r| r.is_scheduled()).collect();
    pending.sort_by_key(|r| (r.scheduled_time().is_none(), r.scheduled_time()));
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(n: u32, status: &str, at: &str) -> SheetRow {
        SheetRow {
            row_number: n,
            fields: [("Status", status), ("Scheduled_Time", at)]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn no_active_hours_means_plain_buffer() {
        let policy = SchedulePolicy::new(30, vec![], utc());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 3, 17, 42).unwrap();
        assert_eq!(policy.next_available_slot(now), now + Duration::minutes(30));
    }

    #[test]
    fn oversized_buffer_is_capped_at_a_day() {
        let policy = SchedulePolicy::new(i64::MAX, vec![], utc());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
        assert_eq!(policy.next_available_slot(now), now + Duration::days(1));
    }

    #[test]
    fn slot_lands_on_active_hour_boundary() {
        let policy = SchedulePolicy::new(30, vec![9, 14], utc());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 45, 10).unwrap();
        let slot = policy.next_available_slot(now);
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap());
    }

    #[test]
    fn slot_inside_active_hour_keeps_buffer() {
        let policy = SchedulePolicy::new(30, vec![9], utc());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 10, 0).unwrap();
        assert_eq!(policy.next_available_slot(now), now + Duration::minutes(30));
    }

    #[test]
    fn slot_wraps_to_next_day() {
        let policy = SchedulePolicy::new(30, vec![8], utc());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 22, 0, 0).unwrap();
        assert_eq!(
            policy.next_available_slot(now),
            Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn slot_hour_is_always_allowed_and_not_early() {
        let cairo = FixedOffset::east_opt(2 * 3600).unwrap();
        let hours = vec![9, 11, 14, 17, 20, 22];
        let policy = SchedulePolicy::new(30, hours.clone(), cairo);
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 7, 0).unwrap();
        for step in 0..(24 * 4) {
            let now = start + Duration::minutes(15 * step);
            let slot = policy.next_available_slot(now);
            assert!(hours.contains(&slot.with_timezone(&cairo).hour()));
            assert!(slot >= now + Duration::minutes(30));
        }
    }

    #[test]
    fn due_rows_are_filtered_and_sorted() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let rows = vec![
            row(2, "Scheduled", "2026-03-01T11:00:00+00:00"),
            row(3, "posted", "2026-03-01T09:00:00+00:00"),
            row(4, "scheduled", "2026-03-01T10:00:00+00:00"),
            row(5, "Scheduled", "not a date"),
            row(6, "Scheduled", "2026-03-01T12:30:00+00:00"),
            row(7, "SCHEDULED", "2026-03-01T12:00:00+00:00"),
        ];
        let due: Vec<u32> = find_due_scheduled(&rows, now).iter().map(|r| r.row_number).collect();
        assert_eq!(due, vec![4, 2, 7]);
    }

    #[test]
    fn scheduled_within_is_inclusive_and_ignores_other_states() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = start + Duration::hours(6);
        let rows = vec![
            row(2, "Failed", "2026-03-01T13:00:00+00:00"),
            row(3, "Scheduled", "2026-03-01T19:00:00+00:00"),
        ];
        assert!(!has_scheduled_within(&rows, start, end));

        let rows = vec![row(2, "Scheduled", "2026-03-01T18:00:00+00:00")];
        assert!(has_scheduled_within(&rows, start, end));
    }

    #[test]
    fn pending_rows_put_unparsable_last() {
        let rows = vec![
            row(2, "Scheduled", "garbage"),
            row(3, "Scheduled", "2026-03-02T10:00:00+00:00"),
            row(4, "Scheduled", "2026-03-01T10:00:00+00:00"),
        ];
        let order: Vec<u32> = pending_rows(&rows).iter().map(|r| r.row_number).collect();
        assert_eq!(order, vec![4, 3, 2]);
    }
}
