//! crates/academy_core/src/sheet.rs
//!
//! Layout rules for the queue spreadsheet: the required header, how raw cell
//! grids map to rows, and how rows map back to positional payloads. Adapters do
//! the I/O; everything here is pure.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

use crate::domain::SheetRow;

pub const COL_TIMESTAMP: &str = "Timestamp";
pub const COL_IMAGE_URL: &str = "Image_URL";
pub const COL_CAPTION: &str = "AI_Caption";
pub const COL_STATUS: &str = "Status";
pub const COL_SCHEDULED_TIME: &str = "Scheduled_Time";
pub const COL_SOURCE: &str = "Source";

pub const REQUIRED_COLUMNS: [&str; 6] = [
    COL_TIMESTAMP,
    COL_IMAGE_URL,
    COL_CAPTION,
    COL_STATUS,
    COL_SCHEDULED_TIME,
    COL_SOURCE,
];

pub fn required_header() -> Vec<String> {
    REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// What an adapter has to do to the first sheet row so the header is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderPlan {
    /// The sheet is empty: append the required header as the first row.
    AppendRequired(Vec<String>),
    /// Rewrite row 1 with this header (required columns first, extras kept).
    Rewrite(Vec<String>),
    /// The header is already valid.
    Keep(Vec<String>),
}

/// Decides how to fix up the header given the sheet's current first row.
pub fn plan_headers(first_row: Option<&[String]>) -> HeaderPlan {
    let Some(first_row) = first_row else {
        return HeaderPlan::AppendRequired(required_header());
    };

    let header: Vec<String> = first_row
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if header.is_empty() {
        return HeaderPlan::AppendRequired(required_header());
    }

    let prefix_ok = header.len() >= REQUIRED_COLUMNS.len()
        && header
            .iter()
            .zip(REQUIRED_COLUMNS.iter())
            .all(|(have, want)| have == want);

    if prefix_ok {
        return HeaderPlan::Keep(header);
    }

    let mut merged = required_header();
    merged.extend(
        header
            .into_iter()
            .filter(|c| !REQUIRED_COLUMNS.contains(&c.as_str())),
    );
    HeaderPlan::Rewrite(merged)
}

/// Moves each data row's cells under `new_header`, matching columns by name.
/// Columns the new header lacks are dropped; new columns start empty.
pub fn remap_rows(old_header: &[String], new_header: &[String], rows: &[Vec<String>]) -> Vec<Vec<String>> {
    let old: Vec<String> = old_header.iter().map(|c| c.trim().to_string()).collect();
    rows.iter()
        .map(|row| {
            let fields: BTreeMap<String, String> = old
                .iter()
                .zip(row.iter())
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, cell)| (name.clone(), cell.clone()))
                .collect();
            row_payload(new_header, &fields)
        })
        .collect()
}

/// Turns the raw value grid (header first) into rows numbered from 2.
pub fn rows_from_values(values: &[Vec<String>]) -> Vec<SheetRow> {
    let Some((header, data)) = values.split_first() else {
        return Vec::new();
    };
    let header: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();

    data.iter()
        .enumerate()
        .map(|(idx, cells)| {
            let fields = header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(i, name)| (name.clone(), cells.get(i).cloned().unwrap_or_default()))
                .collect();
            SheetRow {
                row_number: idx as u32 + 2,
                fields,
            }
        })
        .collect()
}

/// Lays `fields` out in header order; absent columns become empty strings.
pub fn row_payload(header: &[String], fields: &BTreeMap<String, String>) -> Vec<String> {
    header
        .iter()
        .map(|col| fields.get(col).cloned().unwrap_or_default())
        .collect()
}

/// 1-based column index → A1 column letters (1 → A, 27 → AA).
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// The 1-based column of `name` in `header`, if present.
pub fn column_index(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|c| c == name).map(|i| i + 1)
}

//=========================================================================================
// Timestamps
//=========================================================================================

pub fn format_time_utc(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, false)
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Lenient timestamp parsing for hand-edited cells. Values without an offset
/// are taken as UTC. Anything unparsable yields `None`.
pub fn parse_time_utc(value: &str) -> Option<DateTime<Utc>> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
