//! services/api/src/adapters/sheets.rs
//!
//! This module contains the Google Sheets adapter, the concrete implementation of
//! the `SheetStore` port. It talks to the Sheets REST API (v4) directly and wraps
//! every call in exponential backoff because the API throttles aggressively.

use academy_core::backoff::{with_backoff, BackoffPolicy, ErrorKind};
use academy_core::domain::SheetRow;
use academy_core::ports::{PortError, PortResult, SheetStore};
use academy_core::sheet::{self, HeaderPlan};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::google_auth::{AuthError, ServiceAccountAuth};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// A failed Sheets call, classified for the backoff exhaustion message.
#[derive(Debug, thiserror::Error)]
enum CallError {
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Url(String),
}

impl ErrorKind for CallError {
    fn kind(&self) -> &'static str {
        match self {
            CallError::Auth(_) => "AuthError",
            CallError::Transport(_) => "TransportError",
            CallError::Status { status: 429, .. } => "QuotaExceeded",
            CallError::Status { .. } => "APIError",
            CallError::Url(_) => "UrlError",
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct GoogleSheetsAdapter {
    http: reqwest::Client,
    auth: Arc<ServiceAccountAuth>,
    spreadsheet_id: String,
    worksheet: String,
    backoff: BackoffPolicy,
    sheet_gid: Mutex<Option<i64>>,
}

impl GoogleSheetsAdapter {
    pub fn new(http: reqwest::Client, auth: Arc<ServiceAccountAuth>, spreadsheet_id: String, worksheet: String) -> Self {
        Self {
            http,
            auth,
            spreadsheet_id,
            worksheet,
            backoff: BackoffPolicy::default(),
            sheet_gid: Mutex::new(None),
        }
    }

    /// The worksheet name quoted for A1 notation.
    fn a1_sheet(&self) -> String {
        format!("'{}'", self.worksheet.replace('\'', "''"))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, CallError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| CallError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CallError::Url("base URL cannot have segments".to_string()))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<Value, CallError> {
        let token = self.auth.access_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Sends with retries; `what` names the call in logs and in the exhaustion error.
    async fn call(&self, what: &str, method: Method, url: Result<Url, CallError>, body: Option<Value>) -> PortResult<Value> {
        let url = url.map_err(|e| PortError::Unexpected(e.to_string()))?;
        with_backoff(&self.backoff, what, || {
            let method = method.clone();
            let url = url.clone();
            let body = body.clone();
            async move { self.send(method, url, body).await }
        })
        .await
    }

    async fn get_values(&self, range: &str) -> PortResult<Vec<Vec<String>>> {
        let value = self
            .call("values.get", Method::GET, self.url(&["values", range]), None)
            .await?;
        Ok(grid_from_json(&value))
    }

    async fn put_values(&self, range: &str, rows: Vec<Vec<String>>) -> PortResult<()> {
        let mut url = self.url(&["values", range]);
        if let Ok(url) = url.as_mut() {
            url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        }
        self.call("values.update", Method::PUT, url, Some(json!({ "values": rows })))
            .await?;
        Ok(())
    }

    async fn batch_update(&self, requests: Value) -> PortResult<Value> {
        let batch = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = Url::parse(SHEETS_API)
            .map_err(|e| CallError::Url(e.to_string()))
            .and_then(|mut url| {
                url.path_segments_mut()
                    .map_err(|_| CallError::Url("base URL cannot have segments".to_string()))?
                    .pop_if_empty()
                    .push(&batch);
                Ok(url)
            });
        self.call("batchUpdate", Method::POST, url, Some(json!({ "requests": requests })))
            .await
    }

    /// Numeric id of the worksheet, creating the worksheet (1000x30) if missing.
    async fn sheet_gid(&self) -> PortResult<i64> {
        let mut cached = self.sheet_gid.lock().await;
        if let Some(gid) = *cached {
            return Ok(gid);
        }

        let mut url = self.url(&[]);
        if let Ok(url) = url.as_mut() {
            url.query_pairs_mut().append_pair("fields", "sheets.properties(sheetId,title)");
        }
        let meta = self.call("spreadsheets.get", Method::GET, url, None).await?;
        let existing = meta["sheets"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|s| &s["properties"])
            .find(|p| p["title"].as_str() == Some(self.worksheet.as_str()))
            .and_then(|p| p["sheetId"].as_i64());

        let gid = match existing {
            Some(gid) => gid,
            None => {
                info!(worksheet = %self.worksheet, "worksheet missing, creating it");
                let reply = self
                    .batch_update(json!([{
                        "addSheet": {
                            "properties": {
                                "title": self.worksheet,
                                "gridProperties": { "rowCount": 1000, "columnCount": 30 }
                            }
                        }
                    }]))
                    .await?;
                reply["replies"][0]["addSheet"]["properties"]["sheetId"]
                    .as_i64()
                    .ok_or_else(|| PortError::Upstream("addSheet returned no sheetId".to_string()))?
            }
        };
        *cached = Some(gid);
        Ok(gid)
    }
}

/// Converts a `ValueRange` body into rows of strings. Trailing empty cells are
/// omitted by the API, so rows may be ragged.
fn grid_from_json(value: &Value) -> Vec<Vec<String>> {
    value["values"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(cell_text).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

//=========================================================================================
// `SheetStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SheetStore for GoogleSheetsAdapter {
    async fn ensure_headers(&self) -> PortResult<Vec<String>> {
        self.sheet_gid().await?;
        let grid = self.get_values(&self.a1_sheet()).await?;

        match sheet::plan_headers(grid.first().map(Vec::as_slice)) {
            HeaderPlan::AppendRequired(header) => {
                info!(worksheet = %self.worksheet, "writing queue header");
                self.put_values(&format!("{}!A1", self.a1_sheet()), vec![header.clone()])
                    .await?;
                Ok(header)
            }
            HeaderPlan::Rewrite(header) => {
                // Data rows move with their columns so nothing ends up under the wrong header.
                info!(worksheet = %self.worksheet, "reordering queue columns");
                let mut rewritten = vec![header.clone()];
                rewritten.extend(sheet::remap_rows(&grid[0], &header, &grid[1..]));
                // Blank out cells past the new width so dropped columns leave nothing behind.
                let width = grid.iter().map(Vec::len).max().unwrap_or(0);
                for row in rewritten.iter_mut() {
                    if row.len() < width {
                        row.resize(width, String::new());
                    }
                }
                self.put_values(&format!("{}!A1", self.a1_sheet()), rewritten).await?;
                Ok(header)
            }
            HeaderPlan::Keep(header) => Ok(header),
        }
    }

    async fn list_rows(&self) -> PortResult<Vec<SheetRow>> {
        let grid = self.get_values(&self.a1_sheet()).await?;
        Ok(sheet::rows_from_values(&grid))
    }

    async fn append_row(&self, header: &[String], row: &BTreeMap<String, String>) -> PortResult<()> {
        let range = format!("{}!A1", self.a1_sheet());
        let mut url = self.url(&["values", &format!("{}:append", range)]);
        if let Ok(url) = url.as_mut() {
            url.query_pairs_mut()
                .append_pair("valueInputOption", "RAW")
                .append_pair("insertDataOption", "INSERT_ROWS");
        }
        let payload = sheet::row_payload(header, row);
        self.call("values.append", Method::POST, url, Some(json!({ "values": [payload] })))
            .await?;
        Ok(())
    }

    async fn update_fields(
        &self,
        row_number: u32,
        header: &[String],
        fields: &BTreeMap<String, String>,
    ) -> PortResult<()> {
        let data: Vec<Value> = fields
            .iter()
            .filter_map(|(name, value)| {
                let col = sheet::column_index(header, name)?;
                Some(json!({
                    "range": format!("{}!{}{}", self.a1_sheet(), sheet::column_letters(col), row_number),
                    "values": [[value]],
                }))
            })
            .collect();
        if data.is_empty() {
            return Ok(());
        }

        let url = self.url(&["values:batchUpdate"]);
        self.call(
            "values.batchUpdate",
            Method::POST,
            url,
            Some(json!({ "valueInputOption": "RAW", "data": data })),
        )
        .await?;
        Ok(())
    }

    async fn delete_row(&self, row_number: u32) -> PortResult<()> {
        if row_number < 2 {
            return Err(PortError::InvalidInput("the header row cannot be deleted".to_string()));
        }
        let gid = self.sheet_gid().await?;
        self.batch_update(json!([{
            "deleteDimension": {
                "range": {
                    "sheetId": gid,
                    "dimension": "ROWS",
                    "startIndex": row_number - 1,
                    "endIndex": row_number
                }
            }
        }]))
        .await?;
        Ok(())
    }
}

//=========================================================================================
// Unconfigured Fallback
//=========================================================================================

/// Stands in when no spreadsheet is configured; every call is `Unavailable`.
pub struct DisabledSheet;

#[async_trait]
impl SheetStore for DisabledSheet {
    async fn ensure_headers(&self) -> PortResult<Vec<String>> {
        Err(disabled())
    }
    async fn list_rows(&self) -> PortResult<Vec<SheetRow>> {
        Err(disabled())
    }
    async fn append_row(&self, _header: &[String], _row: &BTreeMap<String, String>) -> PortResult<()> {
        Err(disabled())
    }
    async fn update_fields(&self, _row: u32, _header: &[String], _fields: &BTreeMap<String, String>) -> PortResult<()> {
        Err(disabled())
    }
    async fn delete_row(&self, _row_number: u32) -> PortResult<()> {
        Err(disabled())
    }
}

fn disabled() -> PortError {
    PortError::Unavailable("GOOGLE_SHEET_ID / service account not configured".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::google_auth::ServiceAccountKey;

    fn adapter(worksheet: &str) -> GoogleSheetsAdapter {
        let key = ServiceAccountKey {
            client_email: "bot@example.iam.gserviceaccount.com".to_string(),
            private_key: String::new(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        };
        let http = reqwest::Client::new();
        let auth = Arc::new(ServiceAccountAuth::new(key, http.clone()));
        GoogleSheetsAdapter::new(http, auth, "sheet-123".to_string(), worksheet.to_string())
    }

    #[test]
    fn ranges_are_quoted_and_encoded() {
        let a = adapter("Post Buffer");
        let url = a.url(&["values", &format!("{}!A1:append", a.a1_sheet())]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/'Post%20Buffer'!A1:append"
        );
        assert_eq!(adapter("Bob's").a1_sheet(), "'Bob''s'");
    }

    #[test]
    fn value_ranges_become_string_grids() {
        let body = json!({
            "range": "Buffer!A1:F3",
            "values": [["Timestamp", "Status"], ["t1"], [42, true]]
        });
        assert_eq!(
            grid_from_json(&body),
            vec![
                vec!["Timestamp".to_string(), "Status".to_string()],
                vec!["t1".to_string()],
                vec!["42".to_string(), "true".to_string()],
            ]
        );
        assert!(grid_from_json(&json!({"range": "Buffer!A1"})).is_empty());
    }

    #[tokio::test]
    async fn disabled_sheet_is_unavailable() {
        assert!(matches!(DisabledSheet.list_rows().await, Err(PortError::Unavailable(_))));
    }
}
