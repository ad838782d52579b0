//! crates/academy_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the spreadsheet, the database and the vendor HTTP APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::{
    ActivatedSubscription, OutgoingPost, PublishReceipt, SheetRow, UserSubscription, Voucher,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// The adapter is not configured (missing token, sheet id, ...).
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    /// Retries were exhausted. Carries `"<kind>: <message>"` of the last failure.
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// A vendor API answered with a non-success status.
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports
//=========================================================================================

/// The spreadsheet that doubles as the post queue.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Guarantees the required columns, returning the effective header row.
    async fn ensure_headers(&self) -> PortResult<Vec<String>>;

    /// Every data row with its 1-based sheet row number.
    async fn list_rows(&self) -> PortResult<Vec<SheetRow>>;

    /// Appends positionally according to `header`; absent fields become "".
    async fn append_row(&self, header: &[String], row: &BTreeMap<String, String>) -> PortResult<()>;

    /// Rewrites only the named columns of one row. Unknown columns are skipped.
    async fn update_fields(
        &self,
        row_number: u32,
        header: &[String],
        fields: &BTreeMap<String, String>,
    ) -> PortResult<()>;

    async fn delete_row(&self, row_number: u32) -> PortResult<()>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Inserts vouchers, skipping codes that already exist. Returns the codes stored.
    async fn insert_vouchers(&self, vouchers: &[Voucher]) -> PortResult<Vec<String>>;

    /// Consumes `code` for `user_id`. Fails with `NotFound` for an unknown code and
    /// `Conflict` for a used one.
    async fn activate_voucher(
        &self,
        user_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> PortResult<ActivatedSubscription>;

    async fn get_subscription(&self, user_id: &str) -> PortResult<Option<UserSubscription>>;
}

//=========================================================================================
// Content Generation Ports
//=========================================================================================

/// One chat-completion request: a system persona plus a single user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPrompt {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    async fn complete(&self, prompt: &ChatPrompt) -> PortResult<String>;
}

/// A source of recent headlines used as inspiration for automatic posts.
#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn random_headline(&self, feeds: &[String]) -> PortResult<Option<String>>;
}

/// Hosts raw image bytes and returns a public URL.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, image: &[u8], name: &str) -> PortResult<String>;
}

//=========================================================================================
// Messaging Ports
//=========================================================================================

/// Publishes to the academy's page feed.
#[async_trait]
pub trait PagePublisher: Send + Sync {
    async fn publish(&self, post: &OutgoingPost) -> PortResult<PublishReceipt>;
}

/// Sends replies back through the platform an inbound event arrived on.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_messenger(&self, recipient_id: &str, text: &str) -> PortResult<()>;
    async fn reply_to_comment(&self, comment_id: &str, text: &str) -> PortResult<()>;
    async fn send_whatsapp(&self, phone_number_id: &str, to: &str, text: &str) -> PortResult<()>;
}
