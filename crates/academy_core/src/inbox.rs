//! crates/academy_core/src/inbox.rs
//!
//! Inbound conversations: the webhook payloads Meta delivers for Messenger,
//! page comments and WhatsApp, and routing each message to a persona reply.

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::content::ContentStudio;
use crate::domain::{AcademyData, BotConfig};
use crate::ports::{PortResult, ReplySender};

//=========================================================================================
// Webhook Payloads
//=========================================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookPayload {
    pub object: String,
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookEntry {
    /// Page id for page events, business account id for WhatsApp.
    pub id: String,
    pub messaging: Vec<MessagingEvent>,
    pub changes: Vec<ChangeEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Party {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingEvent {
    pub sender: Party,
    pub recipient: Party,
    pub message: Option<MessengerMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessengerMessage {
    pub text: Option<String>,
    pub is_echo: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangeEvent {
    pub field: String,
    pub value: ChangeValue,
}

/// Union of the `value` shapes we care about: page feed changes and WhatsApp messages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangeValue {
    pub item: Option<String>,
    pub verb: Option<String>,
    pub comment_id: Option<String>,
    pub message: Option<String>,
    pub from: Option<Party>,
    pub metadata: Option<WhatsAppMetadata>,
    pub messages: Vec<WhatsAppMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WhatsAppMetadata {
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WhatsAppMessage {
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<WhatsAppText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WhatsAppText {
    pub body: String,
}

//=========================================================================================
// Events
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Messenger { sender_id: String, text: String },
    Comment { comment_id: String, text: String },
    WhatsApp { phone_number_id: String, from: String, text: String },
}

/// Flattens a webhook delivery into the messages that deserve a reply. Echoes of
/// the page's own messages and comments written by the page are dropped.
pub fn extract_events(payload: &WebhookPayload) -> Vec<InboundEvent> {
    let mut events = Vec::new();
    match payload.object.as_str() {
        "page" => {
            for entry in &payload.entry {
                for m in &entry.messaging {
                    let Some(msg) = &m.message else { continue };
                    if msg.is_echo || m.sender.id.is_empty() || m.sender.id == entry.id {
                        continue;
                    }
                    if let Some(text) = non_blank(msg.text.as_deref()) {
                        events.push(InboundEvent::Messenger {
                            sender_id: m.sender.id.clone(),
                            text,
                        });
                    }
                }
                for change in entry.changes.iter().filter(|c| c.field == "feed") {
                    let v = &change.value;
                    if v.item.as_deref() != Some("comment") || v.verb.as_deref().is_some_and(|verb| verb != "add") {
                        continue;
                    }
                    if v.from.as_ref().is_some_and(|f| f.id == entry.id) {
                        continue;
                    }
                    let (Some(comment_id), Some(text)) = (v.comment_id.clone(), non_blank(v.message.as_deref())) else {
                        continue;
                    };
                    events.push(InboundEvent::Comment { comment_id, text });
                }
            }
        }
        "whatsapp_business_account" => {
            for change in payload.entry.iter().flat_map(|e| e.changes.iter()) {
                let v = &change.value;
                let Some(meta) = &v.metadata else { continue };
                for msg in v.messages.iter().filter(|m| m.kind == "text") {
                    let Some(text) = non_blank(msg.text.as_ref().map(|t| t.body.as_str())) else {
                        continue;
                    };
                    events.push(InboundEvent::WhatsApp {
                        phone_number_id: meta.phone_number_id.clone(),
                        from: msg.from.clone(),
                        text,
                    });
                }
            }
        }
        other => warn!(object = other, "ignoring webhook for unknown object"),
    }
    events
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

//=========================================================================================
// Router
//=========================================================================================

/// LLM calls are slow; a webhook batch is answered this many at a time.
const CONCURRENT_REPLIES: usize = 4;

pub struct InboxRouter {
    studio: ContentStudio,
    replies: Arc<dyn ReplySender>,
    config: Arc<RwLock<BotConfig>>,
    academy: Arc<RwLock<AcademyData>>,
}

impl InboxRouter {
    pub fn new(
        studio: ContentStudio,
        replies: Arc<dyn ReplySender>,
        config: Arc<RwLock<BotConfig>>,
        academy: Arc<RwLock<AcademyData>>,
    ) -> Self {
        Self {
            studio,
            replies,
            config,
            academy,
        }
    }

    pub async fn handle(&self, event: &InboundEvent) -> PortResult<()> {
        let data = self.academy.read().await.clone();
        let mood = self.config.read().await.mood;
        match event {
            InboundEvent::Messenger { sender_id, text } => {
                info!(sender = %sender_id, "messenger message received");
                let reply = self.studio.reply(&data, mood, text).await;
                self.replies.send_messenger(sender_id, &reply).await
            }
            InboundEvent::Comment { comment_id, text } => {
                info!(comment = %comment_id, "page comment received");
                let reply = self.studio.reply(&data, mood, text).await;
                self.replies.reply_to_comment(comment_id, &reply).await
            }
            InboundEvent::WhatsApp {
                phone_number_id,
                from,
                text,
            } => {
                info!(from = %from, "whatsapp message received");
                let reply = self.studio.reply(&data, mood, text).await;
                self.replies.send_whatsapp(phone_number_id, from, &reply).await
            }
        }
    }

    /// Replies to every event, a few at a time. A failed send is logged and does
    /// not stop the rest. Returns how many replies went out.
    pub async fn handle_all(&self, events: &[InboundEvent]) -> usize {
        stream::iter(events)
            .map(|event| async move { (event, self.handle(event).await) })
            .buffered(CONCURRENT_REPLIES)
            .boxed()
            .fold(0, |sent, (event, result)| async move {
                match result {
                    Ok(()) => sent + 1,
                    Err(e) => {
                        warn!(error = %e, ?event, "reply could not be delivered");
                        sent
                    }
                }
            })
            .await
    }
}
