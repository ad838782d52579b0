//! services/api/src/adapters/facebook.rs
//!
//! This module contains the Meta Graph API adapter. It implements the
//! `PagePublisher` port (page photos, videos and feed posts) and the
//! `ReplySender` port (Messenger, comment replies and WhatsApp Cloud messages).

use academy_core::domain::{OutgoingPost, PostMedia, PublishMethod, PublishReceipt};
use academy_core::ports::{PagePublisher, PortError, PortResult, ReplySender};
use async_trait::async_trait;
use reqwest::multipart;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const GRAPH_HOST: &str = "https://graph.facebook.com";
/// Messenger rejects longer texts.
const MESSENGER_TEXT_LIMIT: usize = 2000;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct FacebookAdapter {
    http: reqwest::Client,
    graph_base: String,
    page_token: Option<String>,
    whatsapp_token: Option<String>,
}

impl FacebookAdapter {
    pub fn new(
        http: reqwest::Client,
        graph_version: &str,
        page_token: Option<String>,
        whatsapp_token: Option<String>,
    ) -> Self {
        Self {
            http,
            graph_base: format!("{}/{}", GRAPH_HOST, graph_version.trim_matches('/')),
            page_token: page_token.filter(|t| !t.trim().is_empty()),
            whatsapp_token: whatsapp_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.page_token.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.graph_base, path.trim_start_matches('/'))
    }

    fn page_token(&self) -> PortResult<&str> {
        self.page_token
            .as_deref()
            .ok_or_else(|| PortError::Unavailable("PAGE_ACCESS_TOKEN is not set".to_string()))
    }

    async fn post_json(&self, path: &str, body: Value) -> PortResult<Value> {
        let token = self.page_token()?;
        let response = self
            .http
            .post(self.endpoint(path))
            .query(&[("access_token", token)])
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;
        graph_result(response).await
    }

    /// Step 1 of the photo chain: fetch the image and upload the bytes.
    async fn upload_photo_bytes(&self, image_url: &str, caption: &str) -> PortResult<Value> {
        let token = self.page_token()?;
        let bytes = self
            .http
            .get(image_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PortError::Upstream(format!("image download failed: {}", e)))?
            .bytes()
            .await
            .map_err(|e| PortError::Upstream(format!("image download failed: {}", e)))?;

        let form = multipart::Form::new()
            .text("caption", caption.to_string())
            .part("source", multipart::Part::bytes(bytes.to_vec()).file_name("post.jpg"));

        let response = self
            .http
            .post(self.endpoint("me/photos"))
            .query(&[("access_token", token)])
            .multipart(form)
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;
        graph_result(response).await
    }

    async fn publish_image(&self, image_url: &str, caption: &str) -> PortResult<PublishReceipt> {
        match self.upload_photo_bytes(image_url, caption).await {
            Ok(body) => return Ok(receipt(&body, PublishMethod::PhotoUpload)),
            Err(e) => warn!(error = %e, "photo byte upload failed, trying by URL"),
        }

        match self
            .post_json("me/photos", json!({ "url": image_url, "caption": caption }))
            .await
        {
            Ok(body) => return Ok(receipt(&body, PublishMethod::PhotoUrl)),
            Err(e) => warn!(error = %e, "photo URL upload failed, falling back to a link post"),
        }

        let body = self
            .post_json("me/feed", json!({ "message": caption, "link": image_url }))
            .await?;
        Ok(receipt(&body, PublishMethod::Feed))
    }
}

/// Turns a Graph response into its JSON body, or the Graph error message.
async fn graph_result(response: reqwest::Response) -> PortResult<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(body);
    }
    let message = body["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    Err(PortError::Upstream(format!("Graph API {}: {}", status.as_u16(), message)))
}

fn receipt(body: &Value, method: PublishMethod) -> PublishReceipt {
    let post_id = body["post_id"]
        .as_str()
        .or_else(|| body["id"].as_str())
        .map(str::to_string);
    PublishReceipt { post_id, method }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

//=========================================================================================
// `PagePublisher` Trait Implementation
//=========================================================================================

#[async_trait]
impl PagePublisher for FacebookAdapter {
    async fn publish(&self, post: &OutgoingPost) -> PortResult<PublishReceipt> {
        self.page_token()?;
        let result = match &post.media {
            PostMedia::None => self
                .post_json("me/feed", json!({ "message": post.caption }))
                .await
                .map(|body| receipt(&body, PublishMethod::Feed)),
            PostMedia::Video(url) => self
                .post_json("me/videos", json!({ "file_url": url, "description": post.caption }))
                .await
                .map(|body| receipt(&body, PublishMethod::Video)),
            PostMedia::Image(url) => self.publish_image(url, &post.caption).await,
        };
        if let Ok(r) = &result {
            info!(post_id = ?r.post_id, method = ?r.method, "published to page");
        }
        result
    }
}

//=========================================================================================
// `ReplySender` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReplySender for FacebookAdapter {
    async fn send_messenger(&self, recipient_id: &str, text: &str) -> PortResult<()> {
        self.post_json(
            "me/messages",
            json!({
                "recipient": { "id": recipient_id },
                "messaging_type": "RESPONSE",
                "message": { "text": truncate_chars(text, MESSENGER_TEXT_LIMIT) },
            }),
        )
        .await?;
        debug!(recipient = recipient_id, "messenger reply sent");
        Ok(())
    }

    async fn reply_to_comment(&self, comment_id: &str, text: &str) -> PortResult<()> {
        self.post_json(&format!("{}/comments", comment_id), json!({ "message": text }))
            .await?;
        debug!(comment = comment_id, "comment reply sent");
        Ok(())
    }

    async fn send_whatsapp(&self, phone_number_id: &str, to: &str, text: &str) -> PortResult<()> {
        let token = self
            .whatsapp_token
            .as_deref()
            .or(self.page_token.as_deref())
            .ok_or_else(|| PortError::Unavailable("WHATSAPP_TOKEN is not set".to_string()))?;
        let response = self
            .http
            .post(self.endpoint(&format!("{}/messages", phone_number_id)))
            .bearer_auth(token)
            .json(&json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": text },
            }))
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;
        graph_result(response).await?;
        debug!(to, "whatsapp reply sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(token: Option<&str>) -> FacebookAdapter {
        FacebookAdapter::new(reqwest::Client::new(), "v18.0", token.map(str::to_string), None)
    }

    #[test]
    fn endpoints_include_the_graph_version() {
        assert_eq!(adapter(None).endpoint("/me/photos"), "https://graph.facebook.com/v18.0/me/photos");
    }

    #[test]
    fn receipt_prefers_post_id() {
        let r = receipt(&json!({"id": "photo_1", "post_id": "page_1"}), PublishMethod::PhotoUpload);
        assert_eq!(r.post_id.as_deref(), Some("page_1"));
        let r = receipt(&json!({"id": "feed_9"}), PublishMethod::Feed);
        assert_eq!(r.post_id.as_deref(), Some("feed_9"));
    }

    #[test]
    fn messenger_text_is_truncated_on_char_boundaries() {
        let long = "ك".repeat(2500);
        assert_eq!(truncate_chars(&long, MESSENGER_TEXT_LIMIT).chars().count(), 2000);
    }

    #[tokio::test]
    async fn missing_token_is_unavailable() {
        let post = OutgoingPost {
            caption: "hi".to_string(),
            media: PostMedia::None,
        };
        assert!(matches!(adapter(Some(" ")).publish(&post).await, Err(PortError::Unavailable(_))));
        assert!(matches!(
            adapter(None).send_whatsapp("pn", "2010", "hi").await,
            Err(PortError::Unavailable(_))
        ));
    }
}
