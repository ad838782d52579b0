//! services/api/src/adapters/headlines.rs
//!
//! RSS headlines used as inspiration for automatic posts (`HeadlineSource`).

use academy_core::ports::{HeadlineSource, PortError, PortResult};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rss::Channel;
use tracing::debug;

/// Only the newest items of a feed are considered.
const RECENT_ITEMS: usize = 10;

#[derive(Clone)]
pub struct RssHeadlines {
    http: reqwest::Client,
}

impl RssHeadlines {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch_titles(&self, feed_url: &str) -> PortResult<Vec<String>> {
        let content = self
            .http
            .get(feed_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PortError::Upstream(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;
        let channel = Channel::read_from(&content[..]).map_err(|e| PortError::Upstream(e.to_string()))?;
        Ok(recent_titles(&channel))
    }
}

fn recent_titles(channel: &Channel) -> Vec<String> {
    channel
        .items()
        .iter()
        .take(RECENT_ITEMS)
        .filter_map(|item| item.title())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl HeadlineSource for RssHeadlines {
    /// Picks one random feed, then one of its recent titles.
    async fn random_headline(&self, feeds: &[String]) -> PortResult<Option<String>> {
        let Some(feed) = feeds.choose(&mut rand::rng()).cloned() else {
            return Ok(None);
        };
        let titles = self.fetch_titles(&feed).await?;
        let title = titles.choose(&mut rand::rng()).cloned();
        debug!(feed = %feed, found = titles.len(), "rss headlines fetched");
        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_come_from_recent_items() {
        let xml = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel><title>Sports</title><link>https://x</link><description>d</description>
              <item><title> Egypt wins karate gold </title></item>
              <item><description>no title</description></item>
              <item><title>Youth gymnastics cup</title></item>
            </channel></rss>"#;
        let channel = Channel::read_from(xml.as_bytes()).unwrap();
        assert_eq!(
            recent_titles(&channel),
            vec!["Egypt wins karate gold".to_string(), "Youth gymnastics cup".to_string()]
        );
    }

    #[tokio::test]
    async fn no_feeds_means_no_headline() {
        let source = RssHeadlines::new(reqwest::Client::new());
        assert_eq!(source.random_headline(&[]).await.unwrap(), None);
    }
}
