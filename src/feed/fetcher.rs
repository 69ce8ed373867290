use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::Feed;
use feed_rs::parser;
use reqwest::Client;

use crate::error::Result;

/// Anything that can hand the poller a parsed feed for a URL.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<Feed>;
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("rss-digest-notifier/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch_feed(&self, url: &str) -> Result<Feed> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

pub fn parse_feed(bytes: &[u8]) -> Result<Feed> {
    Ok(parser::parse(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use tokio_test::assert_err;

    #[test]
    fn parses_rss_channel() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Updates</title>
  <lastBuildDate>Wed, 01 May 2024 10:00:00 +0000</lastBuildDate>
  <item>
    <title>Feature X ships</title>
    <link>https://example.com/x</link>
    <pubDate>Wed, 01 May 2024 09:00:00 +0000</pubDate>
  </item>
</channel></rss>"#;

        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert!(feed.updated.is_some());
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].links[0].href, "https://example.com/x");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = assert_err!(parse_feed(b"this is not xml"));
        assert!(matches!(err, AppError::FeedParse(_)));
    }
}
