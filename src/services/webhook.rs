use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Destination;
use crate::error::{AppError, Result};

/// Delivers one JSON payload to a chat webhook.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn post(&self, webhook_url: &str, payload: &Value) -> Result<()>;
}

/// What ends up in the chat message for one article.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub link: &'a str,
    pub title: &'a str,
    pub summary: &'a str,
    pub tags: Option<&'a [String]>,
}

pub fn format_payload(destination: Destination, message: &Message<'_>) -> Value {
    let headline = match destination {
        Destination::Slack => format!(
            "<{}|{}> {}",
            message.link,
            escape_slack(message.title).replace('|', "\u{a6}"),
            escape_slack(message.summary)
        ),
        Destination::Teams | Destination::Discord => {
            format!("[{}]({}) {}", message.title, message.link, message.summary)
        }
    };

    let text = match message.tags {
        Some(tags) if !tags.is_empty() => format!("{}\nTags: {}", headline, tags.join(", ")),
        _ => headline,
    };

    match destination {
        Destination::Slack | Destination::Teams => json!({ "text": text }),
        Destination::Discord => json!({ "content": text }),
    }
}

/// Slack control characters. A `|` inside a link label would end the label
/// early, so the headline swaps it for a broken bar.
fn escape_slack(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Single POST per message, no retries.
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notify for WebhookNotifier {
    async fn post(&self, webhook_url: &str, payload: &Value) -> Result<()> {
        let response = self
            .client
            .post(webhook_url)
            .header("content-type", "application/json")
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Webhook(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message<'a>(tags: Option<&'a [String]>) -> Message<'a> {
        Message {
            link: "https://example.com/x",
            title: "X ships",
            summary: "Feature X is now available.",
            tags,
        }
    }

    #[test]
    fn slack_uses_angle_bracket_link() {
        let payload = format_payload(Destination::Slack, &message(None));
        assert_eq!(
            payload,
            json!({ "text": "<https://example.com/x|X ships> Feature X is now available." })
        );
    }

    #[test]
    fn tag_line_is_appended_when_requested() {
        let tags = vec!["Lambda".to_string(), "S3".to_string()];
        let payload = format_payload(Destination::Teams, &message(Some(&tags)));
        assert_eq!(
            payload["text"],
            "[X ships](https://example.com/x) Feature X is now available.\nTags: Lambda, S3"
        );

        let empty: Vec<String> = Vec::new();
        let payload = format_payload(Destination::Slack, &message(Some(&empty)));
        assert!(!payload["text"].as_str().unwrap().contains("Tags:"));
    }

    #[test]
    fn discord_uses_content_field() {
        let payload = format_payload(Destination::Discord, &message(None));
        assert!(payload.get("text").is_none());
        assert_eq!(
            payload["content"],
            "[X ships](https://example.com/x) Feature X is now available."
        );
    }

    #[test]
    fn slack_summary_and_pipe_in_title_are_escaped() {
        let mut msg = message(None);
        msg.title = "Build | Deploy";
        msg.summary = "Use <b> & <i> tags.";
        let payload = format_payload(Destination::Slack, &msg);
        assert_eq!(
            payload["text"],
            "<https://example.com/x|Build \u{a6} Deploy> Use &lt;b&gt; &amp; &lt;i&gt; tags."
        );
    }

    #[test]
    fn slack_title_is_escaped() {
        let mut msg = message(None);
        msg.title = "A <b> & C";
        let payload = format_payload(Destination::Slack, &msg);
        assert_eq!(
            payload["text"],
            "<https://example.com/x|A &lt;b&gt; &amp; C> Feature X is now available."
        );
    }
}
