use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timezone-naive ISO-8601 layout used for `published_at` on disk.
pub const PUBLISHED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArticleKey {
    pub url: String,
    pub notifier_name: String,
}

impl ArticleKey {
    pub fn new(url: impl Into<String>, notifier_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            notifier_name: notifier_name.into(),
        }
    }
}

/// Poller-written fields of a not yet stored article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub url: String,
    pub notifier_name: String,
    pub title: String,
    pub category: String,
    pub published_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub url: String,
    pub notifier_name: String,
    pub title: String,
    pub category: String,
    pub published_at: NaiveDateTime,
    pub expire_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ogp_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields written back once an article has been summarized and delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub summary: String,
    pub detail: String,
    pub tags: Vec<String>,
    /// Empty when the page had no preview image.
    pub ogp_image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

pub fn format_published_at(dt: &NaiveDateTime) -> String {
    dt.format(PUBLISHED_AT_FORMAT).to_string()
}

pub fn parse_published_at(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, PUBLISHED_AT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}
