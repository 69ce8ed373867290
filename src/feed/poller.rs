use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use serde::Deserialize;

use crate::config::Config;
use crate::db::Repository;
use crate::models::{InsertOutcome, NewArticle};

use super::fetcher::FeedSource;

/// Scheduled trigger document: `{ "notifierName": ..., "notifier": { "rssUrl": {...} } }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTrigger {
    pub notifier_name: String,
    pub notifier: PollTarget,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTarget {
    pub rss_url: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub stale_entries: usize,
    pub malformed_entries: usize,
    pub store_errors: usize,
    pub skipped_feeds: usize,
    pub failed_feeds: usize,
}

impl PollReport {
    fn merge(&mut self, other: PollReport) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.stale_entries += other.stale_entries;
        self.malformed_entries += other.malformed_entries;
        self.store_errors += other.store_errors;
        self.skipped_feeds += other.skipped_feeds;
        self.failed_feeds += other.failed_feeds;
    }
}

/// Fresh means fewer than `threshold_days` whole days have elapsed, so
/// 6d 23h 59m 59s is fresh and exactly 7d is stale for a threshold of 7.
/// Timestamps in the future count as fresh.
pub fn is_fresh(timestamp: DateTime<Utc>, now: DateTime<Utc>, threshold_days: i64) -> bool {
    (now - timestamp).num_days() < threshold_days
}

fn entry_timestamp(entry: &Entry) -> Option<DateTime<Utc>> {
    entry.published.or(entry.updated)
}

/// Feed-level "last updated", falling back to the newest entry.
fn feed_timestamp(feed: &Feed) -> Option<DateTime<Utc>> {
    feed.updated
        .or_else(|| feed.entries.iter().filter_map(entry_timestamp).max())
}

pub struct Poller<'a> {
    config: &'a Config,
    repository: &'a Repository,
    source: &'a dyn FeedSource,
}

impl<'a> Poller<'a> {
    pub fn new(config: &'a Config, repository: &'a Repository, source: &'a dyn FeedSource) -> Self {
        Self {
            config,
            repository,
            source,
        }
    }

    /// Polls every feed of one notifier. A broken feed is logged and counted;
    /// it never stops the remaining feeds.
    pub async fn poll(
        &self,
        notifier_name: &str,
        feeds: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> PollReport {
        let mut report = PollReport::default();

        for (category, url) in feeds {
            let feed = match self.source.fetch_feed(url).await {
                Ok(feed) => feed,
                Err(e) => {
                    tracing::warn!(feed = %url, error = %e, "failed to fetch feed");
                    report.failed_feeds += 1;
                    continue;
                }
            };

            if let Some(updated) = feed_timestamp(&feed) {
                if !is_fresh(updated, now, self.config.feed_stale_days) {
                    tracing::info!(feed = %url, %updated, "skip stale feed {}", category);
                    report.skipped_feeds += 1;
                    continue;
                }
            }

            let feed_report = self
                .ingest_entries(notifier_name, category, feed.entries, now)
                .await;
            tracing::info!(
                feed = %url,
                inserted = feed_report.inserted,
                duplicates = feed_report.duplicates,
                stale = feed_report.stale_entries,
                "polled {}",
                category
            );
            report.merge(feed_report);
        }

        report
    }

    pub async fn poll_trigger(&self, trigger: &PollTrigger, now: DateTime<Utc>) -> PollReport {
        self.poll(&trigger.notifier_name, &trigger.notifier.rss_url, now)
            .await
    }

    pub async fn poll_all(&self, now: DateTime<Utc>) -> PollReport {
        let mut report = PollReport::default();
        for (name, notifier) in &self.config.notifiers {
            report.merge(self.poll(name, &notifier.rss_url, now).await);
        }
        report
    }

    async fn ingest_entries(
        &self,
        notifier_name: &str,
        category: &str,
        entries: Vec<Entry>,
        now: DateTime<Utc>,
    ) -> PollReport {
        let mut report = PollReport::default();

        for entry in entries {
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_string())
                .unwrap_or_else(|| "Untitled".to_string());

            let Some(published) = entry_timestamp(&entry) else {
                tracing::warn!("entry without a usable timestamp, skip: {}", title);
                report.malformed_entries += 1;
                continue;
            };

            let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                tracing::warn!("entry without a link, skip: {}", title);
                report.malformed_entries += 1;
                continue;
            };

            if !is_fresh(published, now, self.config.entry_stale_days) {
                tracing::debug!("old entry, skip: {}", title);
                report.stale_entries += 1;
                continue;
            }

            let article = NewArticle {
                url: link,
                notifier_name: notifier_name.to_string(),
                title,
                category: category.to_string(),
                published_at: published.naive_utc(),
            };

            match self.repository.insert_if_absent(article, now).await {
                Ok(InsertOutcome::Inserted) => report.inserted += 1,
                Ok(InsertOutcome::AlreadyExists) => {
                    tracing::debug!("duplicate entry, already stored");
                    report.duplicates += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to store entry");
                    report.store_errors += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;
    use crate::error::{AppError, Result};
    use crate::feed::fetcher::parse_feed;
    use crate::models::ArticleKey;

    struct StaticFeeds(HashMap<String, String>);

    #[async_trait]
    impl FeedSource for StaticFeeds {
        async fn fetch_feed(&self, url: &str) -> Result<Feed> {
            let xml = self
                .0
                .get(url)
                .ok_or_else(|| AppError::NotFound(url.to_string()))?;
            parse_feed(xml.as_bytes())
        }
    }

    fn rss(updated: DateTime<Utc>, items: &[(&str, &str, Option<DateTime<Utc>>)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, link, published)| {
                let date = published
                    .map(|d| format!("<pubDate>{}</pubDate>", d.to_rfc2822()))
                    .unwrap_or_default();
                format!("<item><title>{}</title><link>{}</link>{}</item>", title, link, date)
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title><lastBuildDate>{}</lastBuildDate>{}</channel></rss>"#,
            updated.to_rfc2822(),
            items
        )
    }

    async fn open_repo() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.db");
        let repo = Repository::new(path.to_str().unwrap(), 72).await.unwrap();
        (dir, repo)
    }

    #[test]
    fn freshness_boundary_is_exclusive_at_threshold() {
        let now = Utc::now();
        let just_inside = now - (Duration::days(7) - Duration::seconds(1));
        let just_outside = now - (Duration::days(7) + Duration::seconds(1));

        assert!(is_fresh(just_inside, now, 7));
        assert!(!is_fresh(just_outside, now, 7));
        assert!(!is_fresh(now - Duration::days(7), now, 7));
        assert!(is_fresh(now + Duration::hours(3), now, 7));
    }

    #[tokio::test]
    async fn fresh_entries_are_stored_once_and_stale_ones_skipped() {
        let (_dir, repo) = open_repo().await;
        let config = Config::default();
        let now = Utc::now();

        let xml = rss(
            now,
            &[
                ("Fresh", "https://example.com/fresh", Some(now - Duration::hours(2))),
                ("Old", "https://example.com/old", Some(now - Duration::days(10))),
                ("Undated", "https://example.com/undated", None),
            ],
        );
        let source = StaticFeeds(HashMap::from([("https://feed/a".to_string(), xml)]));
        let feeds = BTreeMap::from([("news".to_string(), "https://feed/a".to_string())]);
        let poller = Poller::new(&config, &repo, &source);

        let first = poller.poll("aws", &feeds, now).await;
        assert_eq!(first.inserted, 1);
        assert_eq!(first.stale_entries, 1);
        assert_eq!(first.malformed_entries, 1);

        let second = poller.poll("aws", &feeds, now).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(repo.count_articles().await.unwrap(), 1);

        let stored = repo
            .get_article(&ArticleKey::new("https://example.com/fresh", "aws"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.category, "news");
        assert_eq!(stored.title, "Fresh");
        assert!(stored.summary.is_none());
    }

    #[tokio::test]
    async fn stale_feed_is_skipped_whole_and_broken_feed_does_not_stop_others() {
        let (_dir, repo) = open_repo().await;
        let config = Config::default();
        let now = Utc::now();

        let stale = rss(
            now - Duration::days(30),
            &[("Fresh but feed stale", "https://example.com/s", Some(now))],
        );
        let good = rss(now, &[("Good", "https://example.com/g", Some(now))]);
        let source = StaticFeeds(HashMap::from([
            ("https://feed/stale".to_string(), stale),
            ("https://feed/good".to_string(), good),
            ("https://feed/broken".to_string(), "<html>nope".to_string()),
        ]));
        let feeds = BTreeMap::from([
            ("a-broken".to_string(), "https://feed/broken".to_string()),
            ("b-stale".to_string(), "https://feed/stale".to_string()),
            ("c-good".to_string(), "https://feed/good".to_string()),
            ("d-missing".to_string(), "https://feed/missing".to_string()),
        ]);

        let report = Poller::new(&config, &repo, &source)
            .poll("aws", &feeds, now)
            .await;

        assert_eq!(report.failed_feeds, 2);
        assert_eq!(report.skipped_feeds, 1);
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn parses_trigger_document() {
        let doc = r#"{ "notifierName": "aws", "notifier": { "rssUrl": { "news": "https://feed/a" } } }"#;
        let trigger: PollTrigger = serde_json::from_str(doc).unwrap();
        assert_eq!(trigger.notifier_name, "aws");
        assert_eq!(trigger.notifier.rss_url["news"], "https://feed/a");
    }
}
