use std::time::Duration;

use crate::ai::{Classifier, Summarize, UNCATEGORIZED};
use crate::config::{Config, TaggingStrategy};
use crate::db::Repository;
use crate::error::Result;
use crate::models::{candidates, ArticleKey, Candidate, ChangeEvent, Enrichment, FetchResult};
use crate::services::{format_payload, ContentFetch, Message, Notify, SecretResolve};

/// Cursor name of the enrichment consumer on the change log.
pub const CONSUMER: &str = "enricher";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Delivered,
    SkippedNoContent,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub events: usize,
    pub candidates: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subset of `failed` where the model refused our credentials.
    pub access_denied: usize,
}

impl BatchReport {
    fn merge(&mut self, other: BatchReport) {
        self.events += other.events;
        self.candidates += other.candidates;
        self.delivered += other.delivered;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.access_denied += other.access_denied;
    }
}

/// Counts of one batch plus the position of the first event whose candidate
/// failed in a way worth retrying.
struct BatchRun {
    report: BatchReport,
    retry_from: Option<usize>,
}

/// External capabilities the pipeline drives.
pub struct Collaborators<'a> {
    pub fetcher: &'a dyn ContentFetch,
    pub summarizer: &'a dyn Summarize,
    pub notifier: &'a dyn Notify,
    pub secrets: &'a dyn SecretResolve,
}

pub struct Enricher<'a> {
    config: &'a Config,
    repository: &'a Repository,
    services: Collaborators<'a>,
    classifier: Classifier,
}

impl<'a> Enricher<'a> {
    pub fn new(config: &'a Config, repository: &'a Repository, services: Collaborators<'a>) -> Self {
        Self {
            config,
            repository,
            services,
            classifier: Classifier::new(&config.taxonomy),
        }
    }

    /// Reads the store's change log from the committed cursor until it is
    /// exhausted. The cursor moves only past changes that were handled. When
    /// a candidate fails with a retryable error the cursor stops just before
    /// it and the drain ends, so the next drain delivers it again.
    pub async fn drain_change_log(&self) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        loop {
            let cursor = self.repository.change_cursor(CONSUMER).await?;
            let batch = self
                .repository
                .read_changes(cursor, self.config.change_batch_size)
                .await?;
            let Some(last_seq) = batch.last().map(|change| change.seq) else {
                break;
            };

            let seqs: Vec<i64> = batch.iter().map(|change| change.seq).collect();
            let events = batch.into_iter().map(|change| change.event).collect();
            let run = self.run_batch(events).await;
            report.merge(run.report);

            match run.retry_from {
                Some(position) => {
                    let held = seqs[position];
                    tracing::warn!(seq = held, "holding change log at a retryable failure");
                    self.repository.commit_change_cursor(CONSUMER, held - 1).await?;
                    break;
                }
                None => self.repository.commit_change_cursor(CONSUMER, last_seq).await?,
            }
        }

        Ok(report)
    }

    /// Handles one delivered batch. Every candidate is isolated: its failure is
    /// logged and counted, and the next candidate still runs.
    pub async fn process_batch(&self, events: Vec<ChangeEvent>) -> BatchReport {
        self.run_batch(events).await.report
    }

    async fn run_batch(&self, events: Vec<ChangeEvent>) -> BatchRun {
        let mut run = BatchRun {
            report: BatchReport {
                events: events.len(),
                ..Default::default()
            },
            retry_from: None,
        };
        let found = candidates(events);
        run.report.candidates = found.len();

        for (i, (position, candidate)) in found.iter().enumerate() {
            if i > 0 && self.config.dispatch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.dispatch_delay_ms)).await;
            }

            match self.process_item(candidate).await {
                Ok(ItemOutcome::Delivered) => {
                    tracing::info!(url = %candidate.link, "delivered and stored summary");
                    run.report.delivered += 1;
                }
                Ok(ItemOutcome::SkippedNoContent) => run.report.skipped += 1,
                Err(e) => {
                    if e.is_access_denied() {
                        run.report.access_denied += 1;
                    }
                    if e.is_retryable() && run.retry_from.is_none() {
                        run.retry_from = Some(*position);
                    }
                    tracing::error!(url = %candidate.link, error = %e, "failed to enrich article");
                    run.report.failed += 1;
                }
            }
        }

        run
    }

    /// fetch -> summarize -> post -> store. Nothing is written unless the
    /// post succeeded; the store write is a single overwrite, so running the
    /// same candidate again is harmless.
    pub async fn process_item(&self, candidate: &Candidate) -> Result<ItemOutcome> {
        let notifier = self.config.notifier(&candidate.notifier_name)?;
        let profile = self.config.summarizer(&notifier.summarizer_name)?;
        let webhook_url = self.services.secrets.resolve(&notifier.webhook_secret_ref)?;

        let FetchResult {
            main_text,
            preview_image_url,
        } = self.services.fetcher.fetch(&candidate.link).await;
        let Some(main_text) = main_text else {
            tracing::info!(url = %candidate.link, "no content extracted, skip enrichment");
            return Ok(ItemOutcome::SkippedNoContent);
        };
        let text = truncate_chars(&main_text, self.config.max_content_chars);

        let mut result = self.services.summarizer.summarize(text, profile).await?;
        result.tags = self.collect_tags(text, result.tags).await;

        let payload = format_payload(
            notifier.destination,
            &Message {
                link: &candidate.link,
                title: &candidate.title,
                summary: &result.summary,
                tags: notifier.show_tags.then_some(result.tags.as_slice()),
            },
        );
        self.services.notifier.post(&webhook_url, &payload).await?;

        let key = ArticleKey::new(&candidate.link, &candidate.notifier_name);
        self.repository
            .update_enrichment(
                &key,
                Enrichment {
                    summary: result.summary,
                    detail: result.rationale,
                    tags: result.tags,
                    ogp_image: preview_image_url.unwrap_or_default(),
                },
            )
            .await?;

        Ok(ItemOutcome::Delivered)
    }

    async fn collect_tags(&self, text: &str, initial: Vec<String>) -> Vec<String> {
        let mut tags = initial;

        if matches!(self.config.tagging, TaggingStrategy::Model | TaggingStrategy::Both) {
            match self.services.summarizer.extract_tags(text).await {
                Ok(found) => tags.extend(found),
                Err(e) => tracing::warn!(error = %e, "tag extraction failed, continuing without"),
            }
        }

        if matches!(self.config.tagging, TaggingStrategy::Keywords | TaggingStrategy::Both) {
            let categories = self.classifier.classify(text);
            let only_fallback = categories.len() == 1 && categories[0] == UNCATEGORIZED;
            if !(only_fallback && !tags.is_empty()) {
                tags.extend(categories);
            }
        }

        dedup_tags(tags)
    }
}

fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !unique.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            unique.push(tag);
        }
    }
    unique
}

/// Cuts `text` to at most `max` chars on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
