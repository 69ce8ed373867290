use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};

mod ai;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod pipeline;
mod services;

use ai::Summarizer;
use config::Config;
use db::Repository;
use feed::{FeedFetcher, PollReport, PollTrigger, Poller};
use models::StreamBatch;
use pipeline::{BatchReport, Collaborators, Enricher};
use services::{ContentFetcher, EnvSecretResolver, WebhookNotifier};

#[derive(Debug, Parser)]
#[command(name = "rss-digest-notifier", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true, env = "RSS_DIGEST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll feeds and store new articles
    Poll {
        /// Only poll this notifier
        #[arg(long, conflicts_with = "event")]
        notifier: Option<String>,
        /// Poll trigger JSON document
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Summarize and announce newly inserted articles
    Enrich {
        /// Change-stream batch JSON document instead of the local change log
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Print stored articles as JSON lines, newest first
    List {
        #[arg(long)]
        notifier: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Drop expired articles and consumed change-log rows
    Purge,
    /// Poll every notifier, then enrich
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let repository = Repository::new(&config.db_path, config.retention_hours)
        .await
        .with_context(|| format!("opening article store at {}", config.db_path))?;

    match cli.command {
        Command::Poll { notifier, event } => {
            let report = poll(&config, &repository, notifier.as_deref(), event.as_deref()).await?;
            log_poll_report(&report);
        }
        Command::Enrich { events } => {
            let report = enrich(&config, &repository, events.as_deref()).await?;
            finish_enrich(&report)?;
        }
        Command::List { notifier, limit } => {
            let total = repository.count_articles().await?;
            let articles = repository.list_articles(notifier, limit).await?;
            tracing::info!(total, shown = articles.len(), "listing articles");
            for article in articles {
                println!("{}", serde_json::to_string(&article)?);
            }
        }
        Command::Purge => {
            let removed = repository.purge_expired(Utc::now()).await?;
            // REMOVE rows stay on the log until the enricher has moved past them.
            let compacted = repository.compact_changes().await?;
            tracing::info!(removed, compacted, "purge finished");
        }
        Command::Run => {
            let report = poll(&config, &repository, None, None).await?;
            log_poll_report(&report);
            let report = enrich(&config, &repository, None).await?;
            finish_enrich(&report)?;
        }
    }

    Ok(())
}

async fn poll(
    config: &Config,
    repository: &Repository,
    notifier: Option<&str>,
    event: Option<&Path>,
) -> anyhow::Result<PollReport> {
    let fetcher = FeedFetcher::new()?;
    let poller = Poller::new(config, repository, &fetcher);
    let now = Utc::now();

    let report = match (notifier, event) {
        (_, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading poll trigger {}", path.display()))?;
            let trigger: PollTrigger = serde_json::from_str(&content)?;
            poller.poll_trigger(&trigger, now).await
        }
        (Some(name), None) => {
            let notifier = config.notifier(name)?;
            poller.poll(name, &notifier.rss_url, now).await
        }
        (None, None) => poller.poll_all(now).await,
    };
    Ok(report)
}

async fn enrich(
    config: &Config,
    repository: &Repository,
    events: Option<&Path>,
) -> anyhow::Result<BatchReport> {
    let api_key = config
        .api_key()
        .context("no model API key: set [model].api_key or ANTHROPIC_API_KEY")?;
    let summarizer = Summarizer::new(config.model.clone(), api_key)?;
    tracing::debug!(model = summarizer.model_version(), "summarizer ready");
    let fetcher = ContentFetcher::new()?;
    let notifier = WebhookNotifier::new()?;
    let secrets = EnvSecretResolver;

    let enricher = Enricher::new(
        config,
        repository,
        Collaborators {
            fetcher: &fetcher,
            summarizer: &summarizer,
            notifier: &notifier,
            secrets: &secrets,
        },
    );

    let report = match events {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading change batch {}", path.display()))?;
            let batch: StreamBatch = serde_json::from_str(&content)?;
            enricher.process_batch(batch.into_events()).await
        }
        None => enricher.drain_change_log().await?,
    };
    Ok(report)
}

fn log_poll_report(report: &PollReport) {
    tracing::info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        stale = report.stale_entries,
        malformed = report.malformed_entries,
        store_errors = report.store_errors,
        skipped_feeds = report.skipped_feeds,
        failed_feeds = report.failed_feeds,
        "poll finished"
    );
}

fn finish_enrich(report: &BatchReport) -> anyhow::Result<()> {
    tracing::info!(
        events = report.events,
        candidates = report.candidates,
        delivered = report.delivered,
        skipped = report.skipped,
        failed = report.failed,
        "enrich finished"
    );
    if report.access_denied > 0 {
        bail!(
            "model access denied for {} article(s); check the API key and model permissions",
            report.access_denied
        );
    }
    Ok(())
}
