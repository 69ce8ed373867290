use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    format_published_at, parse_published_at, Article, ArticleImage, ArticleKey, ChangeEvent,
    ChangeKind, Enrichment, InsertOutcome, NewArticle,
};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "url, notifier_name, title, category, published_at, expire_at, \
                               summary, detail, tags, ogp_image, created_at";

/// A change-log row: its position in the stream plus the decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChange {
    pub seq: i64,
    pub event: ChangeEvent,
}

pub struct Repository {
    conn: Connection,
    retention_secs: i64,
}

impl Repository {
    pub async fn new(db_path: &str, retention_hours: i64) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            retention_secs: retention_hours * 3600,
        })
    }

    // Article operations

    /// Conditional put keyed by `(url, notifier_name)`. The TTL is fixed here
    /// and no later write touches it.
    pub async fn insert_if_absent(
        &self,
        article: NewArticle,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome> {
        let expire_at = now.timestamp() + self.retention_secs;
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO articles (url, notifier_name, title, category, published_at, expire_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(url, notifier_name) DO NOTHING"#,
                    params![
                        article.url,
                        article.notifier_name,
                        article.title,
                        article.category,
                        format_published_at(&article.published_at),
                        expire_at,
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        Ok(if changed == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    /// Overwrites the enrichment fields in one statement, so a failure leaves
    /// the row as it was.
    pub async fn update_enrichment(&self, key: &ArticleKey, enrichment: Enrichment) -> Result<()> {
        let tags_json = serde_json::to_string(&enrichment.tags)?;
        let (url, notifier_name) = (key.url.clone(), key.notifier_name.clone());
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE articles
                       SET summary = ?1, detail = ?2, tags = ?3, ogp_image = ?4
                       WHERE url = ?5 AND notifier_name = ?6"#,
                    params![
                        enrichment.summary,
                        enrichment.detail,
                        tags_json,
                        enrichment.ogp_image,
                        url,
                        notifier_name,
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(AppError::NotFound(format!(
                "article {} for notifier {}",
                key.url, key.notifier_name
            )));
        }
        Ok(())
    }

    pub async fn get_article(&self, key: &ArticleKey) -> Result<Option<Article>> {
        let (url, notifier_name) = (key.url.clone(), key.notifier_name.clone());
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM articles WHERE url = ?1 AND notifier_name = ?2",
                    ARTICLE_COLUMNS
                ))?;
                let article = stmt
                    .query_row(params![url, notifier_name], article_from_row)
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn list_articles(
        &self,
        notifier_name: Option<String>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {} FROM articles
                       WHERE (?1 IS NULL OR notifier_name = ?1)
                       ORDER BY published_at DESC, created_at DESC
                       LIMIT ?2"#,
                    ARTICLE_COLUMNS
                ))?;
                let articles = stmt
                    .query_map(params![notifier_name, limit], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn count_articles(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    /// Drops rows whose TTL has passed. Each removal shows up on the change
    /// log as a REMOVE event.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let now = now.timestamp();
        let removed = self
            .conn
            .call(move |conn| {
                let removed =
                    conn.execute("DELETE FROM articles WHERE expire_at <= ?1", params![now])?;
                Ok(removed)
            })
            .await?;
        Ok(removed)
    }

    // Change log operations

    pub async fn read_changes(&self, after_seq: i64, limit: usize) -> Result<Vec<StoredChange>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let changes = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT seq, event_name, url, notifier_name, title, category, published_at
                       FROM article_changes
                       WHERE seq > ?1
                       ORDER BY seq
                       LIMIT ?2"#,
                )?;
                let changes = stmt
                    .query_map(params![after_seq, limit], change_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(changes)
            })
            .await?;
        Ok(changes)
    }

    pub async fn change_cursor(&self, consumer: &str) -> Result<i64> {
        let consumer = consumer.to_string();
        let seq = self
            .conn
            .call(move |conn| {
                let seq = conn
                    .query_row(
                        "SELECT last_seq FROM change_cursors WHERE consumer = ?1",
                        params![consumer],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;
                Ok(seq.unwrap_or(0))
            })
            .await?;
        Ok(seq)
    }

    pub async fn commit_change_cursor(&self, consumer: &str, seq: i64) -> Result<()> {
        let consumer = consumer.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO change_cursors (consumer, last_seq) VALUES (?1, ?2)
                       ON CONFLICT(consumer) DO UPDATE SET
                           last_seq = MAX(last_seq, excluded.last_seq),
                           updated_at = datetime('now')"#,
                    params![consumer, seq],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Deletes change-log rows every consumer has already moved past.
    pub async fn compact_changes(&self) -> Result<usize> {
        let removed = self
            .conn
            .call(|conn| {
                let removed = conn.execute(
                    r#"DELETE FROM article_changes
                       WHERE seq <= (SELECT COALESCE(MIN(last_seq), 0) FROM change_cursors)"#,
                    [],
                )?;
                Ok(removed)
            })
            .await?;
        Ok(removed)
    }
}

fn parse_created_at(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let published_at: String = row.get(4)?;
    let tags: Option<String> = row.get(8)?;
    Ok(Article {
        url: row.get(0)?,
        notifier_name: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        published_at: parse_published_at(&published_at)
            .ok_or_else(|| conversion_error(4, format!("bad published_at '{}'", published_at)))?,
        expire_at: row.get(5)?,
        summary: row.get(6)?,
        detail: row.get(7)?,
        tags: tags.and_then(|s| serde_json::from_str(&s).ok()),
        ogp_image: row.get(9)?,
        created_at: row
            .get::<_, String>(10)
            .ok()
            .and_then(|s| parse_created_at(&s))
            .unwrap_or_else(Utc::now),
    })
}

fn change_from_row(row: &Row) -> rusqlite::Result<StoredChange> {
    let event_name: String = row.get(1)?;
    let kind = ChangeKind::parse(&event_name)
        .ok_or_else(|| conversion_error(1, format!("unknown event '{}'", event_name)))?;
    // REMOVE carries the old row only, like the managed streams do.
    let new_image = match kind {
        ChangeKind::Remove => None,
        ChangeKind::Insert | ChangeKind::Update => Some(ArticleImage {
            url: row.get(2)?,
            notifier_name: row.get(3)?,
            title: row.get(4)?,
            category: row.get(5)?,
            pubtime: row.get(6)?,
        }),
    };
    Ok(StoredChange {
        seq: row.get(0)?,
        event: ChangeEvent { kind, new_image },
    })
}
