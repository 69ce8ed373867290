pub const SCHEMA: &str = r#"
-- articles table
CREATE TABLE IF NOT EXISTS articles (
    url TEXT NOT NULL,
    notifier_name TEXT NOT NULL,
    title TEXT NOT NULL,
    category TEXT NOT NULL,
    published_at TEXT NOT NULL,
    expire_at INTEGER NOT NULL,
    summary TEXT,
    detail TEXT,
    tags TEXT,
    ogp_image TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    PRIMARY KEY (url, notifier_name)
);

CREATE INDEX IF NOT EXISTS idx_articles_notifier ON articles(notifier_name);
CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at DESC);
CREATE INDEX IF NOT EXISTS idx_articles_expire_at ON articles(expire_at);

-- article_changes table (change stream feeding the enrichment pipeline)
CREATE TABLE IF NOT EXISTS article_changes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event_name TEXT NOT NULL,
    url TEXT NOT NULL,
    notifier_name TEXT NOT NULL,
    title TEXT NOT NULL,
    category TEXT NOT NULL,
    published_at TEXT NOT NULL,
    recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TRIGGER IF NOT EXISTS trg_articles_insert AFTER INSERT ON articles
BEGIN
    INSERT INTO article_changes (event_name, url, notifier_name, title, category, published_at)
    VALUES ('INSERT', NEW.url, NEW.notifier_name, NEW.title, NEW.category, NEW.published_at);
END;

CREATE TRIGGER IF NOT EXISTS trg_articles_update AFTER UPDATE ON articles
BEGIN
    INSERT INTO article_changes (event_name, url, notifier_name, title, category, published_at)
    VALUES ('UPDATE', NEW.url, NEW.notifier_name, NEW.title, NEW.category, NEW.published_at);
END;

CREATE TRIGGER IF NOT EXISTS trg_articles_delete AFTER DELETE ON articles
BEGIN
    INSERT INTO article_changes (event_name, url, notifier_name, title, category, published_at)
    VALUES ('REMOVE', OLD.url, OLD.notifier_name, OLD.title, OLD.category, OLD.published_at);
END;

-- change_cursors table (last seq each consumer has fully processed)
CREATE TABLE IF NOT EXISTS change_cursors (
    consumer TEXT PRIMARY KEY,
    last_seq INTEGER NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
