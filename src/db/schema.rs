//! SQL DDL for all chronicle tables.
//!
//! The graph is modelled relationally: `users`, `topics`, `channels` and
//! `articles` are nodes; `article_topics` (RELATED_TO), `subscriptions`
//! (user → topic) and `history_entries` (the ternary user/topic/article fact)
//! are edges. `watermarks` holds the per-pair merge boundary, which exists
//! even when the retained history is empty. All DDL uses `IF NOT EXISTS`.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT,
    base_understanding TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    name TEXT PRIMARY KEY,
    keywords TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channels (
    title TEXT PRIMARY KEY
);

-- Articles are immutable once created. pub_date is unix microseconds (UTC),
-- embedding is a little-endian f32 blob.
CREATE TABLE IF NOT EXISTS articles (
    link TEXT PRIMARY KEY,
    title TEXT,
    description TEXT,
    pub_date INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    channel TEXT REFERENCES channels(title),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_pub_date ON articles(pub_date);

CREATE TABLE IF NOT EXISTS article_topics (
    article_link TEXT NOT NULL REFERENCES articles(link) ON DELETE CASCADE,
    topic TEXT NOT NULL REFERENCES topics(name) ON DELETE CASCADE,
    PRIMARY KEY (article_link, topic)
);

CREATE INDEX IF NOT EXISTS idx_article_topics_topic ON article_topics(topic);

CREATE TABLE IF NOT EXISTS subscriptions (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    topic TEXT NOT NULL REFERENCES topics(name) ON DELETE CASCADE,
    level TEXT NOT NULL DEFAULT 'intermediate' CHECK(level IN ('beginner','intermediate','expert')),
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, topic)
);

-- last_queried_at equals the pair's watermark for every row (written together).
CREATE TABLE IF NOT EXISTS history_entries (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    topic TEXT NOT NULL REFERENCES topics(name) ON DELETE CASCADE,
    article_link TEXT NOT NULL REFERENCES articles(link) ON DELETE CASCADE,
    last_queried_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, topic, article_link)
);

CREATE TABLE IF NOT EXISTS watermarks (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    topic TEXT NOT NULL REFERENCES topics(name) ON DELETE CASCADE,
    watermark INTEGER NOT NULL,
    PRIMARY KEY (user_id, topic)
);

-- Audit log
CREATE TABLE IF NOT EXISTS history_log (
    id TEXT PRIMARY KEY,
    operation TEXT NOT NULL CHECK(operation IN ('populate','merge','unchanged')),
    user_id TEXT NOT NULL,
    topic TEXT NOT NULL,
    watermark INTEGER NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_log_pair ON history_log(user_id, topic);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
