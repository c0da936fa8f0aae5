//! Article ingest: the write path that feeds candidate pools.
//!
//! [`upsert_article`] merges an article node by link together with its
//! channel (COMES_FROM) and topics (RELATED_TO). Articles are immutable: a
//! second upsert of the same link keeps the original title, description,
//! publication date and embedding, and only adds missing topic links.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use super::embedding_to_bytes;
use super::types::NewArticle;
use crate::timestamp::{require_micros, to_micros};

/// Result returned from an upsert.
#[derive(Debug, Serialize)]
pub struct UpsertArticleResult {
    pub link: String,
    /// `false` if the link already existed and only relations were merged.
    pub created: bool,
    /// Number of RELATED_TO links that did not exist before.
    pub topics_linked: usize,
}

/// Insert an article (or merge relations onto an existing one).
///
/// Validates the link and the embedding dimension before touching the
/// database. All writes run inside one transaction.
pub fn upsert_article(
    conn: &mut Connection,
    article: &NewArticle,
    dimension: usize,
) -> Result<UpsertArticleResult> {
    validate_article(article, dimension)?;

    let tx = conn.transaction()?;
    let now = chrono::Utc::now().to_rfc3339();

    if let Some(channel) = article.channel.as_deref() {
        tx.execute(
            "INSERT OR IGNORE INTO channels (title) VALUES (?1)",
            params![channel],
        )?;
    }

    let created = tx.execute(
        "INSERT OR IGNORE INTO articles (link, title, description, pub_date, embedding, channel, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            article.link,
            article.title,
            article.description,
            to_micros(article.pub_date),
            embedding_to_bytes(&article.embedding),
            article.channel,
            now,
        ],
    )? > 0;

    let mut topics_linked = 0;
    for topic in &article.topics {
        topics_linked += link_topic(&tx, &article.link, topic, &now)?;
    }

    tx.commit()?;

    tracing::debug!(link = %article.link, created, topics_linked, "article upserted");

    Ok(UpsertArticleResult {
        link: article.link.clone(),
        created,
        topics_linked,
    })
}

/// Check whether an article exists.
pub fn article_exists(conn: &Connection, link: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM articles WHERE link = ?1",
            params![link],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn validate_article(article: &NewArticle, dimension: usize) -> Result<()> {
    if article.link.trim().is_empty() {
        bail!("article link must not be empty");
    }
    if article.embedding.len() != dimension {
        bail!(
            "embedding for {} has {} dimensions, expected {dimension}",
            article.link,
            article.embedding.len()
        );
    }
    if article.embedding.iter().any(|v| !v.is_finite()) {
        bail!("embedding for {} contains non-finite values", article.link);
    }
    require_micros(article.pub_date)
        .with_context(|| format!("pub_date of {} cannot be stored", article.link))?;
    Ok(())
}

/// Merge a topic node and its RELATED_TO edge. Returns 1 if the edge is new.
fn link_topic(tx: &Transaction, link: &str, topic: &str, now: &str) -> Result<usize> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Ok(0);
    }
    tx.execute(
        "INSERT OR IGNORE INTO topics (name, created_at) VALUES (?1, ?2)",
        params![topic, now],
    )?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO article_topics (article_link, topic) VALUES (?1, ?2)",
        params![link, topic],
    )?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    fn article(link: &str, topics: &[&str]) -> NewArticle {
        NewArticle {
            link: link.to_string(),
            title: Some(format!("Title of {link}")),
            description: None,
            pub_date: chrono::Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            channel: Some("Example Feed".to_string()),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            embedding: vec![1.0, 0.0, 0.0],
        }
    }

    #[test]
    fn upsert_creates_article_channel_and_topics() {
        let mut conn = test_db();
        let result = upsert_article(&mut conn, &article("https://a", &["GNN", "RL"]), 3).unwrap();
        assert!(result.created);
        assert_eq!(result.topics_linked, 2);
        assert!(article_exists(&conn, "https://a").unwrap());

        let channels: i64 = conn
            .query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))
            .unwrap();
        assert_eq!(channels, 1);
    }

    #[test]
    fn upsert_is_first_write_wins() {
        let mut conn = test_db();
        upsert_article(&mut conn, &article("https://a", &["GNN"]), 3).unwrap();

        let mut again = article("https://a", &["GNN", "Vision"]);
        again.title = Some("Rewritten".into());
        let result = upsert_article(&mut conn, &again, 3).unwrap();
        assert!(!result.created);
        assert_eq!(result.topics_linked, 1);

        let title: String = conn
            .query_row("SELECT title FROM articles WHERE link = 'https://a'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(title, "Title of https://a");
    }

    #[test]
    fn upsert_rejects_dimension_mismatch() {
        let mut conn = test_db();
        let err = upsert_article(&mut conn, &article("https://a", &["GNN"]), 768).unwrap_err();
        assert!(err.to_string().contains("expected 768"));
        assert!(!article_exists(&conn, "https://a").unwrap());
    }

    #[test]
    fn upsert_rejects_sub_microsecond_pub_date() {
        let mut conn = test_db();
        let mut edge = article("https://edge", &["RL"]);
        edge.pub_date = edge.pub_date + chrono::Duration::nanoseconds(100);
        let err = upsert_article(&mut conn, &edge, 3).unwrap_err();
        assert!(format!("{err:#}").contains("microsecond"));
        assert!(!article_exists(&conn, "https://edge").unwrap());
    }

    #[test]
    fn upsert_rejects_empty_link() {
        let mut conn = test_db();
        let err = upsert_article(&mut conn, &article("  ", &[]), 3).unwrap_err();
        assert!(err.to_string().contains("link"));
    }
}
