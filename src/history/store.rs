//! The graph-store boundary used by the history engine.
//!
//! [`GraphStore`] is the only way the merger touches persistent state. Rows
//! come back as typed records ([`CandidateArticle`], [`HistoryRecord`]) and a
//! whole history replacement goes through [`GraphStore::write_history`] as
//! one atomic commit. The SQLite implementation lives on
//! [`rusqlite::Connection`] directly.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::time::Instant;

use super::watermark;
use crate::catalog::bytes_to_embedding;
use crate::error::{HistoryError, Result};
use crate::timestamp::{micros_column, to_micros};

// ── Records ──────────────────────────────────────────────────────────────────

/// An article eligible for selection.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateArticle {
    pub link: String,
    pub embedding: Vec<f32>,
    pub pub_date: DateTime<Utc>,
}

/// One retained article of a (user, topic) history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub last_queried_at: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl HistoryRecord {
    pub fn to_candidate(&self) -> CandidateArticle {
        CandidateArticle {
            link: self.link.clone(),
            embedding: self.embedding.clone(),
            pub_date: self.pub_date,
        }
    }
}

/// Publication-date window for eligibility queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// `pub_date < cutoff`
    Before(DateTime<Utc>),
    /// `after < pub_date <= up_to`
    Between {
        after: DateTime<Utc>,
        up_to: DateTime<Utc>,
    },
}

impl Window {
    /// `(exclusive lower, inclusive upper)` bounds in microseconds.
    fn bounds(&self) -> (i64, i64) {
        match *self {
            Window::Before(cutoff) => (i64::MIN, to_micros(cutoff) - 1),
            Window::Between { after, up_to } => (to_micros(after), to_micros(up_to)),
        }
    }
}

/// Which engine operation produced a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    Populate,
    Merge,
    Unchanged,
}

impl CommitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Populate => "populate",
            Self::Merge => "merge",
            Self::Unchanged => "unchanged",
        }
    }
}

/// A full replacement of one pair's history plus its new watermark.
///
/// `expected_watermark` and `window_count` describe the snapshot the
/// selection was computed from; the store refuses the commit if either no
/// longer matches.
#[derive(Debug)]
pub struct HistoryCommit<'a> {
    pub user: &'a str,
    pub topic: &'a str,
    pub kind: CommitKind,
    /// Article links to retain, in selection order.
    pub selected: &'a [String],
    /// New watermark; also the `last_queried_at` of every retained entry.
    pub watermark: DateTime<Utc>,
    pub expected_watermark: Option<DateTime<Utc>>,
    pub window: Window,
    pub window_count: usize,
    pub details: serde_json::Value,
    /// The commit is abandoned (rolled back) if this passes before COMMIT.
    pub deadline: Instant,
}

/// Outcome of [`GraphStore::write_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// The snapshot was outdated by a concurrent writer; nothing was written.
    Stale,
}

// ── Trait ────────────────────────────────────────────────────────────────────

pub trait GraphStore {
    /// `NotFound` unless both the user and the topic exist.
    fn check_pair(&self, user: &str, topic: &str) -> Result<()>;

    /// Articles related to `topic`, visible to `user` through a subscription,
    /// with `pub_date` inside `window`. Ordered by `(pub_date, link)`.
    fn query_eligible_articles(
        &self,
        user: &str,
        topic: &str,
        window: Window,
    ) -> Result<Vec<CandidateArticle>>;

    /// Retained history ordered by recency (newest first, then link).
    fn read_history(&self, user: &str, topic: &str) -> Result<Vec<HistoryRecord>>;

    fn read_watermark(&self, user: &str, topic: &str) -> Result<Option<DateTime<Utc>>>;

    /// Atomically replace the pair's history and advance its watermark.
    fn write_history(&mut self, commit: &HistoryCommit<'_>) -> Result<CommitStatus>;
}

// ── SQLite implementation ────────────────────────────────────────────────────

const ELIGIBLE_SQL: &str = "\
    SELECT a.link, a.embedding, a.pub_date FROM articles a \
    JOIN article_topics rel ON rel.article_link = a.link \
    JOIN subscriptions s ON s.topic = rel.topic \
    WHERE s.user_id = ?1 AND rel.topic = ?2 AND a.pub_date > ?3 AND a.pub_date <= ?4 \
    ORDER BY a.pub_date, a.link";

const ELIGIBLE_COUNT_SQL: &str = "\
    SELECT COUNT(*) FROM articles a \
    JOIN article_topics rel ON rel.article_link = a.link \
    JOIN subscriptions s ON s.topic = rel.topic \
    WHERE s.user_id = ?1 AND rel.topic = ?2 AND a.pub_date > ?3 AND a.pub_date <= ?4";

impl GraphStore for Connection {
    fn check_pair(&self, user: &str, topic: &str) -> Result<()> {
        let user_found: Option<i64> = self
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![user], |row| row.get(0))
            .optional()?;
        if user_found.is_none() {
            return Err(HistoryError::not_found(format!("unknown user: {user}")));
        }
        let topic_found: Option<i64> = self
            .query_row("SELECT 1 FROM topics WHERE name = ?1", params![topic], |row| row.get(0))
            .optional()?;
        if topic_found.is_none() {
            return Err(HistoryError::not_found(format!("unknown topic: {topic}")));
        }
        Ok(())
    }

    fn query_eligible_articles(
        &self,
        user: &str,
        topic: &str,
        window: Window,
    ) -> Result<Vec<CandidateArticle>> {
        let (lower, upper) = window.bounds();
        let mut stmt = self.prepare(ELIGIBLE_SQL)?;
        let rows = stmt
            .query_map(params![user, topic, lower, upper], |row| {
                Ok(CandidateArticle {
                    link: row.get(0)?,
                    embedding: bytes_to_embedding(&row.get::<_, Vec<u8>>(1)?),
                    pub_date: micros_column(row, 2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_history(&self, user: &str, topic: &str) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.prepare(
            "SELECT a.link, a.title, a.channel, a.pub_date, h.last_queried_at, a.embedding \
             FROM history_entries h JOIN articles a ON a.link = h.article_link \
             WHERE h.user_id = ?1 AND h.topic = ?2 \
             ORDER BY a.pub_date DESC, a.link ASC",
        )?;
        let rows = stmt
            .query_map(params![user, topic], |row| {
                Ok(HistoryRecord {
                    link: row.get(0)?,
                    title: row.get(1)?,
                    channel: row.get(2)?,
                    pub_date: micros_column(row, 3)?,
                    last_queried_at: micros_column(row, 4)?,
                    embedding: bytes_to_embedding(&row.get::<_, Vec<u8>>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_watermark(&self, user: &str, topic: &str) -> Result<Option<DateTime<Utc>>> {
        watermark::read_watermark(self, user, topic)
    }

    fn write_history(&mut self, commit: &HistoryCommit<'_>) -> Result<CommitStatus> {
        // IMMEDIATE takes the write lock up front, so the checks below and
        // the writes that follow see the same database state.
        let tx = self.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if watermark::read_watermark(&tx, commit.user, commit.topic)? != commit.expected_watermark {
            return Ok(CommitStatus::Stale);
        }
        let (lower, upper) = commit.window.bounds();
        let count: i64 = tx.query_row(
            ELIGIBLE_COUNT_SQL,
            params![commit.user, commit.topic, lower, upper],
            |row| row.get(0),
        )?;
        if count as usize != commit.window_count {
            return Ok(CommitStatus::Stale);
        }

        tx.execute(
            "DELETE FROM history_entries WHERE user_id = ?1 AND topic = ?2",
            params![commit.user, commit.topic],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO history_entries (user_id, topic, article_link, last_queried_at) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let stamp = to_micros(commit.watermark);
            for link in commit.selected {
                insert.execute(params![commit.user, commit.topic, link, stamp])?;
            }
        }
        watermark::advance_watermark(&tx, commit.user, commit.topic, commit.watermark)?;
        write_audit_log(&tx, commit)?;

        if Instant::now() >= commit.deadline {
            return Err(HistoryError::StoreTimeout);
        }
        tx.commit()?;
        Ok(CommitStatus::Committed)
    }
}

fn write_audit_log(conn: &Connection, commit: &HistoryCommit<'_>) -> Result<()> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO history_log (id, operation, user_id, topic, watermark, details, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            commit.kind.as_str(),
            commit.user,
            commit.topic,
            to_micros(commit.watermark),
            commit.details.to_string(),
            now,
        ],
    )?;
    Ok(())
}

// ── Operator queries ─────────────────────────────────────────────────────────

/// One populated (user, topic) pair.
#[derive(Debug, Serialize)]
pub struct PairSummary {
    pub user_id: String,
    pub topic: String,
    pub watermark: DateTime<Utc>,
    pub entries: usize,
}

/// All populated pairs with their current history size.
pub fn pair_summaries(conn: &Connection) -> Result<Vec<PairSummary>> {
    let mut stmt = conn.prepare(
        "SELECT w.user_id, w.topic, w.watermark, COUNT(h.article_link) \
         FROM watermarks w \
         LEFT JOIN history_entries h ON h.user_id = w.user_id AND h.topic = w.topic \
         GROUP BY w.user_id, w.topic, w.watermark \
         ORDER BY w.user_id, w.topic",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PairSummary {
                user_id: row.get(0)?,
                topic: row.get(1)?,
                watermark: micros_column(row, 2)?,
                entries: row.get::<_, i64>(3)? as usize,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// An audit log entry.
#[derive(Debug, Serialize)]
pub struct LogEntry {
    pub id: String,
    pub operation: String,
    pub watermark: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

/// Most recent audit entries for a pair, newest first.
pub fn recent_log(conn: &Connection, user: &str, topic: &str, limit: usize) -> Result<Vec<LogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, operation, watermark, details, created_at FROM history_log \
         WHERE user_id = ?1 AND topic = ?2 ORDER BY created_at DESC, id DESC LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![user, topic, limit as i64], |row| {
            let details: Option<String> = row.get(3)?;
            Ok(LogEntry {
                id: row.get(0)?,
                operation: row.get(1)?,
                watermark: micros_column(row, 2)?,
                details: details.and_then(|d| serde_json::from_str(&d).ok()),
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::articles::upsert_article;
    use crate::catalog::subscriptions::subscribe;
    use crate::catalog::types::{Level, NewArticle};
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, d, 0, 0, 0).unwrap()
    }

    fn add_article(conn: &mut Connection, link: &str, topic: &str, pub_date: DateTime<Utc>) {
        let article = NewArticle {
            link: link.to_string(),
            title: Some(link.to_uppercase()),
            description: None,
            pub_date,
            channel: None,
            topics: vec![topic.to_string()],
            embedding: vec![1.0, 0.0],
        };
        upsert_article(conn, &article, 2).unwrap();
    }

    fn test_db() -> Connection {
        let mut conn = crate::db::open_memory_database().unwrap();
        subscribe(&mut conn, "u1", "RL", Level::Intermediate).unwrap();
        add_article(&mut conn, "a", "RL", day(1));
        add_article(&mut conn, "b", "RL", day(2));
        add_article(&mut conn, "c", "RL", day(3));
        add_article(&mut conn, "x", "Vision", day(1));
        conn
    }

    fn commit<'a>(selected: &'a [String], watermark: DateTime<Utc>) -> HistoryCommit<'a> {
        HistoryCommit {
            user: "u1",
            topic: "RL",
            kind: CommitKind::Populate,
            selected,
            watermark,
            expected_watermark: None,
            window: Window::Before(watermark),
            window_count: 2,
            details: serde_json::json!({}),
            deadline: Instant::now() + std::time::Duration::from_secs(60),
        }
    }

    #[test]
    fn before_window_is_exclusive() {
        let conn = test_db();
        let found = conn.query_eligible_articles("u1", "RL", Window::Before(day(3))).unwrap();
        let links: Vec<&str> = found.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(links, vec!["a", "b"]);
    }

    #[test]
    fn between_window_is_half_open() {
        let conn = test_db();
        let window = Window::Between { after: day(1), up_to: day(3) };
        let found = conn.query_eligible_articles("u1", "RL", window).unwrap();
        let links: Vec<&str> = found.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(links, vec!["b", "c"]);
    }

    #[test]
    fn unsubscribed_topic_has_no_candidates() {
        let conn = test_db();
        let found = conn
            .query_eligible_articles("u1", "Vision", Window::Before(day(30)))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn check_pair_reports_unknown_names() {
        let conn = test_db();
        conn.check_pair("u1", "RL").unwrap();
        assert!(matches!(conn.check_pair("nobody", "RL"), Err(HistoryError::NotFound(_))));
        assert!(matches!(conn.check_pair("u1", "Poetry"), Err(HistoryError::NotFound(_))));
    }

    #[test]
    fn write_history_replaces_set_and_stamps_watermark() {
        let mut conn = test_db();
        let first = vec!["a".to_string(), "b".to_string()];
        let status = conn.write_history(&commit(&first, day(3))).unwrap();
        assert_eq!(status, CommitStatus::Committed);

        let second = vec!["c".to_string()];
        let mut replace = commit(&second, day(4));
        replace.kind = CommitKind::Merge;
        replace.expected_watermark = Some(day(3));
        replace.window = Window::Between { after: day(2), up_to: day(4) };
        replace.window_count = 1;
        assert_eq!(conn.write_history(&replace).unwrap(), CommitStatus::Committed);

        let history = conn.read_history("u1", "RL").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].link, "c");
        assert_eq!(history[0].last_queried_at, day(4));
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), Some(day(4)));
    }

    #[test]
    fn write_history_detects_stale_watermark() {
        let mut conn = test_db();
        let selected = vec!["a".to_string()];
        let mut stale = commit(&selected, day(3));
        stale.expected_watermark = Some(day(2));
        assert_eq!(conn.write_history(&stale).unwrap(), CommitStatus::Stale);
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), None);
    }

    #[test]
    fn write_history_detects_new_arrivals_in_window() {
        let mut conn = test_db();
        let selected = vec!["a".to_string()];
        let mut stale = commit(&selected, day(3));
        stale.window_count = 1;
        assert_eq!(conn.write_history(&stale).unwrap(), CommitStatus::Stale);
        assert!(conn.read_history("u1", "RL").unwrap().is_empty());
    }

    #[test]
    fn write_history_rolls_back_after_deadline() {
        let mut conn = test_db();
        let selected = vec!["a".to_string()];
        let mut late = commit(&selected, day(3));
        late.deadline = Instant::now();
        let err = conn.write_history(&late).unwrap_err();
        assert!(matches!(err, HistoryError::StoreTimeout));
        assert!(conn.read_history("u1", "RL").unwrap().is_empty());
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), None);
    }

    #[test]
    fn read_history_orders_by_recency() {
        let mut conn = test_db();
        let selected = vec!["a".to_string(), "b".to_string()];
        conn.write_history(&commit(&selected, day(3))).unwrap();
        let links: Vec<String> = conn
            .read_history("u1", "RL")
            .unwrap()
            .into_iter()
            .map(|r| r.link)
            .collect();
        assert_eq!(links, vec!["b", "a"]);
    }

    #[test]
    fn pair_summaries_and_log() {
        let mut conn = test_db();
        let selected = vec!["a".to_string(), "b".to_string()];
        conn.write_history(&commit(&selected, day(3))).unwrap();

        let pairs = pair_summaries(&conn).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].entries, 2);
        assert_eq!(pairs[0].watermark, day(3));

        let log = recent_log(&conn, "u1", "RL", 10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].operation, "populate");
    }
}
