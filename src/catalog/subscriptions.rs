//! Users, topics, and the subscriptions that make articles eligible.

use anyhow::{bail, Result};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::types::{Level, Subscription};

/// Result returned from [`subscribe`].
#[derive(Debug, Serialize)]
pub struct SubscribeResult {
    pub user_id: String,
    pub topic: String,
    pub level: Level,
    /// `false` if the subscription existed and only its level was updated.
    pub created: bool,
}

/// Create a user if missing; updates the display fields when given.
pub fn upsert_user(
    conn: &Connection,
    user_id: &str,
    name: Option<&str>,
    base_understanding: Option<Level>,
) -> Result<()> {
    if user_id.trim().is_empty() {
        bail!("user id must not be empty");
    }
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (id, name, base_understanding, created_at) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(id) DO UPDATE SET \
             name = COALESCE(excluded.name, users.name), \
             base_understanding = COALESCE(excluded.base_understanding, users.base_understanding)",
        params![user_id, name, base_understanding.map(|l| l.as_str()), now],
    )?;
    Ok(())
}

/// Create a topic if missing. Non-empty `keywords` replace the stored ones.
pub fn upsert_topic(conn: &Connection, name: &str, keywords: &[String]) -> Result<()> {
    if name.trim().is_empty() {
        bail!("topic name must not be empty");
    }
    let now = chrono::Utc::now().to_rfc3339();
    let keywords_json = if keywords.is_empty() {
        None
    } else {
        Some(serde_json::to_string(keywords)?)
    };
    conn.execute(
        "INSERT INTO topics (name, keywords, created_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(name) DO UPDATE SET keywords = COALESCE(excluded.keywords, topics.keywords)",
        params![name, keywords_json, now],
    )?;
    Ok(())
}

/// Subscribe a user to a topic, creating either node if needed.
pub fn subscribe(conn: &mut Connection, user_id: &str, topic: &str, level: Level) -> Result<SubscribeResult> {
    let tx = conn.transaction()?;
    upsert_user(&tx, user_id, None, None)?;
    upsert_topic(&tx, topic, &[])?;

    let now = chrono::Utc::now().to_rfc3339();
    let created = tx.execute(
        "INSERT OR IGNORE INTO subscriptions (user_id, topic, level, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, topic, level.as_str(), now],
    )? > 0;
    if !created {
        tx.execute(
            "UPDATE subscriptions SET level = ?3 WHERE user_id = ?1 AND topic = ?2",
            params![user_id, topic, level.as_str()],
        )?;
    }
    tx.commit()?;

    tracing::info!(user = %user_id, topic = %topic, level = %level, created, "subscription saved");

    Ok(SubscribeResult {
        user_id: user_id.to_string(),
        topic: topic.to_string(),
        level,
        created,
    })
}

/// Remove a subscription. Retained history for the pair is left untouched.
pub fn unsubscribe(conn: &Connection, user_id: &str, topic: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM subscriptions WHERE user_id = ?1 AND topic = ?2",
        params![user_id, topic],
    )?;
    Ok(removed > 0)
}

/// List a user's subscriptions ordered by topic name.
pub fn list_subscriptions(conn: &Connection, user_id: &str) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, topic, level, created_at FROM subscriptions \
         WHERE user_id = ?1 ORDER BY topic",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(user_id, topic, level, created_at)| {
            let level = level.parse::<Level>().map_err(anyhow::Error::msg)?;
            Ok(Subscription {
                user_id,
                topic,
                level,
                created_at,
            })
        })
        .collect()
}
