//! Per-(user, topic) watermark: the boundary between articles already
//! considered and articles that are newly eligible.
//!
//! The watermark only moves inside a history commit; there is no standalone
//! setter.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::store::GraphStore;
use crate::error::{HistoryError, Result};
use crate::timestamp::{micros_column, to_micros};

/// The pair's watermark, or `NotFound` if the pair was never populated.
pub fn get_watermark<S: GraphStore + ?Sized>(
    store: &S,
    user: &str,
    topic: &str,
) -> Result<DateTime<Utc>> {
    store.read_watermark(user, topic)?.ok_or_else(|| {
        HistoryError::not_found(format!(
            "no watermark for user {user:?} and topic {topic:?}; populate the history first"
        ))
    })
}

pub(crate) fn read_watermark(
    conn: &Connection,
    user: &str,
    topic: &str,
) -> Result<Option<DateTime<Utc>>> {
    let watermark = conn
        .query_row(
            "SELECT watermark FROM watermarks WHERE user_id = ?1 AND topic = ?2",
            params![user, topic],
            |row| micros_column(row, 0),
        )
        .optional()?;
    Ok(watermark)
}

/// Insert or move the watermark forward. Refuses to move it backwards.
pub(crate) fn advance_watermark(
    tx: &Transaction,
    user: &str,
    topic: &str,
    watermark: DateTime<Utc>,
) -> Result<()> {
    let changed = tx.execute(
        "INSERT INTO watermarks (user_id, topic, watermark) VALUES (?1, ?2, ?3) \
         ON CONFLICT(user_id, topic) DO UPDATE SET watermark = excluded.watermark \
         WHERE excluded.watermark >= watermarks.watermark",
        params![user, topic, to_micros(watermark)],
    )?;
    if changed == 0 {
        return Err(HistoryError::invalid(format!(
            "watermark for user {user:?} and topic {topic:?} cannot move back to {watermark}"
        )));
    }
    Ok(())
}
