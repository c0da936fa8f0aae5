//! Read-only view of a persisted history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::store::{GraphStore, HistoryRecord};
use crate::error::{HistoryError, Result};

/// A pair's retained articles together with its watermark.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub user: String,
    pub topic: String,
    /// `None` while the pair is uninitialized.
    pub watermark: Option<DateTime<Utc>>,
    pub articles: Vec<HistoryRecord>,
}

/// Retained articles, newest first. Uninitialized or unknown pairs read as
/// empty rather than failing.
pub fn read<S: GraphStore + ?Sized>(store: &S, user: &str, topic: &str) -> Result<Vec<HistoryRecord>> {
    if user.trim().is_empty() || topic.trim().is_empty() {
        return Err(HistoryError::invalid("user id and topic must not be empty"));
    }
    store.read_history(user, topic)
}

/// [`read`] plus the watermark, for callers that display both.
pub fn view<S: GraphStore + ?Sized>(store: &S, user: &str, topic: &str) -> Result<HistoryView> {
    let articles = read(store, user, topic)?;
    Ok(HistoryView {
        user: user.to_string(),
        topic: topic.to_string(),
        watermark: store.read_watermark(user, topic)?,
        articles,
    })
}
