//! Async facade over the merger and reader.
//!
//! Every call opens its own connection to the WAL database on the blocking
//! pool, so selections for different pairs run in parallel and the async
//! runtime never waits on disk or on the selector. Writers to the same pair,
//! in this process or another, are serialized by the commit-time snapshot
//! check in the store.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::merge::{HistoryMerger, MergeOutcome};
use super::reader::{self, HistoryView};
use crate::db;
use crate::error::{HistoryError, Result};

#[derive(Clone)]
pub struct HistoryEngine {
    db_path: Arc<PathBuf>,
    busy_timeout: Duration,
    merger: Arc<HistoryMerger>,
}

impl HistoryEngine {
    /// Prepare the database at `db_path` (schema, migrations) and build an
    /// engine over it.
    pub fn open(db_path: impl AsRef<Path>, busy_timeout: Duration, merger: HistoryMerger) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        db::open_database(&db_path, busy_timeout)?;
        Ok(Self {
            db_path: Arc::new(db_path),
            busy_timeout,
            merger: Arc::new(merger),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn capacity(&self) -> usize {
        self.merger.capacity()
    }

    pub async fn populate_history(
        &self,
        user: String,
        topic: String,
        cutoff: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let merger = Arc::clone(&self.merger);
        self.with_connection(move |conn| merger.populate(conn, &user, &topic, cutoff)).await
    }

    pub async fn merge_history(
        &self,
        user: String,
        topic: String,
        as_of: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let merger = Arc::clone(&self.merger);
        self.with_connection(move |conn| merger.merge(conn, &user, &topic, as_of)).await
    }

    pub async fn get_history(&self, user: String, topic: String) -> Result<HistoryView> {
        self.with_connection(move |conn| reader::view(&*conn, &user, &topic)).await
    }

    /// Run `op` on a fresh connection on the blocking pool. Also used for
    /// catalog writes.
    pub async fn with_connection<T, E, F>(&self, op: F) -> std::result::Result<T, E>
    where
        T: Send + 'static,
        E: From<HistoryError> + Send + 'static,
        F: FnOnce(&mut Connection) -> std::result::Result<T, E> + Send + 'static,
    {
        let db_path = Arc::clone(&self.db_path);
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || {
            let mut conn = db::connect(db_path.as_path(), busy_timeout)
                .map_err(|e| HistoryError::StoreUnavailable(format!("{e:#}")))?;
            op(&mut conn)
        })
        .await
        .map_err(|e| HistoryError::StoreUnavailable(format!("db task failed: {e}")))?
    }
}
