//! Engine error types.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors surfaced by the history engine.
///
/// Every variant is all-or-nothing: an operation that returns an error has
/// committed nothing.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Malformed timestamps, embedding-dimension mismatch, zero `k`,
    /// or an `asOf` that does not advance the watermark.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown user/topic, or an incremental merge on a pair that was never populated.
    #[error("not found: {0}")]
    NotFound(String),

    /// Initial population requested on a pair that already has a watermark.
    #[error("history for user {user} and topic {topic} is already populated; merge instead")]
    AlreadyInitialized { user: String, topic: String },

    /// The store failed for a reason other than contention.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store was locked past the busy timeout, or the operation deadline expired.
    #[error("store timed out")]
    StoreTimeout,

    /// Another writer kept winning the commit race.
    #[error("conflicting concurrent update; gave up after {attempts} attempts")]
    Conflict { attempts: u32 },
}

impl HistoryError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// `true` for failures the caller may retry unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::StoreTimeout | Self::Conflict { .. }
        )
    }
}

impl From<rusqlite::Error> for HistoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::StoreTimeout
            }
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

pub type Result<T, E = HistoryError> = std::result::Result<T, E>;
