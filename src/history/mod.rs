//! Bounded diversity history: per-(user, topic) sets of at most K articles
//! chosen to span the topic's embedding space.
//!
//! - [`vector`] — cosine distance and the pairwise distance matrix
//! - [`select`] — greedy farthest-point selection
//! - [`store`] — the graph-store boundary and its SQLite implementation
//! - [`watermark`] — the per-pair "already considered" boundary
//! - [`merge`] — initial population and incremental merge
//! - [`reader`] — read-only access to persisted histories
//! - [`engine`] — async facade used by the MCP tools

pub mod engine;
pub mod merge;
pub mod reader;
pub mod select;
pub mod store;
pub mod vector;
pub mod watermark;

pub use engine::HistoryEngine;
pub use merge::{HistoryMerger, MergeOutcome, MergeStatus};
pub use store::{GraphStore, HistoryRecord};
