//! Bounded, diversity-preserving article histories for topic subscriptions.
//!
//! For each (user, topic) pair chronicle keeps at most K articles, chosen so
//! that together they cover the topic's semantic breadth instead of its
//! densest cluster. Histories are built once from everything published
//! before a cutoff, then merged incrementally as new articles arrive, gated by
//! a per-pair watermark so no article window is considered twice.
//!
//! # Architecture
//!
//! - **Storage**: SQLite holding the article graph (articles, channels,
//!   topics, subscriptions) and the persisted histories
//! - **Selection**: greedy max-min (farthest-point) selection over cosine
//!   distances between precomputed embeddings
//! - **Concurrency**: snapshot, select outside the write lock, then commit
//!   with a re-check; lost races are retried a bounded number of times
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization, schema, migrations, and health checks
//! - [`catalog`] — Article, topic, user and subscription ingest
//! - [`history`] — Diversity selection, watermarks, merge and read
//! - [`error`] — Engine error type
//! - [`timestamp`] — Timestamp parsing and storage encoding

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod timestamp;
