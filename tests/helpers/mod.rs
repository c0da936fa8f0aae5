#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use chronicle::catalog::articles::upsert_article;
use chronicle::catalog::subscriptions::subscribe;
use chronicle::catalog::types::{Level, NewArticle};
use chronicle::config::HistoryConfig;
use chronicle::history::HistoryMerger;
use rusqlite::Connection;

/// Embedding dimension used throughout the integration tests.
pub const DIM: usize = 16;

/// Open a fresh in-memory database with schema and migrations applied, and
/// subscribe `u1` to `RL`.
pub fn test_db() -> Connection {
    let mut conn = chronicle::db::open_memory_database().unwrap();
    subscribe(&mut conn, "u1", "RL", Level::Intermediate).unwrap();
    conn
}

/// Noon UTC on the given day of January 2025.
pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, d, 12, 0, 0).unwrap()
}

/// Deterministic embedding with a spike at position `seed`.
/// Distinct seeds below `DIM / 2` are orthogonal.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

/// A near-duplicate of `test_embedding(seed)`; `variant` picks the
/// perturbation so that several members of one cluster stay distinct.
pub fn cluster_member(seed: usize, variant: usize) -> Vec<f32> {
    let mut v = test_embedding(seed);
    v[DIM / 2 + (seed + variant) % (DIM / 2)] += 0.05 * (variant as f32 + 1.0);
    v
}

pub fn merger(capacity: usize) -> HistoryMerger {
    HistoryMerger::new(&HistoryConfig {
        capacity,
        ..HistoryConfig::default()
    })
}

/// Ingest an article related to `RL`.
pub fn insert_article(conn: &mut Connection, link: &str, pub_date: DateTime<Utc>, embedding: Vec<f32>) {
    let article = NewArticle {
        link: link.to_string(),
        title: Some(format!("Article {link}")),
        description: None,
        pub_date,
        channel: Some("arXiv".to_string()),
        topics: vec!["RL".to_string()],
        embedding,
    };
    upsert_article(conn, &article, DIM).unwrap();
}

/// Retained links of `u1`/`RL`, sorted.
pub fn history_links(conn: &Connection) -> Vec<String> {
    let mut links: Vec<String> = chronicle::history::reader::read(conn, "u1", "RL")
        .unwrap()
        .into_iter()
        .map(|r| r.link)
        .collect();
    links.sort();
    links
}
