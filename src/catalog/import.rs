//! Batch ingest of articles from JSON lines, one [`NewArticle`] per line.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::io::BufRead;

use super::articles::upsert_article;
use super::types::NewArticle;

/// Counters from [`import_jsonl`].
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: u64,
    /// Lines whose link already existed; their topics were still merged.
    pub existing: u64,
    pub topics_linked: u64,
    /// `(line number, reason)` for every rejected line.
    pub failures: Vec<(usize, String)>,
}

/// Import every line of `reader`. Malformed or invalid lines are recorded in
/// the report and skipped; I/O errors abort the import.
pub fn import_jsonl<R: BufRead>(conn: &mut Connection, reader: R, dimension: usize) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let article: NewArticle = match serde_json::from_str(&line) {
            Ok(a) => a,
            Err(e) => {
                report.failures.push((line_no, format!("invalid JSON: {e}")));
                continue;
            }
        };

        match upsert_article(conn, &article, dimension) {
            Ok(result) => {
                if result.created {
                    report.imported += 1;
                } else {
                    report.existing += 1;
                }
                report.topics_linked += result.topics_linked as u64;
            }
            Err(e) => report.failures.push((line_no, e.to_string())),
        }
    }

    tracing::info!(
        imported = report.imported,
        existing = report.existing,
        failed = report.failures.len(),
        "article import finished"
    );
    Ok(report)
}
