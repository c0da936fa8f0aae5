use anyhow::{bail, Context, Result};
use std::io::BufReader;
use std::path::Path;

use chronicle::catalog::import::import_jsonl;
use chronicle::config::ChronicleConfig;
use chronicle::db::migrations::{get_embedding_dimension, set_embedding_dimension};

/// Import articles from a JSON-lines file.
///
/// Each line carries a precomputed embedding. Links that already exist keep
/// their stored fields; only new topic links are merged.
pub fn import(config: &ChronicleConfig, file: &Path) -> Result<()> {
    let handle = std::fs::File::open(file)
        .with_context(|| format!("failed to open import file: {}", file.display()))?;

    let mut conn = super::open_db(config)?;

    let dimension = config.embedding.dimension;
    match get_embedding_dimension(&conn)? {
        Some(stored) if stored != dimension => bail!(
            "database stores {stored}-dimensional embeddings but embedding.dimension is {dimension}"
        ),
        Some(_) => {}
        // The first import records the configured dimension.
        None => set_embedding_dimension(&conn, dimension)?,
    }

    println!("Importing articles from {}...", file.display());
    let report = import_jsonl(&mut conn, BufReader::new(handle), dimension)?;

    for (line, reason) in &report.failures {
        eprintln!("Warning: line {line} skipped: {reason}");
    }

    println!("Import complete:");
    println!("  Articles imported: {}", report.imported);
    println!("  Already present:   {}", report.existing);
    println!("  Topic links added: {}", report.topics_linked);
    if !report.failures.is_empty() {
        println!("  Lines rejected:    {}", report.failures.len());
    }

    Ok(())
}
