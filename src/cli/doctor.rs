//! CLI `doctor` command — run database diagnostics and print a health report.

use anyhow::{Context, Result};

use chronicle::config::ChronicleConfig;
use chronicle::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &ChronicleConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `chronicle import <file>` or `chronicle serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path, config.storage.busy_timeout())
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("chronicle Health Report");
    println!("=======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Embedding dimension:");
    match report.embedding_dimension {
        Some(stored) => println!("  Stored:          {stored}"),
        None => println!("  Stored:          (not set)"),
    }
    println!("  Configured:      {}", config.embedding.dimension);
    if let Some(stored) = report.embedding_dimension {
        if stored != config.embedding.dimension {
            println!("  WARNING: dimension mismatch! Imports will be rejected until they agree.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Articles:        {}", report.article_count);
    println!("  Topics:          {}", report.topic_count);
    println!("  Users:           {}", report.user_count);
    println!("  History entries: {}", report.history_entry_count);
    println!("  Watermarks:      {}", report.watermark_count);
    println!("  Audit log:       {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db ~/.chronicle/history.db");
        println!("  2. Or re-import the article feed into a fresh database and repopulate histories.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
