use anyhow::Result;

use chronicle::config::ChronicleConfig;
use chronicle::history::store::pair_summaries;

/// Display every populated (user, topic) pair with its watermark and size.
pub fn stats(config: &ChronicleConfig) -> Result<()> {
    let conn = super::open_db(config)?;
    let report = chronicle::db::check_database_health(&conn)?;
    let pairs = pair_summaries(&conn)?;

    println!("History Statistics");
    println!("{}", "=".repeat(40));
    println!("  Articles:            {}", report.article_count);
    println!("  Topics:              {}", report.topic_count);
    println!("  Users:               {}", report.user_count);
    println!("  Populated pairs:     {}", pairs.len());
    println!("  Retained entries:    {}", report.history_entry_count);
    println!("  Capacity (K):        {}", config.history.capacity);
    println!();

    if pairs.is_empty() {
        return Ok(());
    }

    println!("{:<20} {:<28} {:>7}  Watermark", "User", "Topic", "Entries");
    for pair in &pairs {
        println!(
            "{:<20} {:<28} {:>7}  {}",
            pair.user_id,
            pair.topic,
            pair.entries,
            pair.watermark.to_rfc3339()
        );
    }

    Ok(())
}
