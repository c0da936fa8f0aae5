//! CLI `populate`, `merge` and `show` commands.

use anyhow::Result;

use chronicle::config::ChronicleConfig;
use chronicle::history::store::recent_log;
use chronicle::history::{reader, HistoryMerger, MergeOutcome};
use chronicle::timestamp::parse_timestamp;

pub fn populate(config: &ChronicleConfig, user: &str, topic: &str, cutoff: &str) -> Result<()> {
    let cutoff = parse_timestamp(cutoff)?;
    let mut conn = super::open_db(config)?;
    let outcome = HistoryMerger::new(&config.history).populate(&mut conn, user, topic, cutoff)?;
    print_outcome(&outcome);
    Ok(())
}

pub fn merge(config: &ChronicleConfig, user: &str, topic: &str, as_of: &str) -> Result<()> {
    let as_of = parse_timestamp(as_of)?;
    let mut conn = super::open_db(config)?;
    let outcome = HistoryMerger::new(&config.history).merge(&mut conn, user, topic, as_of)?;
    print_outcome(&outcome);
    Ok(())
}

/// Show a pair's retained articles and, optionally, its recent operations.
pub fn show(config: &ChronicleConfig, user: &str, topic: &str, log: usize) -> Result<()> {
    let conn = super::open_db(config)?;
    let view = reader::view(&conn, user, topic)?;

    println!("History: {user} / {topic}");
    println!("{}", "=".repeat(50));
    match view.watermark {
        Some(ts) => println!("  Watermark:      {}", ts.to_rfc3339()),
        None => {
            println!("  Not populated yet. Run `chronicle populate {user} {topic:?} <cutoff>`.");
            return Ok(());
        }
    }
    println!("  Articles:       {} / {}", view.articles.len(), config.history.capacity);
    println!();

    for record in &view.articles {
        println!(
            "  {}  {}",
            record.pub_date.format("%Y-%m-%d"),
            record.title.as_deref().unwrap_or(&record.link)
        );
        if record.title.is_some() {
            println!("              {}", record.link);
        }
    }

    if log > 0 {
        let entries = recent_log(&conn, user, topic, log)?;
        if !entries.is_empty() {
            println!();
            println!("Recent operations:");
            for entry in entries {
                let details = entry.details.map(|d| d.to_string()).unwrap_or_default();
                println!(
                    "  {} [{}] watermark={} {}",
                    entry.created_at,
                    entry.operation,
                    entry.watermark.to_rfc3339(),
                    details
                );
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &MergeOutcome) {
    println!("{} / {}: {}", outcome.user, outcome.topic, outcome.status);
    if let Some(previous) = outcome.previous_watermark {
        println!("  Previous watermark: {}", previous.to_rfc3339());
    }
    println!("  Watermark:          {}", outcome.watermark.to_rfc3339());
    println!("  Candidates:         {}", outcome.pool_size);
    println!("  Retained:           {}", outcome.selected.len());
    println!("  Admitted:           {}", outcome.admitted.len());
    println!("  Evicted:            {}", outcome.evicted.len());
    if !outcome.committed {
        println!("  (already merged up to this time; nothing written)");
    }
}
