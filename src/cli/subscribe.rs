//! CLI `subscribe` / `unsubscribe` commands.

use anyhow::Result;

use chronicle::catalog::subscriptions;
use chronicle::catalog::types::Level;
use chronicle::config::ChronicleConfig;

pub fn subscribe(
    config: &ChronicleConfig,
    user: &str,
    topic: &str,
    level: Level,
    name: Option<&str>,
    keywords: &[String],
) -> Result<()> {
    let mut conn = super::open_db(config)?;
    if name.is_some() {
        subscriptions::upsert_user(&conn, user, name, None)?;
    }
    if !keywords.is_empty() {
        subscriptions::upsert_topic(&conn, topic, keywords)?;
    }
    let result = subscriptions::subscribe(&mut conn, user, topic, level)?;

    if result.created {
        println!("Subscribed {} to {} ({})", result.user_id, result.topic, result.level);
    } else {
        println!("Updated {} on {} to {}", result.user_id, result.topic, result.level);
    }

    println!();
    println!("Subscriptions for {user}:");
    for sub in subscriptions::list_subscriptions(&conn, user)? {
        println!("  {:<30} {}", sub.topic, sub.level);
    }
    Ok(())
}

pub fn unsubscribe(config: &ChronicleConfig, user: &str, topic: &str) -> Result<()> {
    let conn = super::open_db(config)?;
    if subscriptions::unsubscribe(&conn, user, topic)? {
        println!("Unsubscribed {user} from {topic}");
    } else {
        println!("{user} was not subscribed to {topic}");
    }
    Ok(())
}
