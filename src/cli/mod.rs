pub mod doctor;
pub mod history;
pub mod import;
pub mod stats;
pub mod subscribe;

use anyhow::Result;
use chronicle::config::ChronicleConfig;
use rusqlite::Connection;

/// Open the configured database for a one-shot CLI command.
fn open_db(config: &ChronicleConfig) -> Result<Connection> {
    let db_path = config.resolved_db_path();
    chronicle::db::open_database(&db_path, config.storage.busy_timeout())
}
