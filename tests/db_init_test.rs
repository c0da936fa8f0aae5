mod helpers;

use chronicle::db;
use chronicle::history::watermark::get_watermark;
use helpers::*;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    assert!(!db_path.exists());

    let conn = db::open_database(&db_path, Duration::from_secs(5)).unwrap();

    assert!(db_path.exists());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn health_check_passes_on_fresh_db() {
    let conn = db::open_memory_database().unwrap();
    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(report.embedding_dimension, None);
    assert_eq!(report.article_count, 0);
    assert_eq!(report.history_entry_count, 0);
    assert_eq!(report.log_count, 0);
}

#[test]
fn busy_timeout_comes_from_caller() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("test.db");

    let conn = db::open_database(&db_path, Duration::from_millis(1234)).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 1234);
}

#[test]
fn wal_mode_is_enabled() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("wal.db"), Duration::from_secs(5)).unwrap();
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn histories_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("history.db");

    {
        let mut conn = db::open_database(&db_path, Duration::from_secs(5)).unwrap();
        chronicle::catalog::subscriptions::subscribe(
            &mut conn,
            "u1",
            "RL",
            chronicle::catalog::types::Level::Beginner,
        )
        .unwrap();
        insert_article(&mut conn, "a", day(1), test_embedding(0));
        merger(3).populate(&mut conn, "u1", "RL", day(5)).unwrap();
    }

    let conn = db::open_database(&db_path, Duration::from_secs(5)).unwrap();
    assert_eq!(get_watermark(&conn, "u1", "RL").unwrap(), day(5));
    assert_eq!(history_links(&conn), vec!["a"]);

    let report = db::check_database_health(&conn).unwrap();
    assert_eq!(report.watermark_count, 1);
    assert_eq!(report.log_count, 1);
}
