//! Initial population and incremental merge of a (user, topic) history.
//!
//! Both operations follow the same three steps:
//!
//! 1. **Snapshot**: read the watermark, the retained history and the
//!    articles in the eligibility window.
//! 2. **Select**: run the diversity selector over the pool. Pure and
//!    CPU-bound, it holds no store lock.
//! 3. **Commit**: hand the full replacement set to
//!    [`GraphStore::write_history`], which re-verifies the snapshot under the
//!    write lock. If another writer got there first the snapshot is stale and
//!    the whole cycle repeats, up to `max_retries` more times.
//!
//! A single deadline spans every attempt. Nothing is visible to readers
//! until a commit succeeds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use super::select::{select, select_from_matrix};
use super::store::{CandidateArticle, CommitKind, CommitStatus, GraphStore, HistoryCommit, Window};
use super::vector::{min_pairwise_distance, pairwise_distance_matrix};
use super::watermark::get_watermark;
use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::timestamp::require_micros;

/// What a populate or merge call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    /// First population of the pair.
    Populated,
    /// New articles were considered and the history was recomputed.
    Updated,
    /// No new articles in the window; the history set is the same.
    Unchanged,
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Populated => "populated",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        })
    }
}

/// Result of [`HistoryMerger::populate`] and [`HistoryMerger::merge`].
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub status: MergeStatus,
    pub user: String,
    pub topic: String,
    /// Watermark after the call.
    pub watermark: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_watermark: Option<DateTime<Utc>>,
    /// `false` only when the call replayed an already-merged `asOf`.
    pub committed: bool,
    /// Number of candidates the selector saw.
    pub pool_size: usize,
    /// Retained article links, in selection order.
    pub selected: Vec<String>,
    /// Links that entered the history in this call.
    pub admitted: Vec<String>,
    /// Links that left the history in this call.
    pub evicted: Vec<String>,
    pub attempts: u32,
}

/// Orchestrates populate/merge against a [`GraphStore`].
#[derive(Debug, Clone)]
pub struct HistoryMerger {
    capacity: usize,
    timeout: Duration,
    max_retries: u32,
    pool_warn_size: usize,
}

/// The parts of an outcome that differ between operations.
struct Plan {
    kind: CommitKind,
    window: Window,
    window_count: usize,
    pool_size: usize,
    selected: Vec<String>,
    admitted: Vec<String>,
    evicted: Vec<String>,
}

impl HistoryMerger {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            capacity: config.capacity,
            timeout: config.store_timeout(),
            max_retries: config.max_retries,
            pool_warn_size: config.pool_warn_size,
        }
    }

    /// K, the history bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Populate an uninitialized pair from every eligible article published
    /// strictly before `cutoff`. An empty pool commits an empty history with
    /// watermark `cutoff`.
    pub fn populate<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        user: &str,
        topic: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        self.validate(user, topic)?;
        let cutoff = require_micros(cutoff)?;
        let deadline = Instant::now() + self.timeout;

        self.with_retries(user, topic, |store_ref: &mut S| {
            store_ref.check_pair(user, topic)?;
            if store_ref.read_watermark(user, topic)?.is_some() {
                return Err(HistoryError::AlreadyInitialized {
                    user: user.to_string(),
                    topic: topic.to_string(),
                });
            }

            let window = Window::Before(cutoff);
            let pool = store_ref.query_eligible_articles(user, topic, window)?;
            check_deadline(deadline)?;

            let picked = self.pick(&pool, user, topic)?;
            let selected: Vec<String> = picked.iter().map(|&i| pool[i].link.clone()).collect();
            let plan = Plan {
                kind: CommitKind::Populate,
                window,
                window_count: pool.len(),
                pool_size: pool.len(),
                admitted: selected.clone(),
                selected,
                evicted: Vec::new(),
            };
            self.commit(store_ref, user, topic, None, cutoff, plan, deadline)
        }, store)
    }

    /// Merge articles published in `(watermark, as_of]` into a populated
    /// pair's history.
    ///
    /// The candidate pool is the retained history followed by the new
    /// arrivals; the selection replaces the history wholesale. With no new
    /// arrivals the set is kept and only the watermark advances. Replaying the
    /// current watermark is a no-op that commits nothing.
    pub fn merge<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        user: &str,
        topic: &str,
        as_of: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        self.validate(user, topic)?;
        let as_of = require_micros(as_of)?;
        let deadline = Instant::now() + self.timeout;

        self.with_retries(user, topic, |store_ref: &mut S| {
            store_ref.check_pair(user, topic)?;
            let watermark = get_watermark(&*store_ref, user, topic)?;
            if as_of < watermark {
                return Err(HistoryError::invalid(format!(
                    "asOf {as_of} is before the current watermark {watermark}"
                )));
            }

            let mut retained: Vec<CandidateArticle> = store_ref
                .read_history(user, topic)?
                .iter()
                .map(|record| record.to_candidate())
                .collect();
            retained.sort_by(|a, b| a.pub_date.cmp(&b.pub_date).then_with(|| a.link.cmp(&b.link)));

            if as_of == watermark {
                tracing::debug!(user, topic, %watermark, "merge replays the current watermark");
                return Ok(Some(MergeOutcome {
                    status: MergeStatus::Unchanged,
                    user: user.to_string(),
                    topic: topic.to_string(),
                    watermark,
                    previous_watermark: Some(watermark),
                    committed: false,
                    pool_size: retained.len(),
                    selected: retained.into_iter().map(|a| a.link).collect(),
                    admitted: Vec::new(),
                    evicted: Vec::new(),
                    attempts: 0,
                }));
            }

            let window = Window::Between {
                after: watermark,
                up_to: as_of,
            };
            let arrivals = store_ref.query_eligible_articles(user, topic, window)?;
            let window_count = arrivals.len();
            check_deadline(deadline)?;

            let fresh: Vec<CandidateArticle> = {
                let known: HashSet<&str> = retained.iter().map(|a| a.link.as_str()).collect();
                arrivals
                    .into_iter()
                    .filter(|a| !known.contains(a.link.as_str()))
                    .collect()
            };

            let plan = if fresh.is_empty() {
                Plan {
                    kind: CommitKind::Unchanged,
                    window,
                    window_count,
                    pool_size: retained.len(),
                    selected: retained.into_iter().map(|a| a.link).collect(),
                    admitted: Vec::new(),
                    evicted: Vec::new(),
                }
            } else {
                let retained_len = retained.len();
                let mut pool = retained;
                pool.extend(fresh);

                let picked = self.pick(&pool, user, topic)?;
                let chosen: HashSet<usize> = picked.iter().copied().collect();
                Plan {
                    kind: CommitKind::Merge,
                    window,
                    window_count,
                    pool_size: pool.len(),
                    selected: picked.iter().map(|&i| pool[i].link.clone()).collect(),
                    admitted: picked
                        .iter()
                        .filter(|&&i| i >= retained_len)
                        .map(|&i| pool[i].link.clone())
                        .collect(),
                    evicted: (0..retained_len)
                        .filter(|i| !chosen.contains(i))
                        .map(|i| pool[i].link.clone())
                        .collect(),
                }
            };
            self.commit(store_ref, user, topic, Some(watermark), as_of, plan, deadline)
        }, store)
    }

    fn validate(&self, user: &str, topic: &str) -> Result<()> {
        if user.trim().is_empty() {
            return Err(HistoryError::invalid("user id must not be empty"));
        }
        if topic.trim().is_empty() {
            return Err(HistoryError::invalid("topic must not be empty"));
        }
        if self.capacity == 0 {
            return Err(HistoryError::invalid("history capacity must be at least 1"));
        }
        Ok(())
    }

    /// Run the diversity selector over a candidate pool.
    fn pick(&self, pool: &[CandidateArticle], user: &str, topic: &str) -> Result<Vec<usize>> {
        if pool.len() > self.pool_warn_size {
            tracing::warn!(
                user,
                topic,
                pool = pool.len(),
                limit = self.pool_warn_size,
                "candidate pool is large; selection cost grows quadratically"
            );
        }

        let embeddings: Vec<&[f32]> = pool.iter().map(|a| a.embedding.as_slice()).collect();
        if pool.len() <= self.capacity {
            return select(&embeddings, self.capacity);
        }

        let matrix = pairwise_distance_matrix(&embeddings)?;
        let picked = select_from_matrix(&matrix, self.capacity);
        tracing::debug!(
            user,
            topic,
            pool = pool.len(),
            selected = picked.len(),
            spread = min_pairwise_distance(&matrix, &picked).unwrap_or(0.0),
            "diversity selection complete"
        );
        Ok(picked)
    }

    #[allow(clippy::too_many_arguments)]
    fn commit<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        user: &str,
        topic: &str,
        previous: Option<DateTime<Utc>>,
        watermark: DateTime<Utc>,
        plan: Plan,
        deadline: Instant,
    ) -> Result<Option<MergeOutcome>> {
        let details = serde_json::json!({
            "pool": plan.pool_size,
            "selected": plan.selected.len(),
            "admitted": plan.admitted,
            "evicted": plan.evicted,
        });
        let status = store.write_history(&HistoryCommit {
            user,
            topic,
            kind: plan.kind,
            selected: &plan.selected,
            watermark,
            expected_watermark: previous,
            window: plan.window,
            window_count: plan.window_count,
            details,
            deadline,
        })?;
        if status == CommitStatus::Stale {
            return Ok(None);
        }

        let status = match plan.kind {
            CommitKind::Populate => MergeStatus::Populated,
            CommitKind::Merge => MergeStatus::Updated,
            CommitKind::Unchanged => MergeStatus::Unchanged,
        };
        tracing::info!(
            user,
            topic,
            %status,
            %watermark,
            pool = plan.pool_size,
            selected = plan.selected.len(),
            admitted = plan.admitted.len(),
            evicted = plan.evicted.len(),
            "history committed"
        );

        Ok(Some(MergeOutcome {
            status,
            user: user.to_string(),
            topic: topic.to_string(),
            watermark,
            previous_watermark: previous,
            committed: true,
            pool_size: plan.pool_size,
            selected: plan.selected,
            admitted: plan.admitted,
            evicted: plan.evicted,
            attempts: 0,
        }))
    }

    /// Repeat `attempt` while it reports a stale snapshot (`Ok(None)`).
    fn with_retries<S, F>(&self, user: &str, topic: &str, mut attempt: F, store: &mut S) -> Result<MergeOutcome>
    where
        S: ?Sized,
        F: FnMut(&mut S) -> Result<Option<MergeOutcome>>,
    {
        let allowed = self.max_retries.saturating_add(1);
        for n in 1..=allowed {
            if let Some(mut outcome) = attempt(&mut *store)? {
                outcome.attempts = n;
                return Ok(outcome);
            }
            tracing::debug!(user, topic, attempt = n, "snapshot went stale before commit, retrying");
        }
        tracing::warn!(user, topic, attempts = allowed, "giving up after repeated commit conflicts");
        Err(HistoryError::Conflict { attempts: allowed })
    }
}

fn check_deadline(deadline: Instant) -> Result<()> {
    if Instant::now() >= deadline {
        return Err(HistoryError::StoreTimeout);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::articles::upsert_article;
    use crate::catalog::subscriptions::subscribe;
    use crate::catalog::types::{Level, NewArticle};
    use crate::history::store::HistoryRecord;
    use chrono::TimeZone;
    use rusqlite::Connection;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, d, 12, 0, 0).unwrap()
    }

    fn merger(capacity: usize) -> HistoryMerger {
        HistoryMerger::new(&HistoryConfig {
            capacity,
            ..HistoryConfig::default()
        })
    }

    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        v[i % 8] = 1.0;
        v
    }

    fn add_article(conn: &mut Connection, link: &str, pub_date: DateTime<Utc>, embedding: Vec<f32>) {
        let article = NewArticle {
            link: link.to_string(),
            title: None,
            description: None,
            pub_date,
            channel: None,
            topics: vec!["RL".to_string()],
            embedding,
        };
        upsert_article(conn, &article, 8).unwrap();
    }

    fn test_db() -> Connection {
        let mut conn = crate::db::open_memory_database().unwrap();
        subscribe(&mut conn, "u1", "RL", Level::Intermediate).unwrap();
        conn
    }

    fn links(conn: &Connection) -> Vec<String> {
        let mut links: Vec<String> = conn
            .read_history("u1", "RL")
            .unwrap()
            .into_iter()
            .map(|r| r.link)
            .collect();
        links.sort();
        links
    }

    /// Reports the first `stale_commits` commits as lost races.
    struct RacingStore {
        inner: Connection,
        stale_commits: u32,
    }

    impl GraphStore for RacingStore {
        fn check_pair(&self, user: &str, topic: &str) -> Result<()> {
            self.inner.check_pair(user, topic)
        }
        fn query_eligible_articles(&self, user: &str, topic: &str, window: Window) -> Result<Vec<CandidateArticle>> {
            self.inner.query_eligible_articles(user, topic, window)
        }
        fn read_history(&self, user: &str, topic: &str) -> Result<Vec<HistoryRecord>> {
            self.inner.read_history(user, topic)
        }
        fn read_watermark(&self, user: &str, topic: &str) -> Result<Option<DateTime<Utc>>> {
            self.inner.read_watermark(user, topic)
        }
        fn write_history(&mut self, commit: &HistoryCommit<'_>) -> Result<CommitStatus> {
            if self.stale_commits > 0 {
                self.stale_commits -= 1;
                return Ok(CommitStatus::Stale);
            }
            self.inner.write_history(commit)
        }
    }

    #[test]
    fn populate_empty_pool_commits_cutoff() {
        let mut conn = test_db();
        let outcome = merger(3).populate(&mut conn, "u1", "RL", day(10)).unwrap();
        assert_eq!(outcome.status, MergeStatus::Populated);
        assert!(outcome.selected.is_empty());
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), Some(day(10)));
        assert!(links(&conn).is_empty());
    }

    #[test]
    fn populate_small_pool_keeps_everything() {
        let mut conn = test_db();
        add_article(&mut conn, "a", day(1), axis(0));
        add_article(&mut conn, "b", day(2), axis(0));
        let outcome = merger(3).populate(&mut conn, "u1", "RL", day(10)).unwrap();
        assert_eq!(outcome.selected, vec!["a", "b"]);
        assert_eq!(outcome.admitted.len(), 2);
        assert_eq!(links(&conn), vec!["a", "b"]);
    }

    #[test]
    fn populate_excludes_articles_at_or_after_cutoff() {
        let mut conn = test_db();
        add_article(&mut conn, "a", day(1), axis(0));
        add_article(&mut conn, "b", day(10), axis(1));
        merger(3).populate(&mut conn, "u1", "RL", day(10)).unwrap();
        assert_eq!(links(&conn), vec!["a"]);
    }

    #[test]
    fn populate_bounds_history() {
        let mut conn = test_db();
        for i in 0..8 {
            add_article(&mut conn, &format!("a{i}"), day(1 + i as u32), axis(i));
        }
        let outcome = merger(3).populate(&mut conn, "u1", "RL", day(20)).unwrap();
        assert_eq!(outcome.pool_size, 8);
        assert_eq!(outcome.selected.len(), 3);
        assert_eq!(links(&conn).len(), 3);
    }

    #[test]
    fn populate_twice_is_rejected() {
        let mut conn = test_db();
        merger(3).populate(&mut conn, "u1", "RL", day(10)).unwrap();
        let err = merger(3).populate(&mut conn, "u1", "RL", day(11)).unwrap_err();
        assert!(matches!(err, HistoryError::AlreadyInitialized { .. }));
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), Some(day(10)));
    }

    #[test]
    fn unknown_pair_is_not_found() {
        let mut conn = test_db();
        let err = merger(3).populate(&mut conn, "ghost", "RL", day(10)).unwrap_err();
        assert!(matches!(err, HistoryError::NotFound(_)));
    }

    #[test]
    fn blank_names_are_invalid_before_touching_store() {
        let mut conn = test_db();
        let err = merger(3).merge(&mut conn, " ", "RL", day(10)).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidInput(_)));
    }

    #[test]
    fn merge_requires_population() {
        let mut conn = test_db();
        let err = merger(3).merge(&mut conn, "u1", "RL", day(10)).unwrap_err();
        assert!(matches!(err, HistoryError::NotFound(_)));
    }

    #[test]
    fn merge_rejects_going_backwards() {
        let mut conn = test_db();
        merger(3).populate(&mut conn, "u1", "RL", day(10)).unwrap();
        let err = merger(3).merge(&mut conn, "u1", "RL", day(5)).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidInput(_)));
    }

    #[test]
    fn merge_without_arrivals_is_unchanged_but_advances() {
        let mut conn = test_db();
        add_article(&mut conn, "a", day(1), axis(0));
        merger(3).populate(&mut conn, "u1", "RL", day(10)).unwrap();

        let outcome = merger(3).merge(&mut conn, "u1", "RL", day(12)).unwrap();
        assert_eq!(outcome.status, MergeStatus::Unchanged);
        assert!(outcome.committed);
        assert_eq!(outcome.previous_watermark, Some(day(10)));
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), Some(day(12)));

        let history = conn.read_history("u1", "RL").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].last_queried_at, day(12));
    }

    #[test]
    fn merge_replaces_set_and_reports_evictions() {
        let mut conn = test_db();
        // Two near-duplicates along axis 0 fill a capacity-2 history.
        add_article(&mut conn, "old-a", day(1), vec![1.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        add_article(&mut conn, "old-b", day(2), vec![1.0, 0.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0]);
        merger(2).populate(&mut conn, "u1", "RL", day(10)).unwrap();
        assert_eq!(links(&conn), vec!["old-a", "old-b"]);

        // An orthogonal arrival must displace one of the duplicates.
        add_article(&mut conn, "new-c", day(11), axis(5));
        let outcome = merger(2).merge(&mut conn, "u1", "RL", day(12)).unwrap();
        assert_eq!(outcome.status, MergeStatus::Updated);
        assert_eq!(outcome.pool_size, 3);
        assert_eq!(outcome.admitted, vec!["new-c"]);
        assert_eq!(outcome.evicted.len(), 1);

        let now = links(&conn);
        assert_eq!(now.len(), 2);
        assert!(now.contains(&"new-c".to_string()));
        assert!(!now.contains(&outcome.evicted[0]));
        for record in conn.read_history("u1", "RL").unwrap() {
            assert_eq!(record.last_queried_at, day(12));
        }
    }

    #[test]
    fn replaying_watermark_commits_nothing() {
        let mut conn = test_db();
        add_article(&mut conn, "a", day(1), axis(0));
        merger(3).populate(&mut conn, "u1", "RL", day(10)).unwrap();
        merger(3).merge(&mut conn, "u1", "RL", day(12)).unwrap();

        let replay = merger(3).merge(&mut conn, "u1", "RL", day(12)).unwrap();
        assert_eq!(replay.status, MergeStatus::Unchanged);
        assert!(!replay.committed);
        assert_eq!(replay.selected, vec!["a"]);
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), Some(day(12)));
    }

    #[test]
    fn lost_races_are_retried() {
        let mut store = RacingStore {
            inner: test_db(),
            stale_commits: 2,
        };
        add_article(&mut store.inner, "a", day(1), axis(0));
        let outcome = merger(3).populate(&mut store, "u1", "RL", day(10)).unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(links(&store.inner), vec!["a"]);
    }

    #[test]
    fn exhausted_retries_surface_conflict() {
        let mut store = RacingStore {
            inner: test_db(),
            stale_commits: 100,
        };
        let err = merger(3).populate(&mut store, "u1", "RL", day(10)).unwrap_err();
        assert!(matches!(err, HistoryError::Conflict { attempts: 4 }));
        assert_eq!(store.inner.read_watermark("u1", "RL").unwrap(), None);
    }

    #[test]
    fn expired_deadline_leaves_no_trace() {
        let mut conn = test_db();
        add_article(&mut conn, "a", day(1), axis(0));
        let merger = HistoryMerger::new(&HistoryConfig {
            capacity: 3,
            store_timeout_ms: 0,
            ..HistoryConfig::default()
        });
        let err = merger.populate(&mut conn, "u1", "RL", day(10)).unwrap_err();
        assert!(matches!(err, HistoryError::StoreTimeout));
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), None);
        assert!(links(&conn).is_empty());
    }

    #[test]
    fn sub_microsecond_as_of_is_rejected_and_watermark_untouched() {
        let mut conn = test_db();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        merger(3).populate(&mut conn, "u1", "RL", t0).unwrap();

        let nudged = t0 + chrono::Duration::nanoseconds(300);
        let err = merger(3).merge(&mut conn, "u1", "RL", nudged).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidInput(_)));
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), Some(t0));

        // One whole microsecond later is a real advance, and replaying it is not.
        let next = t0 + chrono::Duration::microseconds(1);
        let advanced = merger(3).merge(&mut conn, "u1", "RL", next).unwrap();
        assert!(advanced.committed);
        assert_eq!(advanced.watermark, next);
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), Some(next));

        let replay = merger(3).merge(&mut conn, "u1", "RL", next).unwrap();
        assert!(!replay.committed);
    }

    #[test]
    fn sub_microsecond_cutoff_is_rejected_before_population() {
        let mut conn = test_db();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        let err = merger(3)
            .populate(&mut conn, "u1", "RL", t0 + chrono::Duration::nanoseconds(900))
            .unwrap_err();
        assert!(matches!(err, HistoryError::InvalidInput(_)));
        assert_eq!(conn.read_watermark("u1", "RL").unwrap(), None);
    }

    #[test]
    fn article_one_microsecond_before_cutoff_is_eligible() {
        let mut conn = test_db();
        let cutoff = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        add_article(&mut conn, "edge", cutoff - chrono::Duration::microseconds(1), axis(0));
        add_article(&mut conn, "at-cutoff", cutoff, axis(1));

        let outcome = merger(3).populate(&mut conn, "u1", "RL", cutoff).unwrap();
        assert_eq!(outcome.selected, vec!["edge"]);
    }
}
