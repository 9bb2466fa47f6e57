//! Durable recall of prior diagnoses, backed by an embedded SQLite database.
//!
//! The store is optional at every call site: the orchestrator proceeds
//! unaffected when it is unavailable, mirroring the teacher's `CheckCache`
//! convention of a cache that degrades to "miss everything" rather than
//! failing the run it supports.

use std::path::Path;
use std::sync::Mutex;

use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{MemoryEntry, RepoStats, Severity};

/// Length of the snippet prefix used for LIKE-based similarity lookup.
const RECALL_PREFIX_LEN: usize = 100;

fn severity_to_str(s: Severity) -> &'static str {
    match s {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

fn severity_from_str(s: &str) -> Severity {
    match s {
        "high" => Severity::High,
        "critical" => Severity::Critical,
        "low" => Severity::Low,
        _ => Severity::Medium,
    }
}

/// A SQLite-backed table of past diagnoses, one connection per instance.
pub struct MemoryStore {
    conn: Mutex<Connection>,
}

impl MemoryStore {
    /// Open (creating if necessary) the store at `path`, running schema
    /// bootstrap and the `repo_id` migration idempotently.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// An in-memory store, useful for tests and for callers that want
    /// recall within a process but no durability.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                language TEXT NOT NULL,
                tb_hash TEXT NOT NULL UNIQUE,
                snippet TEXT NOT NULL,
                severity TEXT NOT NULL,
                tier INTEGER NOT NULL,
                root_cause TEXT NOT NULL,
                suggested_fix TEXT NOT NULL,
                confidence REAL NOT NULL,
                success INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analyses_hash ON analyses(tb_hash);
            CREATE INDEX IF NOT EXISTS idx_analyses_snippet ON analyses(snippet);
            CREATE INDEX IF NOT EXISTS idx_analyses_timestamp ON analyses(timestamp);",
        )?;
        Self::migrate_repo_id(conn)?;
        Ok(())
    }

    /// Add the `repo_id` column to a pre-existing table that predates it.
    fn migrate_repo_id(conn: &Connection) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare("PRAGMA table_info(analyses)")?;
        let has_repo_id = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(Result::ok)
            .any(|name| name == "repo_id");
        drop(stmt);

        if !has_repo_id {
            debug!("migrating analyses table: adding repo_id column");
            conn.execute("ALTER TABLE analyses ADD COLUMN repo_id TEXT", [])?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_analyses_repo ON analyses(repo_id)",
                [],
            )?;
        }
        Ok(())
    }

    /// Up to `k` entries whose snippet shares the first [`RECALL_PREFIX_LEN`]
    /// bytes with `snippet`, ordered by repo affinity then recency.
    pub fn recall(&self, snippet: &str, repo_id: Option<&str>, k: u32) -> Vec<MemoryEntry> {
        let prefix: String = snippet.chars().take(RECALL_PREFIX_LEN).collect();
        let like_pattern = format!("{prefix}%");
        let conn = self.conn.lock().unwrap();

        let query = "SELECT id, timestamp, language, tb_hash, snippet, severity, tier,
                            root_cause, suggested_fix, confidence, success, repo_id
                     FROM analyses
                     WHERE snippet LIKE ?1
                     ORDER BY (CASE WHEN repo_id = ?2 THEN 0 WHEN repo_id IS NULL THEN 1 ELSE 2 END),
                              timestamp DESC
                     LIMIT ?3";

        let mut stmt = match conn.prepare(query) {
            Ok(s) => s,
            Err(e) => {
                warn!("memory recall query failed to prepare: {e}");
                return Vec::new();
            }
        };

        let rows = stmt.query_map(params![like_pattern, repo_id, k], |row| {
            Ok(MemoryEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                language: row.get(2)?,
                fingerprint: row.get(3)?,
                snippet: row.get(4)?,
                severity: severity_from_str(&row.get::<_, String>(5)?),
                tier: row.get::<_, i64>(6)? as u8,
                root_cause: row.get(7)?,
                suggested_fix: row.get(8)?,
                confidence: row.get(9)?,
                success: row.get::<_, i64>(10)? != 0,
                repo_id: row.get(11)?,
            })
        });

        match rows {
            Ok(mapped) => mapped.filter_map(Result::ok).collect(),
            Err(e) => {
                warn!("memory recall query failed to execute: {e}");
                Vec::new()
            }
        }
    }

    /// Insert a new entry. Returns `false` without error when `fingerprint`
    /// already exists (the uniqueness constraint on `tb_hash`).
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        language: &str,
        fingerprint: &str,
        snippet: &str,
        severity: Severity,
        tier: u8,
        root_cause: &str,
        suggested_fix: &str,
        confidence: f64,
        success: bool,
        repo_id: Option<&str>,
    ) -> bool {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO analyses
                (timestamp, language, tb_hash, snippet, severity, tier, root_cause, suggested_fix, confidence, success, repo_id)
             VALUES (datetime('now'), ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                language,
                fingerprint,
                snippet,
                severity_to_str(severity),
                tier as i64,
                root_cause,
                suggested_fix,
                confidence,
                success as i64,
                repo_id,
            ],
        );

        match result {
            Ok(_) => true,
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => false,
            Err(e) => {
                warn!("memory record insert failed: {e}");
                false
            }
        }
    }

    /// Aggregate stats across all entries, optionally filtered by `repo_id`.
    pub fn repo_stats(&self, repo_id: Option<&str>) -> RepoStats {
        let conn = self.conn.lock().unwrap();

        let (count, avg_confidence, successes): (i64, Option<f64>, i64) = conn
            .query_row(
                "SELECT COUNT(*), AVG(confidence), SUM(success)
                 FROM analyses
                 WHERE (?1 IS NULL AND repo_id IS NULL) OR repo_id = ?1",
                params![repo_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, Option<i64>>(2)?.unwrap_or(0))),
            )
            .unwrap_or((0, None, 0));

        let severities: Vec<String> = conn
            .prepare(
                "SELECT DISTINCT severity FROM analyses
                 WHERE (?1 IS NULL AND repo_id IS NULL) OR repo_id = ?1",
            )
            .and_then(|mut stmt| {
                let rows = stmt.query_map(params![repo_id], |row| row.get::<_, String>(0))?;
                Ok(rows.filter_map(Result::ok).collect())
            })
            .unwrap_or_default();

        RepoStats {
            total_analyses: count.max(0) as u32,
            avg_confidence: avg_confidence.unwrap_or(0.0),
            successful_fixes: successes.max(0) as u32,
            severities,
            success_rate: if count > 0 { successes as f64 / count as f64 } else { 0.0 },
        }
    }

    /// Does `fingerprint` already exist? Used by callers to skip the insert
    /// attempt (the store itself treats the unique constraint as authoritative).
    pub fn contains(&self, fingerprint: &str) -> bool {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT 1 FROM analyses WHERE tb_hash = ?1",
            params![fingerprint],
            |_| Ok(()),
        )
        .optional()
        .unwrap_or(None)
        .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_recall_roundtrip() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert!(store.record("python", "fp1", "File \"a.py\", line 1", Severity::Medium, 2, "cause", "fix", 0.6, false, None));
        let recalled = store.recall("File \"a.py\", line 1", None, 3);
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].fingerprint, "fp1");
    }

    #[test]
    fn duplicate_fingerprint_does_not_error() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert!(store.record("python", "fp1", "snippet", Severity::Low, 1, "c", "f", 0.5, false, None));
        assert!(!store.record("python", "fp1", "snippet", Severity::Low, 1, "c", "f", 0.5, false, None));
    }

    #[test]
    fn repo_affinity_orders_matching_repo_first() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.record("python", "fp-a", "File \"a.py\", line 1", Severity::Medium, 2, "c", "f", 0.5, false, Some("other-repo"));
        store.record("python", "fp-b", "File \"a.py\", line 1", Severity::Medium, 2, "c", "f", 0.5, false, Some("my-repo"));
        let recalled = store.recall("File \"a.py\", line 1", Some("my-repo"), 5);
        assert_eq!(recalled[0].fingerprint, "fp-b");
    }

    #[test]
    fn repo_stats_aggregate() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.record("python", "fp1", "s", Severity::Medium, 2, "c", "f", 0.8, true, Some("r1"));
        store.record("python", "fp2", "s2", Severity::High, 3, "c", "f", 0.6, false, Some("r1"));
        let stats = store.repo_stats(Some("r1"));
        assert_eq!(stats.total_analyses, 2);
        assert_eq!(stats.successful_fixes, 1);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let store = MemoryStore::open_in_memory().unwrap();
        MemoryStore::init_schema(&store.conn.lock().unwrap()).unwrap();
    }
}
