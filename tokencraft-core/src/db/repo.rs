//! Database repository layer
//!
//! Profiles are stored as a JSON payload next to the two columns used for
//! compare-and-swap: `schema_version` and `cumulative_score`. Those columns
//! are authoritative over the same fields inside the payload.

use crate::error::{Error, Result};
use crate::progression::Evaluation;
use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets readers proceed while an evaluation is being written
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // Profile operations
    // ============================================

    /// Load the stored profile for `identity`.
    ///
    /// Returns `Ok(None)` when no profile exists and
    /// [`Error::ProfileUnreadable`] when the payload cannot be decoded.
    pub fn load_profile(&self, identity: &str) -> Result<Option<UserProfile>> {
        let conn = self.lock();
        let row: Option<(u32, f64, String)> = conn
            .query_row(
                "SELECT schema_version, cumulative_score, payload FROM profiles WHERE identity = ?",
                [identity],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((schema_version, cumulative_score, payload)) = row else {
            return Ok(None);
        };

        let mut profile: UserProfile =
            serde_json::from_str(&payload).map_err(|e| Error::ProfileUnreadable {
                identity: identity.to_string(),
                reason: e.to_string(),
            })?;
        profile.identity = identity.to_string();
        profile.schema_version = schema_version;
        profile.cumulative_score = cumulative_score;

        Ok(Some(profile))
    }

    /// Persist `profile`.
    ///
    /// `previous` is the profile as it was loaded, or `None` for a profile
    /// that did not exist yet. The write is rejected if the stored row no
    /// longer matches it, or if it would lower the stored schema version.
    pub fn save_profile(&self, profile: &UserProfile, previous: Option<&UserProfile>) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::write_profile(&tx, profile, previous)?;
        tx.commit()?;
        Ok(())
    }

    fn write_profile(
        conn: &Connection,
        profile: &UserProfile,
        previous: Option<&UserProfile>,
    ) -> Result<()> {
        let stored: Option<(u32, f64)> = conn
            .query_row(
                "SELECT schema_version, cumulative_score FROM profiles WHERE identity = ?",
                [&profile.identity],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((stored_version, _)) = stored {
            if profile.schema_version < stored_version {
                return Err(Error::SchemaDowngrade {
                    identity: profile.identity.clone(),
                    stored: stored_version,
                    attempted: profile.schema_version,
                });
            }
        }

        let unchanged = match (stored, previous) {
            (None, None) => true,
            (Some((version, score)), Some(prev)) => {
                version == prev.schema_version && score == prev.cumulative_score
            }
            _ => false,
        };
        if !unchanged {
            tracing::warn!(identity = %profile.identity, "Profile changed since it was loaded");
            return Err(Error::ConcurrentModification {
                identity: profile.identity.clone(),
            });
        }

        conn.execute(
            r#"
            INSERT INTO profiles (identity, schema_version, cumulative_score, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(identity) DO UPDATE SET
                schema_version = excluded.schema_version,
                cumulative_score = excluded.cumulative_score,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![
                profile.identity,
                profile.schema_version,
                profile.cumulative_score,
                serde_json::to_string(profile)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All stored identities, sorted.
    pub fn list_identities(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT identity FROM profiles ORDER BY identity")?;
        let identities = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(identities)
    }

    // ============================================
    // Snapshot operations
    // ============================================

    /// Append a snapshot. Snapshots are never updated.
    pub fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let conn = self.lock();
        Self::insert_snapshot(&conn, snapshot)
    }

    fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO snapshots (id, identity, taken_at, final_total, report, metrics)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                snapshot.id,
                snapshot.identity,
                // Fixed width so text order matches time order
                snapshot.taken_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                snapshot.report.final_total,
                serde_json::to_string(&snapshot.report)?,
                serde_json::to_string(&snapshot.metrics)?,
            ],
        )?;
        Ok(())
    }

    /// Snapshots for `identity`, newest first.
    pub fn list_snapshots(&self, identity: &str, limit: usize) -> Result<Vec<Snapshot>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, taken_at, report, metrics
            FROM snapshots
            WHERE identity = ?1
            ORDER BY taken_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt
            .query_map(params![identity, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, taken_at, report, metrics)| {
                Ok(Snapshot {
                    id,
                    identity: identity.to_string(),
                    taken_at: DateTime::parse_from_rfc3339(&taken_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    report: serde_json::from_str(&report)?,
                    metrics: serde_json::from_str(&metrics)?,
                })
            })
            .collect()
    }

    pub fn count_snapshots(&self, identity: &str) -> Result<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE identity = ?",
            [identity],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete all but the newest `keep` snapshots for `identity`.
    ///
    /// Returns the number of snapshots removed.
    pub fn prune_snapshots(&self, identity: &str, keep: usize) -> Result<usize> {
        let conn = self.lock();
        Self::delete_old_snapshots(&conn, identity, keep)
    }

    fn delete_old_snapshots(conn: &Connection, identity: &str, keep: usize) -> Result<usize> {
        let removed = conn.execute(
            r#"
            DELETE FROM snapshots
            WHERE identity = ?1
              AND id NOT IN (
                  SELECT id FROM snapshots
                  WHERE identity = ?1
                  ORDER BY taken_at DESC, rowid DESC
                  LIMIT ?2
              )
            "#,
            params![identity, keep as i64],
        )?;
        if removed > 0 {
            tracing::debug!(identity, removed, keep, "Pruned snapshots");
        }
        Ok(removed)
    }

    // ============================================
    // Evaluation
    // ============================================

    /// Persist the outcome of an evaluation in one transaction: the updated
    /// profile, a snapshot of the report, and snapshot retention.
    ///
    /// `previous` is the profile the evaluation started from, exactly as it
    /// was loaded. A `retention` of 0 keeps every snapshot.
    pub fn record_evaluation(
        &self,
        previous: Option<&UserProfile>,
        evaluation: &Evaluation,
        metrics: &SessionMetrics,
        retention: usize,
    ) -> Result<Snapshot> {
        let snapshot = Snapshot {
            id: uuid::Uuid::new_v4().to_string(),
            identity: evaluation.profile.identity.clone(),
            taken_at: evaluation.report.evaluated_at,
            report: evaluation.report.clone(),
            metrics: metrics.clone(),
        };

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::write_profile(&tx, &evaluation.profile, previous)?;
        Self::insert_snapshot(&tx, &snapshot)?;
        if retention > 0 {
            Self::delete_old_snapshots(&tx, &snapshot.identity, retention)?;
        }
        tx.commit()?;

        tracing::debug!(
            identity = %snapshot.identity,
            snapshot = %snapshot.id,
            final_total = snapshot.report.final_total,
            "Evaluation recorded"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::ProgressionEngine;
    use chrono::{Duration, TimeZone};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::days(day)
    }

    fn metrics(day: i64) -> SessionMetrics {
        SessionMetrics {
            session_id: Some(format!("s{}", day)),
            timestamp: at(day),
            tokens_input: Some(18_000),
            tokens_output: Some(2_000),
            message_count: Some(8),
            ..Default::default()
        }
    }

    fn evaluate(db: &Database, day: i64) -> Evaluation {
        let engine = ProgressionEngine::default();
        let previous = db.load_profile("dev").unwrap();
        let eval = engine
            .evaluate("dev", previous.clone(), &[metrics(day)])
            .unwrap();
        db.record_evaluation(previous.as_ref(), &eval, &metrics(day), 0)
            .unwrap();
        eval
    }

    #[test]
    fn test_missing_profile() {
        let db = test_db();
        assert!(db.load_profile("nobody").unwrap().is_none());
    }

    #[test]
    fn test_profile_round_trip() {
        let db = test_db();
        let mut profile = UserProfile::new("dev", at(0));
        profile.cumulative_score = 812.5;
        profile.unlocked_achievements.insert("rank_cadet".into());

        db.save_profile(&profile, None).unwrap();
        let loaded = db.load_profile("dev").unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(db.list_identities().unwrap(), vec!["dev".to_string()]);
    }

    #[test]
    fn test_unreadable_payload() {
        let db = test_db();
        db.connection()
            .execute(
                "INSERT INTO profiles VALUES ('dev', 3, 10.0, '{not json', '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        match db.load_profile("dev") {
            Err(Error::ProfileUnreadable { identity, .. }) => assert_eq!(identity, "dev"),
            other => panic!("expected ProfileUnreadable, got {:?}", other),
        }
    }

    #[test]
    fn test_column_version_wins_over_payload() {
        let db = test_db();
        db.connection()
            .execute(
                "INSERT INTO profiles VALUES ('dev', 2, 1000.0, '{\"cumulative_score\": 5.0}', '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        let loaded = db.load_profile("dev").unwrap().unwrap();
        assert_eq!(loaded.schema_version, 2);
        assert_eq!(loaded.cumulative_score, 1000.0);
        assert_eq!(loaded.identity, "dev");
    }

    #[test]
    fn test_stale_write_rejected() {
        let db = test_db();
        let original = UserProfile::new("dev", at(0));
        db.save_profile(&original, None).unwrap();

        let mut first = original.clone();
        first.cumulative_score = 100.0;
        db.save_profile(&first, Some(&original)).unwrap();

        let mut second = original.clone();
        second.cumulative_score = 50.0;
        assert!(matches!(
            db.save_profile(&second, Some(&original)),
            Err(Error::ConcurrentModification { .. })
        ));
        assert!(matches!(
            db.save_profile(&second, None),
            Err(Error::ConcurrentModification { .. })
        ));
        assert_eq!(db.load_profile("dev").unwrap().unwrap().cumulative_score, 100.0);
    }

    #[test]
    fn test_downgrade_rejected() {
        let db = test_db();
        let current = UserProfile::new("dev", at(0));
        db.save_profile(&current, None).unwrap();

        let mut old = current.clone();
        old.schema_version = 2;
        assert!(matches!(
            db.save_profile(&old, Some(&current)),
            Err(Error::SchemaDowngrade {
                stored: 3,
                attempted: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_record_evaluation_writes_profile_and_snapshot() {
        let db = test_db();
        let first = evaluate(&db, 0);
        let second = evaluate(&db, 1);

        let stored = db.load_profile("dev").unwrap().unwrap();
        assert_eq!(stored, second.profile);
        assert_eq!(stored.total_sessions, 2);

        let snapshots = db.list_snapshots("dev", 10).unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].report, second.report);
        assert_eq!(snapshots[1].report, first.report);
        assert_eq!(snapshots[0].metrics.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_failed_record_leaves_no_snapshot() {
        let db = test_db();
        evaluate(&db, 0);

        let engine = ProgressionEngine::default();
        let eval = engine.evaluate("dev", None, &[metrics(1)]).unwrap();
        assert!(db.record_evaluation(None, &eval, &metrics(1), 0).is_err());
        assert_eq!(db.count_snapshots("dev").unwrap(), 1);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let db = test_db();
        for day in 0..5 {
            evaluate(&db, day);
        }
        assert_eq!(db.prune_snapshots("dev", 2).unwrap(), 3);

        let remaining = db.list_snapshots("dev", 10).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].taken_at, at(4));
        assert_eq!(remaining[1].taken_at, at(3));
    }

    #[test]
    fn test_retention_applied_on_record() {
        let db = test_db();
        let engine = ProgressionEngine::default();
        for day in 0..4 {
            let previous = db.load_profile("dev").unwrap();
            let eval = engine
                .evaluate("dev", previous.clone(), &[metrics(day)])
                .unwrap();
            db.record_evaluation(previous.as_ref(), &eval, &metrics(day), 3)
                .unwrap();
        }
        assert_eq!(db.count_snapshots("dev").unwrap(), 3);
    }
}
