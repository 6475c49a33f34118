//! Ledger source reads and corrective-event persistence.
//!
//! Three tables hold point history: `spa_transactions` (primary) plus
//! the legacy `spa_points_log` and `spa_bonus_activities`. Each read
//! returns fully-validated `LedgerEvent`s; a row with unmappable
//! category text fails the whole read.

use super::ReconStore;
use crate::{
    error::{ReconError, ReconResult},
    ledger::{CorrectiveEvent, LedgerCategory, LedgerEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::params;

pub const SOURCE_TRANSACTIONS: &str = "spa_transactions";
pub const SOURCE_POINTS_LOG: &str = "spa_points_log";
pub const SOURCE_BONUS_ACTIVITIES: &str = "spa_bonus_activities";

/// Untyped row as it comes out of a log table, before validation.
struct RawEventRow {
    id: String,
    user_id: String,
    amount: i64,
    category_text: String,
    reference_id: Option<String>,
    description: String,
    recorded_at_text: String,
}

impl RawEventRow {
    fn validate(self, source: &'static str) -> ReconResult<LedgerEvent> {
        let category =
            LedgerCategory::parse(&self.category_text).ok_or_else(|| ReconError::MalformedEvent {
                table: source.to_string(),
                id: self.id.clone(),
                detail: format!("unknown category '{}'", self.category_text),
            })?;
        let recorded_at = DateTime::parse_from_rfc3339(&self.recorded_at_text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ReconError::MalformedEvent {
                table: source.to_string(),
                id: self.id.clone(),
                detail: format!("bad timestamp '{}': {e}", self.recorded_at_text),
            })?;
        Ok(LedgerEvent {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            category,
            recorded_at,
            reference_id: self.reference_id,
            description: self.description,
            source,
        })
    }
}

impl ReconStore {
    fn read_source(
        &self,
        source: &'static str,
        sql: &str,
        user_id: &str,
    ) -> ReconResult<Vec<LedgerEvent>> {
        let mut stmt = self.conn().prepare(sql)?;
        let raw = stmt
            .query_map(params![user_id], |row| {
                Ok(RawEventRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    amount: row.get(2)?,
                    category_text: row.get(3)?,
                    reference_id: row.get(4)?,
                    description: row.get(5)?,
                    recorded_at_text: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(|r| r.validate(source)).collect()
    }

    pub fn transactions_for(&self, user_id: &str) -> ReconResult<Vec<LedgerEvent>> {
        self.read_source(
            SOURCE_TRANSACTIONS,
            "SELECT id, user_id, amount, category, reference_id, description, recorded_at
             FROM spa_transactions WHERE user_id = ?1",
            user_id,
        )
    }

    pub fn points_log_for(&self, user_id: &str) -> ReconResult<Vec<LedgerEvent>> {
        self.read_source(
            SOURCE_POINTS_LOG,
            "SELECT id, user_id, points, action, reference_id, description, created_at
             FROM spa_points_log WHERE user_id = ?1",
            user_id,
        )
    }

    pub fn bonus_activities_for(&self, user_id: &str) -> ReconResult<Vec<LedgerEvent>> {
        self.read_source(
            SOURCE_BONUS_ACTIVITIES,
            "SELECT id, user_id, points, activity_type, reference_id, description, created_at
             FROM spa_bonus_activities WHERE user_id = ?1",
            user_id,
        )
    }

    // ── Writes ────────────────────────────────────────────────────

    pub fn insert_transaction(&self, ev: &LedgerEvent) -> ReconResult<()> {
        self.conn().execute(
            "INSERT INTO spa_transactions
             (id, user_id, amount, category, reference_id, description, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ev.id,
                ev.user_id,
                ev.amount,
                ev.category.as_str(),
                ev.reference_id,
                ev.description,
                ev.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_points_log(&self, ev: &LedgerEvent) -> ReconResult<()> {
        self.conn().execute(
            "INSERT INTO spa_points_log
             (id, user_id, points, action, reference_id, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ev.id,
                ev.user_id,
                ev.amount,
                ev.category.as_str(),
                ev.reference_id,
                ev.description,
                ev.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_bonus_activity(&self, ev: &LedgerEvent) -> ReconResult<()> {
        self.conn().execute(
            "INSERT INTO spa_bonus_activities
             (id, user_id, points, activity_type, reference_id, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ev.id,
                ev.user_id,
                ev.amount,
                ev.category.as_str(),
                ev.reference_id,
                ev.description,
                ev.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Persist one corrective event and its already-corrected marker in
    /// a single SQLite transaction. A crash between the two writes must
    /// never leave a correction without its marker, and the marker's
    /// UNIQUE (user_id, sequence) constraint turns a racing duplicate
    /// into `PersistenceConflict` instead of a double credit.
    pub fn persist_correction(&self, c: &CorrectiveEvent) -> ReconResult<()> {
        let user_id = c.event.user_id.clone();
        let tx = self.conn().unchecked_transaction()?;

        let metadata = serde_json::json!({
            "retroactive": true,
            "original_spa_balance": c.balance_at_correction,
            "existing_transaction_total": c.logged_total,
        });

        let marker = tx.execute(
            "INSERT INTO recon_adjustments
             (adjustment_id, user_id, sequence, amount, balance_at_correction,
              transaction_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid::Uuid::new_v4().to_string(),
                c.event.user_id,
                c.sequence,
                c.event.amount,
                c.balance_at_correction,
                c.event.id,
                c.event.recorded_at.to_rfc3339(),
            ],
        );
        if let Err(e) = marker {
            return Err(map_constraint(&user_id, e));
        }

        let insert = tx.execute(
            "INSERT INTO spa_transactions
             (id, user_id, amount, category, reference_id, description, metadata, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                c.event.id,
                c.event.user_id,
                c.event.amount,
                c.event.category.as_str(),
                c.event.reference_id,
                c.event.description,
                metadata.to_string(),
                c.event.recorded_at.to_rfc3339(),
            ],
        );
        if let Err(e) = insert {
            return Err(map_constraint(&user_id, e));
        }

        tx.commit()?;
        Ok(())
    }

    /// Number of retroactive adjustments recorded for an account.
    pub fn corrective_event_count(&self, user_id: &str) -> ReconResult<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM spa_transactions
             WHERE user_id = ?1 AND category = 'retroactive_adjustment'",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_constraint(user_id: &str, e: rusqlite::Error) -> ReconError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ReconError::PersistenceConflict {
                user_id: user_id.to_string(),
            }
        }
        _ => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> ReconStore {
        let store = ReconStore::in_memory().unwrap();
        store.migrate().unwrap();
        store
    }

    #[test]
    fn duplicate_correction_maps_to_persistence_conflict() {
        let store = fixture();
        let first = CorrectiveEvent::for_shortfall("u1", 150, 350, 0, Utc::now());
        store.persist_correction(&first).unwrap();

        // Same account, same correction sequence — the shape two runs
        // racing on one stale read produce. The marker's UNIQUE
        // constraint rejects the second write.
        let second = CorrectiveEvent::for_shortfall("u1", 150, 350, 0, Utc::now());
        let err = store.persist_correction(&second).unwrap_err();
        assert!(matches!(err, ReconError::PersistenceConflict { .. }));

        // The rejected write rolled back whole: still one correction.
        assert_eq!(store.corrective_event_count("u1").unwrap(), 1);
    }

    #[test]
    fn later_sequence_is_not_blocked_by_an_old_marker() {
        let store = fixture();
        let first = CorrectiveEvent::for_shortfall("u1", 100, 100, 0, Utc::now());
        store.persist_correction(&first).unwrap();

        // Same balance again, next sequence: a genuine later shortfall.
        let second = CorrectiveEvent::for_shortfall("u1", 100, 100, 1, Utc::now());
        store.persist_correction(&second).unwrap();
        assert_eq!(store.corrective_event_count("u1").unwrap(), 2);
    }

    #[test]
    fn correction_and_marker_commit_together() {
        let store = fixture();
        let c = CorrectiveEvent::for_shortfall("u1", 70, 70, 0, Utc::now());
        store.persist_correction(&c).unwrap();

        let markers: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM recon_adjustments WHERE user_id = 'u1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(markers, 1);
        assert_eq!(store.corrective_event_count("u1").unwrap(), 1);

        // The correction reads back as a regular ledger event.
        let events = store.transactions_for("u1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].amount, 70);
        assert_eq!(
            events[0].category,
            crate::ledger::LedgerCategory::RetroactiveAdjustment
        );
    }

    #[test]
    fn unknown_category_text_is_rejected_at_the_read_boundary() {
        let store = fixture();
        store
            .conn()
            .execute(
                "INSERT INTO spa_transactions
                 (id, user_id, amount, category, reference_id, description, recorded_at)
                 VALUES ('bad', 'u1', 10, 'tombola_win', NULL, '', ?1)",
                rusqlite::params![Utc::now().to_rfc3339()],
            )
            .unwrap();

        let err = store.transactions_for("u1").unwrap_err();
        match err {
            ReconError::MalformedEvent { id, detail, .. } => {
                assert_eq!(id, "bad");
                assert!(detail.contains("tombola_win"));
            }
            other => panic!("expected MalformedEvent, got {other:?}"),
        }
    }
}
