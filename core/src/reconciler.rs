//! Gap computation and corrective-event synthesis.
//!
//! One reconciliation run walks the state machine
//!   READ_BALANCE → READ_EVENTS → COMPUTE_GAP →
//!     { CONSISTENT | CORRECTING → PERSISTED → NOTIFIED | OVER_AWARD_FLAGGED }
//! and every terminal state is reported, never swallowed.

use crate::{
    config::ReconConfig,
    error::{ReconError, ReconResult},
    ledger::CorrectiveEvent,
    notifier::Notifier,
    reader::EventLogReader,
    store::ReconStore,
    types::Points,
};
use chrono::Utc;

/// Terminal state of one account's reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    Consistent,
    /// One corrective event of exactly `amount` was synthesized.
    /// `persisted` is false only in dry-run mode; `notified` is false
    /// when the amount was below the notification threshold or the
    /// notification write failed (logged, never fatal).
    Corrected {
        amount: Points,
        persisted: bool,
        notified: bool,
    },
    /// Log total exceeds the authoritative balance. Removing history is
    /// a reviewed, manual decision — never automated here.
    OverAwardFlagged { excess: Points },
}

/// Full per-account result, including the numbers the report prints.
#[derive(Debug)]
pub struct AccountReport {
    pub user_id: String,
    pub balance: Points,
    pub logged_total: Points,
    pub gap: Points,
    pub duplicates_skipped: usize,
    pub source_totals: Vec<(&'static str, usize, Points)>,
    pub outcome: AccountOutcome,
}

pub struct Reconciler<'a> {
    store: &'a ReconStore,
    config: &'a ReconConfig,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a ReconStore, config: &'a ReconConfig, dry_run: bool) -> Self {
        Self {
            store,
            config,
            dry_run,
        }
    }

    /// Reconcile one account to a terminal state.
    ///
    /// Idempotent: a persisted correction is itself a ledger event, so
    /// the next run sums it in and lands on CONSISTENT. A concurrent
    /// correction based on the same stale read carries the same
    /// correction sequence and surfaces as `PersistenceConflict`
    /// through the marker table's UNIQUE constraint; the account is
    /// then re-read and recomputed, up to `conflict_retries` extra
    /// attempts.
    pub fn reconcile(&self, user_id: &str) -> ReconResult<AccountReport> {
        let mut attempts_left = self.config.conflict_retries;
        loop {
            match self.reconcile_once(user_id) {
                Err(ReconError::PersistenceConflict { .. }) if attempts_left > 0 => {
                    attempts_left -= 1;
                    log::warn!(
                        "account={user_id} corrective write conflicted, recomputing \
                         ({attempts_left} retries left)"
                    );
                }
                other => return other,
            }
        }
    }

    fn reconcile_once(&self, user_id: &str) -> ReconResult<AccountReport> {
        let balance = self.store.spa_balance(user_id)?;
        let readout = EventLogReader::new(self.store, self.config).events_for(user_id)?;
        let logged_total = readout.total();
        let gap = balance - logged_total;

        log::debug!(
            "account={user_id} balance={balance} logged={logged_total} gap={gap} \
             events={} dupes={}",
            readout.events.len(),
            readout.duplicates_skipped
        );

        let outcome = if gap == 0 {
            AccountOutcome::Consistent
        } else if gap > 0 {
            self.correct_shortfall(user_id, gap, balance)?
        } else {
            log::warn!(
                "account={user_id} over-award: log total {logged_total} exceeds \
                 balance {balance} by {}",
                -gap
            );
            AccountOutcome::OverAwardFlagged { excess: -gap }
        };

        Ok(AccountReport {
            user_id: user_id.to_string(),
            balance,
            logged_total,
            gap,
            duplicates_skipped: readout.duplicates_skipped,
            source_totals: readout.source_totals,
            outcome,
        })
    }

    /// CORRECTING → PERSISTED → NOTIFIED. Exactly one corrective event
    /// per run; the gap is never split.
    fn correct_shortfall(
        &self,
        user_id: &str,
        gap: Points,
        balance: Points,
    ) -> ReconResult<AccountOutcome> {
        // Sequence = corrections already on record. A racing run that
        // read the same state computes the same sequence and loses at
        // the marker's UNIQUE constraint.
        let sequence = self.store.corrective_event_count(user_id)?;
        let corrective = CorrectiveEvent::for_shortfall(user_id, gap, balance, sequence, Utc::now());

        if self.dry_run {
            log::info!("account={user_id} dry-run: would credit {gap} SPA");
            return Ok(AccountOutcome::Corrected {
                amount: gap,
                persisted: false,
                notified: false,
            });
        }

        self.store.persist_correction(&corrective)?;
        log::info!("account={user_id} corrected: +{gap} SPA retroactive adjustment");

        // The correction is durably committed at this point. Notification
        // failure must not roll it back or fail the account.
        let notified = match Notifier::new(self.store, self.config).notify(&corrective) {
            Ok(sent) => sent,
            Err(e) => {
                log::warn!("account={user_id} notification delivery failed: {e}");
                false
            }
        };

        Ok(AccountOutcome::Corrected {
            amount: gap,
            persisted: true,
            notified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn persistent_conflict_surfaces_after_retries() {
        let store = ReconStore::in_memory().unwrap();
        store.migrate().unwrap();
        store.insert_ranking("u1", 100).unwrap();

        // A marker already holds sequence 0 while no correction made it
        // into the ledger, so every attempt recomputes the same gap and
        // the same sequence, conflicts again, and gives up.
        store
            .conn()
            .execute(
                "INSERT INTO recon_adjustments
                 (adjustment_id, user_id, sequence, amount, balance_at_correction,
                  transaction_id, created_at)
                 VALUES ('m1', 'u1', 0, 100, 100, 'tx-gone', '2024-01-01T00:00:00Z')",
                params![],
            )
            .unwrap();

        let config = ReconConfig::default();
        let err = Reconciler::new(&store, &config, false)
            .reconcile("u1")
            .unwrap_err();
        assert!(matches!(err, ReconError::PersistenceConflict { .. }));
        assert_eq!(store.corrective_event_count("u1").unwrap(), 0);
    }

    #[test]
    fn correction_survives_notification_failure() {
        let store = ReconStore::in_memory().unwrap();
        store.migrate().unwrap();
        store.insert_ranking("u1", 120).unwrap();

        // Break notification delivery. The ledger correction is already
        // committed when the notifier runs, so the account still lands
        // on a corrected terminal state.
        store
            .conn()
            .execute_batch("DROP TABLE notifications;")
            .unwrap();

        let config = ReconConfig::default();
        let report = Reconciler::new(&store, &config, false)
            .reconcile("u1")
            .unwrap();
        assert_eq!(
            report.outcome,
            AccountOutcome::Corrected {
                amount: 120,
                persisted: true,
                notified: false,
            }
        );
        assert_eq!(store.corrective_event_count("u1").unwrap(), 1);
    }
}
