//! Batch execution over many accounts.
//!
//! Accounts are independent, so one account's failure never halts the
//! run. Every outcome, success or failure, lands in the report.

use crate::{
    config::ReconConfig,
    error::ReconError,
    reconciler::{AccountOutcome, AccountReport, Reconciler},
    store::ReconStore,
    types::Points,
};

#[derive(Debug)]
pub enum AccountResult {
    Completed(AccountReport),
    Failed { user_id: String, error: ReconError },
}

impl AccountResult {
    /// One line per account: `account, gap, action_taken`.
    pub fn report_line(&self) -> String {
        match self {
            AccountResult::Completed(r) => {
                let action = match &r.outcome {
                    AccountOutcome::Consistent => "consistent".to_string(),
                    AccountOutcome::Corrected {
                        amount,
                        persisted: true,
                        notified,
                    } => {
                        if *notified {
                            format!("corrected(+{amount}, notified)")
                        } else {
                            format!("corrected(+{amount})")
                        }
                    }
                    AccountOutcome::Corrected {
                        amount,
                        persisted: false,
                        ..
                    } => format!("would_correct(+{amount})"),
                    AccountOutcome::OverAwardFlagged { excess } => {
                        format!("over_award_flagged(-{excess})")
                    }
                };
                format!("{}, gap={}, {}", r.user_id, r.gap, action)
            }
            AccountResult::Failed { user_id, error } => {
                format!("{user_id}, gap=?, failed: {error}")
            }
        }
    }

    /// Per-source breakdown for the verbose report: one indented line
    /// per ledger table with its counted events and point contribution.
    pub fn breakdown_lines(&self) -> Vec<String> {
        match self {
            AccountResult::Completed(r) => {
                let mut lines: Vec<String> = r
                    .source_totals
                    .iter()
                    .map(|(source, count, total)| {
                        format!("    {source}: {count} events, {total:+} SPA")
                    })
                    .collect();
                if r.duplicates_skipped > 0 {
                    lines.push(format!(
                        "    cross-source duplicates skipped: {}",
                        r.duplicates_skipped
                    ));
                }
                lines
            }
            AccountResult::Failed { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<AccountResult>,
}

impl BatchReport {
    pub fn consistent(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::Consistent))
    }

    pub fn corrected(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::Corrected { .. }))
    }

    pub fn flagged(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::OverAwardFlagged { .. }))
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, AccountResult::Failed { .. }))
            .count()
    }

    /// Total SPA credited (or, in dry-run, that would be credited).
    pub fn points_restored(&self) -> Points {
        self.results
            .iter()
            .filter_map(|r| match r {
                AccountResult::Completed(rep) => match rep.outcome {
                    AccountOutcome::Corrected { amount, .. } => Some(amount),
                    _ => None,
                },
                _ => None,
            })
            .sum()
    }

    /// Process exit is nonzero iff this is true. Over-award flags are a
    /// reporting outcome, not a failure.
    pub fn any_failed(&self) -> bool {
        self.failed() > 0
    }

    fn count<F: Fn(&AccountOutcome) -> bool>(&self, pred: F) -> usize {
        self.results
            .iter()
            .filter(|r| match r {
                AccountResult::Completed(rep) => pred(&rep.outcome),
                _ => false,
            })
            .count()
    }
}

pub struct ReconBatch<'a> {
    store: &'a ReconStore,
    config: &'a ReconConfig,
    dry_run: bool,
}

impl<'a> ReconBatch<'a> {
    pub fn new(store: &'a ReconStore, config: &'a ReconConfig, dry_run: bool) -> Self {
        Self {
            store,
            config,
            dry_run,
        }
    }

    /// Reconcile each listed account in turn.
    pub fn run(&self, user_ids: &[String]) -> BatchReport {
        let reconciler = Reconciler::new(self.store, self.config, self.dry_run);
        let mut report = BatchReport::default();

        for user_id in user_ids {
            match reconciler.reconcile(user_id) {
                Ok(account_report) => {
                    report.results.push(AccountResult::Completed(account_report));
                }
                Err(error) => {
                    log::error!("account={user_id} reconciliation failed: {error}");
                    report.results.push(AccountResult::Failed {
                        user_id: user_id.clone(),
                        error,
                    });
                }
            }
        }
        report
    }

    /// Reconcile every account carrying a positive balance.
    pub fn run_all(&self) -> crate::error::ReconResult<BatchReport> {
        let ids: Vec<String> = self
            .store
            .accounts_with_balance()?
            .into_iter()
            .map(|(user_id, _)| user_id)
            .collect();
        log::info!("reconciling all {} accounts with a positive balance", ids.len());
        Ok(self.run(&ids))
    }
}
