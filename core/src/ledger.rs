//! Ledger event model.
//!
//! Every balance-affecting occurrence is one immutable `LedgerEvent`,
//! regardless of which historical table it was read from. The category
//! vocabulary is closed: rows whose category text cannot be mapped fail
//! at the read boundary instead of being silently dropped or defaulted.

use crate::types::{Points, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why points moved. The legacy tables used several spellings for the
/// same business occurrence; all of them map onto these five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCategory {
    MilestoneAward,
    RankVerification,
    TournamentPrize,
    ChallengeReward,
    /// Synthesized by the reconciler (or by the old one-off fix scripts)
    /// to close a gap. Never emitted by organic gameplay.
    RetroactiveAdjustment,
}

impl LedgerCategory {
    /// Canonical text stored in `spa_transactions.category`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerCategory::MilestoneAward => "milestone_award",
            LedgerCategory::RankVerification => "rank_verification",
            LedgerCategory::TournamentPrize => "tournament_prize",
            LedgerCategory::ChallengeReward => "challenge_reward",
            LedgerCategory::RetroactiveAdjustment => "retroactive_adjustment",
        }
    }

    /// Map stored text (including legacy spellings) to a category.
    /// Returns None for unknown text — the caller turns that into a
    /// MalformedEvent error naming the offending row.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "milestone_award" | "milestone" => Some(LedgerCategory::MilestoneAward),
            "rank_verification" | "rank_verified" | "rank_registration" => {
                Some(LedgerCategory::RankVerification)
            }
            "tournament_prize" | "tournament_reward" => Some(LedgerCategory::TournamentPrize),
            "challenge_reward" | "challenge_win" => Some(LedgerCategory::ChallengeReward),
            "retroactive_adjustment" | "legacy_award" | "manual_adjustment" => {
                Some(LedgerCategory::RetroactiveAdjustment)
            }
            _ => None,
        }
    }
}

/// One immutable record of a balance-affecting occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: String,
    pub user_id: UserId,
    pub amount: Points,
    pub category: LedgerCategory,
    pub recorded_at: DateTime<Utc>,
    /// Originating business object (milestone id, match id, ...).
    /// Shared across sources when the same occurrence was logged twice.
    pub reference_id: Option<String>,
    pub description: String,
    /// Which table this event was read from. Informational only; never
    /// part of event identity.
    pub source: &'static str,
}

/// A corrective event synthesized to close a positive gap, plus the
/// context the notifier and the marker row need.
#[derive(Debug, Clone)]
pub struct CorrectiveEvent {
    pub event: LedgerEvent,
    /// Authoritative balance observed when the gap was computed.
    pub balance_at_correction: Points,
    /// Sum of all known ledger events at that moment.
    pub logged_total: Points,
    /// Number of corrections already applied to the account at
    /// computation time. Keys the already-corrected marker: two runs
    /// racing on the same stale read collide on it, while a later
    /// genuine shortfall carries the next sequence.
    pub sequence: i64,
}

impl CorrectiveEvent {
    /// Build the single correction for a detected shortfall.
    /// `gap` must be positive — the reconciler never corrects downward.
    pub fn for_shortfall(
        user_id: &str,
        gap: Points,
        balance: Points,
        sequence: i64,
        now: DateTime<Utc>,
    ) -> Self {
        debug_assert!(gap > 0);
        let event = LedgerEvent {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount: gap,
            category: LedgerCategory::RetroactiveAdjustment,
            recorded_at: now,
            reference_id: None,
            description: format!(
                "Retroactive SPA adjustment: {gap} points missing from transaction history"
            ),
            source: "spa_transactions",
        };
        Self {
            event,
            balance_at_correction: balance,
            logged_total: balance - gap,
            sequence,
        }
    }
}
