//! Shared primitive types used across the crate.

/// A stable, unique identifier for a player account.
pub type UserId = String;

/// A SPA point amount. Signed: debits are negative.
pub type Points = i64;
