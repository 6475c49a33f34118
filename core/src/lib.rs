//! spa-ledger-core — reconciliation of SPA point balances against the
//! historical ledger sources.
//!
//! Layering:
//!   store     → the only module that executes SQL
//!   reader    → union + dedup of all ledger sources
//!   reconciler→ gap computation and corrective-event synthesis
//!   notifier  → user-facing notification rows
//!   batch     → per-account loop, failure isolation, run report

pub mod batch;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notifier;
pub mod reader;
pub mod reconciler;
pub mod store;
pub mod types;
