//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Reader, reconciler and notifier call store methods — they never
//! execute SQL directly.

mod events;
mod notification;

pub use events::{SOURCE_BONUS_ACTIVITIES, SOURCE_POINTS_LOG, SOURCE_TRANSACTIONS};
pub use notification::NotificationRow;

use crate::{
    error::{ReconError, ReconResult},
    types::{Points, UserId},
};
use rusqlite::{params, Connection};

pub struct ReconStore {
    conn: Connection,
}

impl ReconStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> ReconResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ReconResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ReconResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Balance source (player_rankings, read-only in production) ──

    /// Authoritative balance for one account.
    pub fn spa_balance(&self, user_id: &str) -> ReconResult<Points> {
        let balance = self
            .conn
            .query_row(
                "SELECT spa_points FROM player_rankings WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => ReconError::BalanceNotFound {
                    user_id: user_id.to_string(),
                },
                other => other.into(),
            })?;
        Ok(balance)
    }

    /// Every account holding a positive balance, highest first.
    /// Used by the runner's --all mode.
    pub fn accounts_with_balance(&self) -> ReconResult<Vec<(UserId, Points)>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, spa_points FROM player_rankings
             WHERE spa_points > 0
             ORDER BY spa_points DESC, user_id ASC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Seed an account row. Test and fixture use; the reconciler itself
    /// never writes player_rankings.
    pub fn insert_ranking(&self, user_id: &str, spa_points: Points) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO player_rankings (user_id, spa_points) VALUES (?1, ?2)",
            params![user_id, spa_points],
        )?;
        Ok(())
    }
}
