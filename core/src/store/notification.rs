//! Notification persistence.

use super::ReconStore;
use crate::error::ReconResult;
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

impl ReconStore {
    pub fn insert_notification(&self, n: &NotificationRow) -> ReconResult<()> {
        self.conn().execute(
            "INSERT INTO notifications
             (id, user_id, kind, title, message, action_url, read, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
            params![
                n.id,
                n.user_id,
                n.kind,
                n.title,
                n.message,
                n.action_url,
                n.metadata.as_ref().map(|m| m.to_string()),
                n.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn notification_count(&self, user_id: &str) -> ReconResult<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn notifications_for(&self, user_id: &str) -> ReconResult<Vec<NotificationRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, kind, title, message, action_url, metadata, created_at
             FROM notifications WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let metadata_text: Option<String> = row.get(6)?;
            Ok(NotificationRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                kind: row.get(2)?,
                title: row.get(3)?,
                message: row.get(4)?,
                action_url: row.get(5)?,
                metadata: metadata_text.and_then(|t| serde_json::from_str(&t).ok()),
                created_at: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
