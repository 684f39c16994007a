use super::{Database, TIMESTAMP_FORMAT};
use crate::error::DbResult;
use chrono::{Duration, Utc};
use rusqlite::params;

/// One moderation check, flagged or not.
#[derive(Debug, Clone)]
pub struct NewModerationLog {
    pub user_id: u64,
    pub request_type: String,
    pub content_hash: String,
    pub flagged: bool,
    /// `flagged`, `clean` or `error`
    pub outcome: String,
    /// JSON object of category -> bool
    pub categories: String,
    pub raw_response: String,
}

impl Database {
    pub fn log_moderation(&self, entry: &NewModerationLog) -> DbResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO moderation_logs
                (user_id, request_type, content_hash, flagged, outcome, categories, raw_response, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.user_id as i64,
                entry.request_type,
                entry.content_hash,
                entry.flagged,
                entry.outcome,
                entry.categories,
                entry.raw_response,
                Database::now_utc(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Checks the moderation endpoint flagged for `user_id` within the last `days` days.
    /// Fail-closed rejections after an endpoint error are not counted.
    pub fn count_recent_flags(&self, user_id: u64, days: i64) -> DbResult<i64> {
        let since = (Utc::now() - Duration::days(days))
            .format(TIMESTAMP_FORMAT)
            .to_string();
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM moderation_logs
             WHERE user_id = ?1 AND outcome = 'flagged' AND created_at >= ?2",
            params![user_id as i64, since],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete log rows older than `days` days. Returns rows removed.
    pub fn cleanup_moderation_logs(&self, days: i64) -> DbResult<usize> {
        let cutoff = (Utc::now() - Duration::days(days))
            .format(TIMESTAMP_FORMAT)
            .to_string();
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM moderation_logs WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(count)
    }
}
