//! Key/value settings that must survive restarts (current provider, lock flag).

use super::Database;
use crate::error::DbResult;
use rusqlite::{params, OptionalExtension};

impl Database {
    pub fn get_setting(&self, key: &str) -> DbResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM system WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str, updated_by: Option<u64>) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO system (key, value, updated_at, updated_by)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3, updated_by = ?4",
            params![key, value, Database::now_utc(), updated_by.map(|id| id as i64)],
        )?;
        Ok(())
    }
}
