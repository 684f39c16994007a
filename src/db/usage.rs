//! Daily usage counters and daily limit overrides.

use super::Database;
use crate::error::DbResult;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

/// `user_limits` row holding the server-wide default limit.
const DEFAULT_LIMIT_USER_ID: i64 = 0;

impl Database {
    pub fn get_daily_usage(&self, user_id: u64, date: NaiveDate) -> DbResult<i64> {
        let conn = self.conn()?;
        let count = conn
            .query_row(
                "SELECT usage_count FROM daily_usage WHERE user_id = ?1 AND usage_date = ?2",
                params![user_id as i64, date.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Add one call to the user's counter for `date` and return the new count.
    pub fn increment_usage(&self, user_id: u64, date: NaiveDate) -> DbResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "INSERT INTO daily_usage (user_id, usage_date, usage_count)
             VALUES (?1, ?2, 1)
             ON CONFLICT(user_id, usage_date) DO UPDATE SET usage_count = usage_count + 1
             RETURNING usage_count",
            params![user_id as i64, date.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Drop counters dated before `date`. Returns rows removed.
    pub fn purge_usage_before(&self, date: NaiveDate) -> DbResult<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM daily_usage WHERE usage_date < ?1",
            params![date.to_string()],
        )?;
        Ok(count)
    }

    pub fn get_user_limit(&self, user_id: u64) -> DbResult<Option<i64>> {
        self.get_limit_row(user_id as i64)
    }

    pub fn set_user_limit(&self, user_id: u64, daily_limit: i64) -> DbResult<()> {
        self.set_limit_row(user_id as i64, daily_limit)
    }

    pub fn get_default_limit(&self) -> DbResult<Option<i64>> {
        self.get_limit_row(DEFAULT_LIMIT_USER_ID)
    }

    pub fn set_default_limit(&self, daily_limit: i64) -> DbResult<()> {
        self.set_limit_row(DEFAULT_LIMIT_USER_ID, daily_limit)
    }

    fn get_limit_row(&self, user_id: i64) -> DbResult<Option<i64>> {
        let conn = self.conn()?;
        let limit = conn
            .query_row(
                "SELECT daily_limit FROM user_limits WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(limit)
    }

    fn set_limit_row(&self, user_id: i64, daily_limit: i64) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_limits (user_id, daily_limit, last_updated)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET daily_limit = ?2, last_updated = ?3",
            params![user_id, daily_limit, Database::now_utc()],
        )?;
        Ok(())
    }
}
