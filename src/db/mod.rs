use crate::config::Config;
use crate::error::{DbError, DbResult};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub mod instructions;
pub mod moderation;
pub mod permissions;
pub mod system;
pub mod usage;

pub use instructions::InstructionRecord;
pub use moderation::NewModerationLog;
pub use permissions::Permission;

/// Timestamp format shared by every table (always UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    timezone: Tz,
}

impl Database {
    pub fn new(config: &Config) -> DbResult<Self> {
        Self::open(&config.database_url, config.timezone)
    }

    pub fn open(path: &str, timezone: Tz) -> DbResult<Self> {
        let conn = Connection::open(path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timezone,
        })
    }

    pub fn execute_init(&self) -> DbResult<()> {
        info!("Database: Initializing schema...");
        let sql = "
            CREATE TABLE IF NOT EXISTS instructions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                file_path TEXT NOT NULL UNIQUE,
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_instructions_user ON instructions (user_id, is_active);

            CREATE TABLE IF NOT EXISTS system (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL,
                updated_by INTEGER
            );

            CREATE TABLE IF NOT EXISTS user_limits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                daily_limit INTEGER NOT NULL,
                last_updated DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                usage_date DATE NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0 CHECK (usage_count >= 0),
                UNIQUE(user_id, usage_date)
            );

            CREATE TABLE IF NOT EXISTS permissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                permission TEXT NOT NULL,
                granted_by INTEGER,
                granted_at DATETIME NOT NULL,
                disabled_at DATETIME DEFAULT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_permissions_user ON permissions (user_id, permission);

            CREATE TABLE IF NOT EXISTS moderation_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                request_type TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                flagged BOOLEAN NOT NULL,
                outcome TEXT NOT NULL,
                categories TEXT NOT NULL DEFAULT '{}',
                raw_response TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_moderation_logs_user ON moderation_logs (user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_moderation_logs_flagged ON moderation_logs (flagged, created_at);
        ";
        let conn = self.conn()?;
        conn.execute_batch(sql)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Run a synchronous DAO call on the blocking pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Today's date in the configured timezone; usage counters roll over on this boundary.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    pub(crate) fn now_utc() -> String {
        Utc::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// In-memory database with the full schema, for unit tests across the crate.
#[cfg(test)]
pub(crate) fn test_db() -> Database {
    let db = Database::open(":memory:", chrono_tz::Asia::Tokyo).unwrap();
    db.execute_init().unwrap();
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_init_is_idempotent() {
        let db = test_db();
        db.execute_init().unwrap();

        let conn = db.conn().unwrap();
        for table in [
            "instructions",
            "system",
            "user_limits",
            "daily_usage",
            "permissions",
            "moderation_logs",
        ] {
            let exists = conn
                .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .unwrap()
                .exists([table])
                .unwrap();
            assert!(exists, "table {} should exist", table);
        }
    }

    #[tokio::test]
    async fn test_run_blocking_propagates_not_found() {
        let db = test_db();
        let result = db.run_blocking(|db| db.get_instruction(42)).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }
}
