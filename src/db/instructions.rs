//! Metadata rows for user-authored system instructions. The instruction text
//! itself lives in a file named by `file_path`.

use super::Database;
use crate::error::{DbError, DbResult};
use rusqlite::{params, OptionalExtension, Row};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionRecord {
    pub id: i64,
    pub user_id: u64,
    pub name: String,
    pub file_path: String,
    pub is_active: bool,
    pub created_at: String,
}

const COLUMNS: &str = "id, user_id, name, file_path, is_active, created_at";

fn row_to_instruction(row: &Row<'_>) -> rusqlite::Result<InstructionRecord> {
    Ok(InstructionRecord {
        id: row.get(0)?,
        user_id: row.get::<_, i64>(1)? as u64,
        name: row.get(2)?,
        file_path: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Database {
    /// Insert an inactive instruction row and return its id.
    pub fn insert_instruction(&self, user_id: u64, name: &str, file_path: &str) -> DbResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO instructions (user_id, name, file_path, is_active, created_at)
             VALUES (?1, ?2, ?3, FALSE, ?4)",
            params![user_id as i64, name, file_path, Database::now_utc()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Make `instruction_id` the only active instruction of `user_id`.
    /// Fails with `NotFound` when the row does not exist or belongs to someone else.
    pub fn activate_instruction(&self, user_id: u64, instruction_id: i64) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let owned = tx
            .prepare("SELECT 1 FROM instructions WHERE id = ?1 AND user_id = ?2")?
            .exists(params![instruction_id, user_id as i64])?;
        if !owned {
            return Err(DbError::NotFound);
        }

        tx.execute(
            "UPDATE instructions SET is_active = FALSE WHERE user_id = ?1 AND is_active = TRUE",
            params![user_id as i64],
        )?;
        tx.execute(
            "UPDATE instructions SET is_active = TRUE WHERE id = ?1",
            params![instruction_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Deactivate whatever instruction the user has active. Returns rows touched.
    pub fn deactivate_instructions(&self, user_id: u64) -> DbResult<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            "UPDATE instructions SET is_active = FALSE WHERE user_id = ?1 AND is_active = TRUE",
            params![user_id as i64],
        )?;
        Ok(count)
    }

    pub fn get_active_instruction(&self, user_id: u64) -> DbResult<Option<InstructionRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM instructions
                     WHERE user_id = ?1 AND is_active = TRUE
                     ORDER BY id DESC LIMIT 1"
                ),
                params![user_id as i64],
                row_to_instruction,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_instruction(&self, instruction_id: i64) -> DbResult<InstructionRecord> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM instructions WHERE id = ?1"),
            params![instruction_id],
            row_to_instruction,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound,
            other => DbError::Sqlite(other),
        })
    }

    /// The user's instructions, newest first.
    pub fn list_instructions(&self, user_id: u64, limit: usize) -> DbResult<Vec<InstructionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM instructions WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id as i64, limit as i64], row_to_instruction)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn count_instructions(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM instructions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// The `limit` oldest instructions across all users, oldest first.
    pub fn oldest_instructions(&self, limit: usize) -> DbResult<Vec<InstructionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM instructions ORDER BY id ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_instruction)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn delete_instruction(&self, instruction_id: i64) -> DbResult<usize> {
        let conn = self.conn()?;
        let count = conn.execute("DELETE FROM instructions WHERE id = ?1", params![instruction_id])?;
        Ok(count)
    }
}
