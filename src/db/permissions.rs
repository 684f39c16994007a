//! Role grants. A grant is active while `disabled_at` is NULL; revoking keeps the row for audit.

use super::Database;
use crate::error::DbResult;
use rusqlite::params;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Beta,
    Blocked,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Beta => "beta",
            Permission::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beta" => Ok(Permission::Beta),
            "blocked" => Ok(Permission::Blocked),
            other => Err(format!("unknown permission: {}", other)),
        }
    }
}

impl Database {
    /// Grant `permission` unless it is already active. Returns whether a row was added.
    pub fn grant_permission(
        &self,
        user_id: u64,
        permission: Permission,
        granted_by: Option<u64>,
    ) -> DbResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO permissions (user_id, permission, granted_by, granted_at)
             SELECT ?1, ?2, ?3, ?4
             WHERE NOT EXISTS (
                 SELECT 1 FROM permissions
                 WHERE user_id = ?1 AND permission = ?2 AND disabled_at IS NULL
             )",
            params![
                user_id as i64,
                permission.as_str(),
                granted_by.map(|id| id as i64),
                Database::now_utc()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Disable an active grant. Returns false when the user did not hold it.
    pub fn revoke_permission(&self, user_id: u64, permission: Permission) -> DbResult<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE permissions SET disabled_at = ?3
             WHERE user_id = ?1 AND permission = ?2 AND disabled_at IS NULL",
            params![user_id as i64, permission.as_str(), Database::now_utc()],
        )?;
        Ok(updated > 0)
    }

    pub fn has_permission(&self, user_id: u64, permission: Permission) -> DbResult<bool> {
        let conn = self.conn()?;
        let exists = conn
            .prepare(
                "SELECT 1 FROM permissions
                 WHERE user_id = ?1 AND permission = ?2 AND disabled_at IS NULL",
            )?
            .exists(params![user_id as i64, permission.as_str()])?;
        Ok(exists)
    }

    /// Active permissions held by the user.
    pub fn list_permissions(&self, user_id: u64) -> DbResult<Vec<Permission>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT permission FROM permissions
             WHERE user_id = ?1 AND disabled_at IS NULL
             ORDER BY permission",
        )?;
        let rows = stmt.query_map(params![user_id as i64], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row in rows {
            if let Ok(permission) = row?.parse() {
                results.push(permission);
            }
        }
        Ok(results)
    }
}
