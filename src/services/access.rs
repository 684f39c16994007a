use crate::db::{Database, Permission};
use crate::error::DbResult;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Result of the pre-call gate for an AI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Blocked,
    /// Admins are not metered.
    Admin,
    Allowed { used: i64, limit: i64 },
    QuotaExceeded { limit: i64 },
}

/// Blocked/admin/quota checks and the daily usage counter.
pub struct AccessGate {
    db: Database,
    admin_user_ids: HashSet<u64>,
    default_limit: i64,
}

impl AccessGate {
    pub fn new(db: Database, admin_user_ids: &[u64], default_limit: i64) -> Self {
        Self {
            db,
            admin_user_ids: admin_user_ids.iter().copied().collect(),
            default_limit,
        }
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_user_ids.contains(&user_id)
    }

    /// Admin commands need a configured admin that is not blocked.
    pub async fn check_admin(&self, user_id: u64) -> DbResult<bool> {
        if !self.is_admin(user_id) {
            return Ok(false);
        }
        Ok(!self.is_blocked(user_id).await?)
    }

    pub async fn is_blocked(&self, user_id: u64) -> DbResult<bool> {
        self.db
            .run_blocking(move |db| db.has_permission(user_id, Permission::Blocked))
            .await
    }

    /// Beta commands are open to beta users and admins.
    pub async fn is_beta(&self, user_id: u64) -> DbResult<bool> {
        if self.is_admin(user_id) {
            return Ok(true);
        }
        self.db
            .run_blocking(move |db| db.has_permission(user_id, Permission::Beta))
            .await
    }

    /// Daily limit for `user_id`: per-user override, then stored default, then config.
    pub async fn limit_for(&self, user_id: u64) -> DbResult<i64> {
        let fallback = self.default_limit;
        self.db
            .run_blocking(move |db| {
                if let Some(limit) = db.get_user_limit(user_id)? {
                    return Ok(limit);
                }
                Ok(db.get_default_limit()?.unwrap_or(fallback))
            })
            .await
    }

    pub async fn check(&self, user_id: u64) -> DbResult<Access> {
        let today = self.db.today();
        self.check_on(user_id, today).await
    }

    pub async fn check_on(&self, user_id: u64, date: NaiveDate) -> DbResult<Access> {
        if self.is_blocked(user_id).await? {
            return Ok(Access::Blocked);
        }
        if self.is_admin(user_id) {
            return Ok(Access::Admin);
        }

        let limit = self.limit_for(user_id).await?;
        let used = self.usage_on(user_id, date).await?;
        if used < limit {
            Ok(Access::Allowed { used, limit })
        } else {
            Ok(Access::QuotaExceeded { limit })
        }
    }

    /// Count one successful AI call. Returns the new daily total.
    pub async fn record_call(&self, user_id: u64) -> DbResult<i64> {
        let today = self.db.today();
        self.record_call_on(user_id, today).await
    }

    pub async fn record_call_on(&self, user_id: u64, date: NaiveDate) -> DbResult<i64> {
        self.db
            .run_blocking(move |db| db.increment_usage(user_id, date))
            .await
    }

    pub async fn usage_on(&self, user_id: u64, date: NaiveDate) -> DbResult<i64> {
        self.db
            .run_blocking(move |db| db.get_daily_usage(user_id, date))
            .await
    }

    pub async fn usage_today(&self, user_id: u64) -> DbResult<i64> {
        let today = self.db.today();
        self.usage_on(user_id, today).await
    }

    pub async fn set_limit(&self, user_id: Option<u64>, limit: i64) -> DbResult<()> {
        self.db
            .run_blocking(move |db| match user_id {
                Some(user_id) => db.set_user_limit(user_id, limit),
                None => db.set_default_limit(limit),
            })
            .await
    }

    pub async fn default_limit(&self) -> DbResult<i64> {
        let fallback = self.default_limit;
        self.db
            .run_blocking(move |db| Ok(db.get_default_limit()?.unwrap_or(fallback)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn gate() -> (AccessGate, Database) {
        let db = test_db();
        (AccessGate::new(db.clone(), &[1], 5), db)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[tokio::test]
    async fn test_five_calls_then_quota_exceeded() {
        let (gate, _db) = gate();

        for expected_used in 0..5 {
            let access = gate.check_on(7, day(25)).await.unwrap();
            assert_eq!(
                access,
                Access::Allowed {
                    used: expected_used,
                    limit: 5
                }
            );
            gate.record_call_on(7, day(25)).await.unwrap();
        }
        assert_eq!(gate.usage_on(7, day(25)).await.unwrap(), 5);

        // Refused on every further attempt the same day
        for _ in 0..3 {
            assert_eq!(
                gate.check_on(7, day(25)).await.unwrap(),
                Access::QuotaExceeded { limit: 5 }
            );
        }
        assert_eq!(gate.usage_on(7, day(25)).await.unwrap(), 5);

        // A new date starts a fresh counter
        assert_eq!(
            gate.check_on(7, day(26)).await.unwrap(),
            Access::Allowed { used: 0, limit: 5 }
        );
    }

    #[tokio::test]
    async fn test_blocked_beats_admin() {
        let (gate, db) = gate();
        assert_eq!(gate.check_on(1, day(25)).await.unwrap(), Access::Admin);

        db.grant_permission(1, Permission::Blocked, None).unwrap();
        assert_eq!(gate.check_on(1, day(25)).await.unwrap(), Access::Blocked);
    }

    #[tokio::test]
    async fn test_blocked_admin_loses_admin_commands() {
        let (gate, db) = gate();
        assert!(gate.check_admin(1).await.unwrap());
        assert!(!gate.check_admin(7).await.unwrap());

        db.grant_permission(1, Permission::Blocked, None).unwrap();
        assert!(!gate.check_admin(1).await.unwrap());

        db.revoke_permission(1, Permission::Blocked).unwrap();
        assert!(gate.check_admin(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_bypasses_quota() {
        let (gate, _db) = gate();
        for _ in 0..10 {
            gate.record_call_on(1, day(25)).await.unwrap();
        }
        assert_eq!(gate.check_on(1, day(25)).await.unwrap(), Access::Admin);
    }

    #[tokio::test]
    async fn test_limit_overrides() {
        let (gate, _db) = gate();
        assert_eq!(gate.limit_for(7).await.unwrap(), 5);

        gate.set_limit(None, 8).await.unwrap();
        assert_eq!(gate.limit_for(7).await.unwrap(), 8);
        assert_eq!(gate.default_limit().await.unwrap(), 8);

        gate.set_limit(Some(7), 1).await.unwrap();
        assert_eq!(gate.limit_for(7).await.unwrap(), 1);
        assert_eq!(gate.limit_for(9).await.unwrap(), 8);

        gate.record_call_on(7, day(25)).await.unwrap();
        assert_eq!(
            gate.check_on(7, day(25)).await.unwrap(),
            Access::QuotaExceeded { limit: 1 }
        );
    }

    #[tokio::test]
    async fn test_beta_tier() {
        let (gate, db) = gate();
        assert!(gate.is_beta(1).await.unwrap());
        assert!(!gate.is_beta(7).await.unwrap());
        db.grant_permission(7, Permission::Beta, Some(1)).unwrap();
        assert!(gate.is_beta(7).await.unwrap());
    }
}
