use crate::db::Database;
use crate::services::thread_session::{ThreadSessionStore, CLEANUP_INTERVAL_SECS};
use chrono::{DateTime, Days, TimeZone};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, error, info};

/// Moderation log rows are kept this long.
pub const MODERATION_LOG_RETENTION_DAYS: i64 = 30;

/// Background jobs: nightly usage/log cleanup and expiry of `/talk` sessions.
pub struct Scheduler {
    db: Database,
    sessions: Arc<ThreadSessionStore>,
}

/// Time left until the next local midnight in `now`'s timezone.
pub fn until_next_midnight(now: DateTime<Tz>) -> Duration {
    let tz = now.timezone();
    let next = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest());

    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(1)),
        None => Duration::from_secs(24 * 60 * 60),
    }
}

impl Scheduler {
    pub fn new(db: Database, sessions: Arc<ThreadSessionStore>) -> Self {
        Self { db, sessions }
    }

    pub fn spawn(self) {
        let db = self.db.clone();
        tokio::spawn(async move {
            loop {
                let now = chrono::Utc::now().with_timezone(&db.timezone());
                let wait = until_next_midnight(now);
                debug!("Scheduler: next daily maintenance in {}s", wait.as_secs());
                sleep(wait).await;
                if let Err(e) = run_daily_maintenance(&db).await {
                    error!("Scheduler: daily maintenance failed: {}", e);
                }
                // Guard against waking a hair before midnight and running twice
                sleep(Duration::from_secs(1)).await;
            }
        });

        let sessions = self.sessions;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sessions.cleanup_expired();
            }
        });
    }
}

/// Drop usage counters older than yesterday and stale moderation logs.
pub async fn run_daily_maintenance(db: &Database) -> anyhow::Result<()> {
    let today = db.today();
    let yesterday = today
        .checked_sub_days(Days::new(1))
        .unwrap_or(today);

    let (usage_rows, log_rows) = db
        .run_blocking(move |db| {
            let usage_rows = db.purge_usage_before(yesterday)?;
            let log_rows = db.cleanup_moderation_logs(MODERATION_LOG_RETENTION_DAYS)?;
            Ok((usage_rows, log_rows))
        })
        .await?;

    info!(
        "Scheduler: purged {} usage rows and {} moderation log rows",
        usage_rows, log_rows
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use chrono::NaiveDate;

    #[test]
    fn test_until_next_midnight() {
        let tz = chrono_tz::Asia::Tokyo;
        let now = tz.with_ymd_and_hms(2025, 7, 25, 23, 30, 0).unwrap();
        assert_eq!(until_next_midnight(now), Duration::from_secs(30 * 60));

        let now = tz.with_ymd_and_hms(2025, 7, 25, 0, 0, 0).unwrap();
        assert_eq!(until_next_midnight(now), Duration::from_secs(24 * 60 * 60));
    }

    #[tokio::test]
    async fn test_daily_maintenance_keeps_yesterday() {
        let db = test_db();
        let today = db.today();
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap();
        let old = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();

        db.increment_usage(7, old).unwrap();
        db.increment_usage(7, yesterday).unwrap();
        db.increment_usage(7, today).unwrap();

        run_daily_maintenance(&db).await.unwrap();

        assert_eq!(db.get_daily_usage(7, old).unwrap(), 0);
        assert_eq!(db.get_daily_usage(7, yesterday).unwrap(), 1);
        assert_eq!(db.get_daily_usage(7, today).unwrap(), 1);
    }
}
