//! Background housekeeping: times out silent sessions and purges old
//! daily-limit records.

use std::time::Duration;

use database::Database;
use entitlements::{daily_limit, session, unix_now, UsagePolicy};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: u64,
    pub purged: u64,
}

/// Periodic sweeper.
#[derive(Debug, Clone)]
pub struct Sweeper {
    db: Database,
    policy: UsagePolicy,
    period: Duration,
    retention_days: i64,
}

impl Sweeper {
    pub fn new(db: Database, policy: UsagePolicy, period: Duration, retention_days: i64) -> Self {
        Self {
            db,
            policy,
            period,
            retention_days,
        }
    }

    /// Run forever on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut ticker = interval(self.period);
        info!(period = ?self.period, retention_days = self.retention_days, "Starting sweeper");

        loop {
            ticker.tick().await;
            // Errors are logged inside; keep sweeping.
            let report = sweep_once(self.db.pool(), &self.policy, self.retention_days, unix_now()).await;
            debug!(timed_out = report.timed_out, purged = report.purged, "Sweep finished");
        }
    }
}

/// Run one sweep at `now`.
pub async fn sweep_once(
    pool: &SqlitePool,
    policy: &UsagePolicy,
    retention_days: i64,
    now: i64,
) -> SweepReport {
    let mut report = SweepReport::default();

    match session::sweep_timeouts(pool, policy, now).await {
        Ok(count) => report.timed_out = count,
        Err(e) => error!("Session sweep failed: {}", e),
    }

    match daily_limit::purge_expired(pool, retention_days, now).await {
        Ok(count) => report.purged = count,
        Err(e) => error!("Daily limit purge failed: {}", e),
    }

    report
}
