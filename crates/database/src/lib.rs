//! SQLite persistence layer for the extension companion service.
//!
//! This crate provides async database operations for users, premium status
//! copies, billing records, usage sessions and daily limits using SQLx with
//! SQLite.
//!
//! Single-statement operations are generic over [`sqlx::Executor`] so they can
//! run against the pool or inside a caller's transaction.
//!
//! # Example
//!
//! ```no_run
//! use database::{Database, user};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:companion.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Record a sign-in
//!     let identity = user::UserIdentity {
//!         id: "Xy12abcDEF",
//!         email: Some("bob@example.com"),
//!         display_name: Some("Bob"),
//!     };
//!     user::upsert_user(db.pool(), &identity, 1_700_000_000).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth_claims;
pub mod billing;
pub mod daily_limit;
pub mod device;
pub mod error;
pub mod models;
pub mod premium_user;
pub mod session;
pub mod usage_counter;
pub mod user;
pub mod validation;
pub mod webhook_event;

pub use error::{DatabaseError, Result};
pub use models::{
    AuthClaims, BillingCustomer, BillingSubscription, DailyLimit, PremiumUser, Session,
    SessionStatus, SubscriptionTier, UsageCounter, User, UserDevice,
};
pub use validation::ValidationError;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;

/// Open a read-modify-write transaction.
///
/// `BEGIN IMMEDIATE` takes the write lock before the first read, so
/// concurrent writers wait on `busy_timeout` instead of failing with
/// `SQLITE_BUSY` when a deferred transaction tries to upgrade its lock.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// let db = database::Database::connect("sqlite:data/companion.db?mode=rwc").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to database: {} (pool size: {})",
            url,
            pool_size
        );

        Ok(Self { pool })
    }

    /// Open a migrated in-memory database.
    ///
    /// Every SQLite connection to `:memory:` gets its own database, so the pool
    /// is pinned to a single connection.
    pub async fn in_memory() -> Result<Self> {
        let db = Self::connect_with_pool_size("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_741_000_000;

    fn sample_session(id: &str, fingerprint: &str, last_heartbeat_at: i64) -> Session {
        Session {
            id: id.to_string(),
            user_id: None,
            device_fingerprint: fingerprint.to_string(),
            subscription_tier: SubscriptionTier::Anonymous,
            is_premium: false,
            status: SessionStatus::Active,
            heartbeat_count: 0,
            usage_seconds: 0,
            created_at: last_heartbeat_at,
            last_heartbeat_at,
            ended_at: None,
            end_reason: None,
        }
    }

    #[tokio::test]
    async fn test_user_upsert_and_legacy_premium() {
        let db = Database::in_memory().await.unwrap();

        let identity = user::UserIdentity {
            id: "uid-alice",
            email: Some("alice@example.com"),
            display_name: Some("Alice"),
        };
        user::upsert_user(db.pool(), &identity, NOW).await.unwrap();

        let fetched = user::get_user(db.pool(), "uid-alice").await.unwrap();
        assert_eq!(fetched.subscription_tier, SubscriptionTier::Limited);
        assert!(!fetched.is_premium);
        assert_eq!(fetched.created_at, NOW);

        // A later sign-in without a display name keeps the stored one
        let again = user::UserIdentity {
            id: "uid-alice",
            email: Some("alice@example.com"),
            display_name: None,
        };
        user::upsert_user(db.pool(), &again, NOW + 60).await.unwrap();
        let fetched = user::get_user(db.pool(), "uid-alice").await.unwrap();
        assert_eq!(fetched.display_name.as_deref(), Some("Alice"));
        assert_eq!(fetched.created_at, NOW);
        assert_eq!(fetched.last_seen_at, NOW + 60);

        user::set_legacy_premium(db.pool(), "uid-alice", true, Some("sub_1AbCdEfGh"), NOW)
            .await
            .unwrap();
        let fetched = user::get_user(db.pool(), "uid-alice").await.unwrap();
        assert!(fetched.is_premium);
        assert_eq!(fetched.subscription_tier, SubscriptionTier::Premium);

        let by_email = user::find_user_by_email(db.pool(), "ALICE@example.com")
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.id), Some("uid-alice".to_string()));

        let tiers = user::count_users_by_tier(db.pool()).await.unwrap();
        assert_eq!(tiers, vec![(SubscriptionTier::Premium, 1)]);

        user::delete_user(db.pool(), "uid-alice").await.unwrap();
        let result = user::get_user(db.pool(), "uid-alice").await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_legacy_premium_requires_user() {
        let db = Database::in_memory().await.unwrap();
        let result = user::set_legacy_premium(db.pool(), "ghost", true, None, NOW).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_usage_counter_accumulates_per_day() {
        let db = Database::in_memory().await.unwrap();
        let subject = usage_counter::device_subject("fp-1");

        let total = usage_counter::add_usage(db.pool(), &subject, "2025-03-01", 30, NOW)
            .await
            .unwrap();
        assert_eq!(total, 30);
        let total = usage_counter::add_usage(db.pool(), &subject, "2025-03-01", 45, NOW)
            .await
            .unwrap();
        assert_eq!(total, 75);

        let other_day = usage_counter::get_usage(db.pool(), &subject, "2025-03-02")
            .await
            .unwrap();
        assert_eq!(other_day, 0);

        assert!(usage_counter::reset_usage(db.pool(), &subject, "2025-03-01")
            .await
            .unwrap());
        let cleared = usage_counter::get_usage(db.pool(), &subject, "2025-03-01")
            .await
            .unwrap();
        assert_eq!(cleared, 0);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let db = Database::in_memory().await.unwrap();

        session::create_session(db.pool(), &sample_session("s-1", "fp-1", NOW))
            .await
            .unwrap();
        let duplicate = session::create_session(db.pool(), &sample_session("s-1", "fp-1", NOW)).await;
        assert!(matches!(duplicate, Err(DatabaseError::AlreadyExists { .. })));

        session::record_heartbeat(db.pool(), "s-1", 30, NOW + 30)
            .await
            .unwrap();
        let fetched = session::find_session(db.pool(), "s-1").await.unwrap().unwrap();
        assert_eq!(fetched.heartbeat_count, 1);
        assert_eq!(fetched.usage_seconds, 30);
        assert_eq!(fetched.last_heartbeat_at, NOW + 30);

        let closed = session::close_session(db.pool(), "s-1", SessionStatus::Expired, "ended", NOW + 40)
            .await
            .unwrap();
        assert!(closed);
        let closed_again =
            session::close_session(db.pool(), "s-1", SessionStatus::Timeout, "timeout", NOW + 50)
                .await
                .unwrap();
        assert!(!closed_again);

        let result = session::record_heartbeat(db.pool(), "s-1", 30, NOW + 60).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_timeout_stale_sessions() {
        let db = Database::in_memory().await.unwrap();

        session::create_session(db.pool(), &sample_session("old", "fp-1", NOW - 600))
            .await
            .unwrap();
        session::create_session(db.pool(), &sample_session("fresh", "fp-2", NOW - 10))
            .await
            .unwrap();

        let swept = session::timeout_stale_sessions(db.pool(), NOW - 120, NOW)
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let old = session::find_session(db.pool(), "old").await.unwrap().unwrap();
        assert_eq!(old.status, SessionStatus::Timeout);
        let fresh = session::find_session(db.pool(), "fresh").await.unwrap().unwrap();
        assert_eq!(fresh.status, SessionStatus::Active);

        let counts = session::count_sessions_by_status(db.pool()).await.unwrap();
        assert!(counts.contains(&(SessionStatus::Active, 1)));
        assert!(counts.contains(&(SessionStatus::Timeout, 1)));
    }

    #[tokio::test]
    async fn test_daily_limit_records() {
        let db = Database::in_memory().await.unwrap();
        let id = DailyLimit::key("fp-1", "2025-03-01");
        let record = DailyLimit {
            id: id.clone(),
            device_fingerprint: "fp-1".to_string(),
            usage_date: "2025-03-01".to_string(),
            user_id: None,
            activated: false,
            activated_at: None,
            used_seconds: 0,
            limit_seconds: 3600,
            override_note: None,
            updated_at: NOW,
        };

        assert!(daily_limit::insert_if_missing(db.pool(), &record).await.unwrap());
        assert!(!daily_limit::insert_if_missing(db.pool(), &record).await.unwrap());

        let mut stored = daily_limit::find_daily_limit(db.pool(), &id)
            .await
            .unwrap()
            .unwrap();
        stored.activated = true;
        stored.used_seconds = 600;
        daily_limit::save_daily_limit(db.pool(), &stored).await.unwrap();

        let fetched = daily_limit::find_daily_limit(db.pool(), &id)
            .await
            .unwrap()
            .unwrap();
        assert!(fetched.activated);
        assert_eq!(fetched.remaining_seconds(), 3000);

        let purged = daily_limit::purge_before(db.pool(), "2025-03-02").await.unwrap();
        assert_eq!(purged, 1);
        assert!(!daily_limit::delete_daily_limit(db.pool(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_billing_customer_is_unique_per_stripe_id() {
        let db = Database::in_memory().await.unwrap();

        let customer = BillingCustomer {
            user_id: "uid-a".to_string(),
            stripe_customer_id: "cus_123".to_string(),
            email: None,
            created_at: NOW,
        };
        billing::upsert_customer(db.pool(), &customer).await.unwrap();

        let clash = BillingCustomer {
            user_id: "uid-b".to_string(),
            ..customer.clone()
        };
        let result = billing::upsert_customer(db.pool(), &clash).await;
        assert!(matches!(result, Err(DatabaseError::AlreadyExists { .. })));

        let found = billing::find_customer_by_stripe_id(db.pool(), "cus_123")
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.user_id), Some("uid-a".to_string()));
    }

    #[tokio::test]
    async fn test_webhook_event_recorded_once() {
        let db = Database::in_memory().await.unwrap();
        assert!(webhook_event::record_event(db.pool(), "evt_1", "invoice.paid", NOW)
            .await
            .unwrap());
        assert!(!webhook_event::record_event(db.pool(), "evt_1", "invoice.paid", NOW)
            .await
            .unwrap());
    }
}
