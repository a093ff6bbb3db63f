//! Premium status resolution, session metering and daily limits.
//!
//! - [`premium`] reconciles the copies of a user's premium status.
//! - [`session`] tracks heartbeat sessions against the daily quota.
//! - [`daily_limit`] manages the per-device free daily hour.
//!
//! All operations take the current time as Unix seconds so callers (and
//! tests) control the clock.

pub mod daily_limit;
pub mod error;
pub mod policy;
pub mod premium;
pub mod session;

pub use error::{EntitlementError, Result};
pub use policy::UsagePolicy;
pub use premium::{PremiumResolution, PremiumSource, PremiumUpdate, SourceReport};

use chrono::{DateTime, Utc};

/// Current time as Unix seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// UTC calendar date (`YYYY-MM-DD`) containing the given instant.
pub fn usage_date(now: i64) -> String {
    DateTime::<Utc>::from_timestamp(now, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}
