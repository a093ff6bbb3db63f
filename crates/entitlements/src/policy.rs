//! Usage metering policy.

use serde::{Deserialize, Serialize};

/// Limits and timings shared by the session tracker and the daily limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePolicy {
    /// Free usage allowed per calendar day for non-premium users.
    pub daily_quota_secs: i64,
    /// Interval clients are told to send heartbeats at.
    pub heartbeat_interval_secs: i64,
    /// A session with no heartbeat for this long is timed out.
    pub session_timeout_secs: i64,
    /// Most usage a single heartbeat can credit.
    pub max_credit_secs: i64,
}

impl Default for UsagePolicy {
    fn default() -> Self {
        Self {
            daily_quota_secs: 3600,
            heartbeat_interval_secs: 30,
            session_timeout_secs: 120,
            max_credit_secs: 60,
        }
    }
}

impl UsagePolicy {
    /// Check that the values are usable together.
    pub fn validate(&self) -> Result<(), String> {
        if self.daily_quota_secs <= 0 {
            return Err("daily quota must be positive".to_string());
        }
        if self.heartbeat_interval_secs <= 0 {
            return Err("heartbeat interval must be positive".to_string());
        }
        if self.session_timeout_secs <= self.heartbeat_interval_secs {
            return Err("session timeout must exceed the heartbeat interval".to_string());
        }
        if self.max_credit_secs < self.heartbeat_interval_secs {
            return Err("max credit must cover at least one heartbeat interval".to_string());
        }
        Ok(())
    }
}
