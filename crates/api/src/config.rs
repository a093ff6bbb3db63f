//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use billing::StripeConfig;
use entitlements::UsagePolicy;
use secrecy::SecretString;

/// Default lifetime of an app-issued bearer token (7 days).
const DEFAULT_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// HS256 key for app-issued bearer tokens.
    pub jwt_secret: SecretString,
    /// Bearer token lifetime in seconds.
    pub token_ttl_secs: i64,
    /// Key expected in the `X-Admin-Key` header. Admin routes are closed when unset.
    pub admin_api_key: Option<SecretString>,
    /// Firebase project whose ID tokens are accepted.
    pub firebase_project_id: String,
    /// Session metering policy.
    pub policy: UsagePolicy,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
    /// Days of daily-limit records kept by the sweeper.
    pub daily_limit_retention_days: i64,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    /// Stripe settings; billing routes answer 503 without them.
    pub stripe: Option<StripeConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `API_ADDR` | Server bind address | `127.0.0.1:8787` |
    /// | `SQLITE_PATH` | SQLite database URL | `sqlite:entitlements.db?mode=rwc` |
    /// | `JWT_SECRET` | Signing key for bearer tokens | (required) |
    /// | `TOKEN_TTL_SECS` | Bearer token lifetime | `604800` |
    /// | `ADMIN_API_KEY` | Admin route key | (unset: admin closed) |
    /// | `FIREBASE_PROJECT_ID` | Accepted Firebase project | (required) |
    /// | `DAILY_QUOTA_SECS` | Free usage per day | `3600` |
    /// | `HEARTBEAT_INTERVAL_SECS` | Expected heartbeat cadence | `30` |
    /// | `SESSION_TIMEOUT_SECS` | Heartbeat gap that ends a session | `120` |
    /// | `MAX_CREDIT_SECS` | Most seconds credited per heartbeat | `60` |
    /// | `SWEEP_INTERVAL_SECS` | Background sweep period | `60` |
    /// | `DAILY_LIMIT_RETENTION_DAYS` | Daily-limit records kept | `7` |
    /// | `CORS_ORIGINS` | Comma-separated allowed origins | (any) |
    /// | `STRIPE_SECRET_KEY` | Enables billing (see `StripeConfig::from_env`) | (unset) |
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("API_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8787".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = env::var("SQLITE_PATH")
            .unwrap_or_else(|_| "sqlite:entitlements.db?mode=rwc".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretString::from)
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let firebase_project_id = env::var("FIREBASE_PROJECT_ID")
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing("FIREBASE_PROJECT_ID"))?;

        let admin_api_key = env::var("ADMIN_API_KEY")
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretString::from);

        let defaults = UsagePolicy::default();
        let policy = UsagePolicy {
            daily_quota_secs: parse_or("DAILY_QUOTA_SECS", defaults.daily_quota_secs)?,
            heartbeat_interval_secs: parse_or(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            )?,
            session_timeout_secs: parse_or("SESSION_TIMEOUT_SECS", defaults.session_timeout_secs)?,
            max_credit_secs: parse_or("MAX_CREDIT_SECS", defaults.max_credit_secs)?,
        };
        policy.validate().map_err(ConfigError::InvalidPolicy)?;

        let sweep_secs: u64 = parse_or("SWEEP_INTERVAL_SECS", 60)?;
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidNumber("SWEEP_INTERVAL_SECS"));
        }

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let stripe = match env::var("STRIPE_SECRET_KEY") {
            Ok(key) if !key.is_empty() => Some(
                StripeConfig::from_env().map_err(|e| ConfigError::Stripe(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            addr,
            database_url,
            jwt_secret,
            token_ttl_secs: parse_or("TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?,
            admin_api_key,
            firebase_project_id,
            policy,
            sweep_interval: Duration::from_secs(sweep_secs),
            daily_limit_retention_days: retention_days(parse_or("DAILY_LIMIT_RETENTION_DAYS", 7)?)?,
            cors_origins,
            stripe,
        })
    }
}

fn retention_days(days: i64) -> Result<i64, ConfigError> {
    if days < 1 {
        return Err(ConfigError::InvalidNumber("DAILY_LIMIT_RETENTION_DAYS"));
    }
    Ok(days)
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(var)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid API_ADDR format")]
    InvalidAddr,

    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{0} must be a positive number")]
    InvalidNumber(&'static str),

    #[error("Invalid usage policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid Stripe configuration: {0}")]
    Stripe(String),
}
