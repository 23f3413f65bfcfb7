// Application configuration
//
// Values come from the process environment. Numeric settings that are
// missing, unparsable, or not positive fall back to their defaults, as do
// durations longer than `MAX_DURATION_DAYS`.

use chrono::Duration;
use std::fmt;
use std::str::FromStr;

use crate::auth::password::PasswordHashParams;
use crate::auth::rate_limit::DEFAULT_MAX_TRACKED_IPS;
use crate::error::StartupError;

/// Upper bound for any configured duration
const MAX_DURATION_DAYS: i64 = 36_500;

/// Lockout and token lifetime policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityConfig {
    pub max_login_attempts: u32,
    pub lock_duration: Duration,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lock_duration: Duration::minutes(15),
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::hours(168),
        }
    }
}

/// Where login rate-limit counters live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    /// Shared fixed-window counters in the database
    Store,
    /// Per-process sliding window
    Memory,
}

impl FromStr for RateLimitBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "store" | "database" => Ok(RateLimitBackend::Store),
            "memory" | "in-memory" => Ok(RateLimitBackend::Memory),
            other => Err(format!("unknown rate limit backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_hits: u32,
    pub window: Duration,
    pub backend: RateLimitBackend,
    pub max_tracked_ips: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_hits: 10,
            window: Duration::seconds(60),
            backend: RateLimitBackend::Store,
            max_tracked_ips: DEFAULT_MAX_TRACKED_IPS,
        }
    }
}

/// Retention cleanup settings
#[derive(Clone, PartialEq, Eq)]
pub struct CleanupConfig {
    pub refresh_retention: Duration,
    pub login_attempt_retention: Duration,
    pub batch_size: i64,
    /// Bearer secret for the cleanup endpoint; the endpoint is disabled when unset
    pub cron_secret: Option<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            refresh_retention: Duration::days(14),
            login_attempt_retention: Duration::days(30),
            batch_size: 500,
            cron_secret: None,
        }
    }
}

impl fmt::Debug for CleanupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupConfig")
            .field("refresh_retention", &self.refresh_retention)
            .field("login_attempt_retention", &self.login_attempt_retention)
            .field("batch_size", &self.batch_size)
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Full application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_acquire_timeout: std::time::Duration,
    /// Upper bound on any single auth storage operation
    pub db_operation_timeout: std::time::Duration,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub cleanup: CleanupConfig,
    pub password_hash: PasswordHashParams,
    pub admin_username: String,
    pub admin_password: String,
    pub trust_forwarded_for: bool,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_acquire_timeout", &self.db_acquire_timeout)
            .field("db_operation_timeout", &self.db_operation_timeout)
            .field("security", &self.security)
            .field("rate_limit", &self.rate_limit)
            .field("cleanup", &self.cleanup)
            .field("password_hash", &self.password_hash)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from environment variables
    pub fn from_env() -> Result<Self, StartupError> {
        let argon_defaults = PasswordHashParams::default();

        let rate_limit_backend = match env_trimmed("LOGIN_RATE_LIMIT_BACKEND") {
            Some(value) => value.parse().map_err(StartupError::Config)?,
            None => RateLimitBackend::Store,
        };

        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            jwt_secret: required_env("JWT_SECRET")?,
            host: env_trimmed("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_positive("PORT", 8080u16),
            db_max_connections: env_positive("DB_MAX_CONNECTIONS", 10u32),
            db_acquire_timeout: std::time::Duration::from_secs(env_positive(
                "DB_ACQUIRE_TIMEOUT_SECONDS",
                3u64,
            )),
            db_operation_timeout: std::time::Duration::from_secs(env_positive(
                "DB_OPERATION_TIMEOUT_SECONDS",
                5u64,
            )),
            security: SecurityConfig {
                max_login_attempts: env_positive("LOGIN_MAX_ATTEMPTS", 5u32),
                lock_duration: env_duration("LOGIN_LOCK_MINUTES", 15, Duration::try_minutes),
                access_token_ttl: env_duration("ACCESS_TOKEN_TTL_MINUTES", 15, Duration::try_minutes),
                refresh_token_ttl: env_duration("REFRESH_TOKEN_TTL_HOURS", 168, Duration::try_hours),
            },
            rate_limit: RateLimitConfig {
                max_hits: env_positive("LOGIN_RATE_LIMIT_MAX", 10u32),
                window: env_duration("LOGIN_RATE_LIMIT_WINDOW_SECONDS", 60, Duration::try_seconds),
                backend: rate_limit_backend,
                max_tracked_ips: env_positive(
                    "LOGIN_RATE_LIMIT_MAX_TRACKED_IPS",
                    DEFAULT_MAX_TRACKED_IPS,
                ),
            },
            cleanup: CleanupConfig {
                refresh_retention: env_duration(
                    "AUTH_REFRESH_TOKEN_RETENTION_DAYS",
                    14,
                    Duration::try_days,
                ),
                login_attempt_retention: env_duration(
                    "AUTH_LOGIN_ATTEMPT_RETENTION_DAYS",
                    30,
                    Duration::try_days,
                ),
                batch_size: env_positive("AUTH_CLEANUP_BATCH_SIZE", 500i64),
                cron_secret: env_trimmed("CRON_SECRET"),
            },
            password_hash: PasswordHashParams {
                memory_kib: env_positive("ARGON2_MEMORY_KIB", argon_defaults.memory_kib),
                iterations: env_positive("ARGON2_ITERATIONS", argon_defaults.iterations),
                parallelism: env_positive("ARGON2_PARALLELISM", argon_defaults.parallelism),
            },
            admin_username: env_trimmed("ADMIN_USERNAME").unwrap_or_default(),
            admin_password: env_trimmed("ADMIN_PASSWORD").unwrap_or_default(),
            trust_forwarded_for: env_bool("TRUST_FORWARDED_FOR", true),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_env(name: &str) -> Result<String, StartupError> {
    env_trimmed(name).ok_or_else(|| StartupError::Config(format!("missing required env: {}", name)))
}

/// Parse a positive number, falling back on anything else
fn env_positive<T>(name: &str, fallback: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    env_trimmed(name)
        .and_then(|v| v.parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(fallback)
}

/// Positive count of `unit`s, falling back when it does not fit a sane duration
fn env_duration(name: &str, fallback: i64, unit: fn(i64) -> Option<Duration>) -> Duration {
    let ceiling = Duration::days(MAX_DURATION_DAYS);
    let fallback = unit(fallback).unwrap_or(ceiling);

    unit(env_positive(name, 0i64))
        .filter(|d| *d > Duration::zero() && *d <= ceiling)
        .unwrap_or(fallback)
}

fn env_bool(name: &str, fallback: bool) -> bool {
    match env_trimmed(name).map(|v| v.to_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => fallback,
    }
}
