// Storage traits for credentials, lockout counters, the refresh token ledger,
// and per-IP login windows

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{LoginAttempt, LoginIpLimit, RefreshToken, User},
};

pub use memory::MemoryAuthRepository;
pub use postgres::PgAuthRepository;

/// Sole-admin credential storage
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a user by normalized username
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError>;

    /// Insert the first user or overwrite the earliest-created one, then delete
    /// every other row, all in one transaction
    ///
    /// `password_hash` must already be a salted one-way hash.
    async fn upsert_sole_user(
        &self,
        username: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError>;
}

/// Per-username failure counting with timed lockout
#[async_trait]
pub trait LoginAttemptTracker: Send + Sync {
    /// Current counter and lock; zero/none when no row exists
    async fn get_attempt(&self, username: &str) -> Result<LoginAttempt, AuthError>;

    /// Record one failure under a row-level lock
    ///
    /// Returns the lock deadline when the username is (or just became) locked.
    /// An active lock is returned unchanged without counting the failure.
    /// Reaching `max_attempts` starts a lock of `lock_duration` and resets the
    /// counter to zero.
    async fn register_failure(
        &self,
        username: &str,
        max_attempts: u32,
        lock_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AuthError>;

    /// Delete the row so the next failure starts from zero
    async fn reset(&self, username: &str) -> Result<(), AuthError>;

    /// Delete up to `limit` rows last touched before `cutoff` that are not locked at `now`
    async fn delete_stale_attempts(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, AuthError>;
}

/// Hashed refresh token chain with atomic rotation
///
/// Every method takes the raw bearer secret and hashes it before touching
/// storage; raw secrets are never persisted.
#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    async fn create(
        &self,
        user_id: Uuid,
        raw_token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, AuthError>;

    /// Validate `raw_old_token` and replace it with `raw_new_token` in one transaction
    ///
    /// Fails with `InvalidRefreshToken` when the old token is unknown, revoked,
    /// or expired at `now`. On success the old record carries `revoked_at = now`
    /// and `replaced_by` = the new record's id, and the owning user id is returned.
    async fn rotate(
        &self,
        raw_old_token: &str,
        raw_new_token: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Uuid, AuthError>;

    /// Set `revoked_at` if still unset; returns false when no record matches
    async fn revoke(&self, raw_token: &str, now: DateTime<Utc>) -> Result<bool, AuthError>;

    /// Delete up to `limit` records expired or revoked before `cutoff`
    async fn delete_stale_tokens(&self, cutoff: DateTime<Utc>, limit: i64)
        -> Result<u64, AuthError>;
}

/// Shared fixed-window counters keyed by client IP
#[async_trait]
pub trait LoginIpLimitStore: Send + Sync {
    /// Count one hit for `ip` as a single atomic read-modify-write
    ///
    /// When the stored window started at or before `now - window` it restarts
    /// at `now` with one hit; otherwise the hit count is incremented. Returns
    /// the row as it stands after the hit.
    async fn record_hit(
        &self,
        ip: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<LoginIpLimit, AuthError>;

    /// Delete up to `limit` rows whose window started before `cutoff`
    async fn delete_stale_limits(&self, cutoff: DateTime<Utc>, limit: i64)
        -> Result<u64, AuthError>;
}

/// Liveness check for the backing store
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), AuthError>;
}
