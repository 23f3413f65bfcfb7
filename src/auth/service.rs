// Authentication service - business logic layer
//
// Login runs through rate limit, lockout, and credential checks in that
// order. Refresh rotates the presented token; logout revokes it.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{
    clock::Clock,
    error::AuthError,
    models::{CleanupReport, Tokens},
    password::PasswordService,
    rate_limit::LoginRateLimiter,
    repository::{
        CredentialStore, LoginAttemptTracker, LoginIpLimitStore, RefreshTokenLedger, StoreHealth,
    },
    token::{generate_refresh_token, TokenService},
};
use crate::config::AppConfig;

/// Lockout, lifetime, and rate-limit knobs the service enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    pub max_login_attempts: u32,
    pub lock_duration: Duration,
    pub refresh_token_ttl: Duration,
    pub rate_limit_max_hits: u32,
    pub rate_limit_window: Duration,
    /// Bound applied to every storage call
    pub operation_timeout: std::time::Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lock_duration: Duration::minutes(15),
            refresh_token_ttl: Duration::hours(168),
            rate_limit_max_hits: 10,
            rate_limit_window: Duration::seconds(60),
            operation_timeout: std::time::Duration::from_secs(5),
        }
    }
}

impl AuthPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_login_attempts: config.security.max_login_attempts,
            lock_duration: config.security.lock_duration,
            refresh_token_ttl: config.security.refresh_token_ttl,
            rate_limit_max_hits: config.rate_limit.max_hits,
            rate_limit_window: config.rate_limit.window,
            operation_timeout: config.db_operation_timeout,
        }
    }
}

/// Storage collaborators of the auth service
#[derive(Clone)]
pub struct AuthStores {
    pub credentials: Arc<dyn CredentialStore>,
    pub attempts: Arc<dyn LoginAttemptTracker>,
    pub ledger: Arc<dyn RefreshTokenLedger>,
    pub ip_limits: Arc<dyn LoginIpLimitStore>,
    pub health: Arc<dyn StoreHealth>,
}

impl AuthStores {
    /// Use one repository for every store
    pub fn from_repository<R>(repo: Arc<R>) -> Self
    where
        R: CredentialStore
            + LoginAttemptTracker
            + RefreshTokenLedger
            + LoginIpLimitStore
            + StoreHealth
            + 'static,
    {
        Self {
            credentials: repo.clone(),
            attempts: repo.clone(),
            ledger: repo.clone(),
            ip_limits: repo.clone(),
            health: repo,
        }
    }
}

/// Authentication service coordinating all auth operations
#[derive(Clone)]
pub struct AuthService {
    stores: AuthStores,
    rate_limiter: Arc<dyn LoginRateLimiter>,
    token_service: TokenService,
    password_service: PasswordService,
    clock: Arc<dyn Clock>,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        stores: AuthStores,
        rate_limiter: Arc<dyn LoginRateLimiter>,
        token_service: TokenService,
        password_service: PasswordService,
        clock: Arc<dyn Clock>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            stores,
            rate_limiter,
            token_service,
            password_service,
            clock,
            policy,
        }
    }

    pub fn token_service(&self) -> &TokenService {
        &self.token_service
    }

    /// Run a storage call under the operation timeout
    ///
    /// Dropping the timed-out future rolls back any transaction it held.
    async fn bounded<T, F>(&self, operation: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        tokio::time::timeout(self.policy.operation_timeout, operation)
            .await
            .map_err(|_| AuthError::Timeout)?
    }

    /// Authenticate a username/password pair from `client_ip`
    pub async fn login(
        &self,
        client_ip: &str,
        username: &str,
        password: &str,
    ) -> Result<Tokens, AuthError> {
        let username = username.trim().to_lowercase();
        let password = password.trim();
        let now = self.clock.now();

        let decision = self
            .bounded(self.rate_limiter.allow(
                client_ip,
                self.policy.rate_limit_max_hits,
                self.policy.rate_limit_window,
                now,
            ))
            .await?;
        if !decision.allowed {
            warn!(ip = %client_ip, retry_after = decision.retry_after.num_seconds(), "Login rate limited");
            return Err(AuthError::RateLimited {
                retry_after: decision.retry_after,
            });
        }

        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let attempt = self.bounded(self.stores.attempts.get_attempt(&username)).await?;
        if let Some(until) = attempt.active_lock(now) {
            debug!(username = %username, %until, "Login rejected: username locked");
            return Err(AuthError::locked(until, now));
        }

        let user = self
            .bounded(self.stores.credentials.find_by_username(&username))
            .await?;

        let authenticated = match &user {
            Some(user) => {
                self.password_service
                    .verify_password_blocking(password, &user.password_hash)
                    .await?
            }
            None => {
                self.password_service.equalize_timing(password).await?;
                false
            }
        };

        let user = match user {
            Some(user) if authenticated => user,
            _ => return Err(self.record_failure(&username, now).await),
        };

        self.bounded(self.stores.attempts.reset(&username)).await?;
        info!(user_id = %user.id, "Login succeeded");

        self.issue_tokens(user.id).await
    }

    /// Count a failed login and pick the error to return
    async fn record_failure(&self, username: &str, now: DateTime<Utc>) -> AuthError {
        warn!(username = %username, "Login failed: invalid credentials");

        if let Err(e) = shift(now, self.policy.lock_duration) {
            return e;
        }

        let locked = self
            .bounded(self.stores.attempts.register_failure(
                username,
                self.policy.max_login_attempts,
                self.policy.lock_duration,
                now,
            ))
            .await;

        match locked {
            Ok(Some(until)) => {
                warn!(username = %username, %until, "Login locked after repeated failures");
                AuthError::locked(until, now)
            }
            Ok(None) => AuthError::InvalidCredentials,
            Err(e) => e,
        }
    }

    async fn issue_tokens(&self, user_id: Uuid) -> Result<Tokens, AuthError> {
        let now = self.clock.now();
        let expires_at = shift(now, self.policy.refresh_token_ttl)?;
        let (access_token, expires_in) = self.token_service.issue_access(user_id)?;
        let refresh_token = generate_refresh_token();

        self.bounded(self.stores.ledger.create(user_id, &refresh_token, expires_at, now))
        .await?;

        Ok(Tokens::bearer(access_token, refresh_token, expires_in))
    }

    /// Exchange a refresh token for a fresh access/refresh pair
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<Tokens, AuthError> {
        let raw_refresh_token = raw_refresh_token.trim();
        if raw_refresh_token.is_empty() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let now = self.clock.now();
        let new_expires_at = shift(now, self.policy.refresh_token_ttl)?;
        let new_refresh_token = generate_refresh_token();

        let user_id = self
            .bounded(self.stores.ledger.rotate(
                raw_refresh_token,
                &new_refresh_token,
                new_expires_at,
                now,
            ))
            .await?;

        let (access_token, expires_in) = self.token_service.issue_access(user_id)?;
        debug!(user_id = %user_id, "Refresh token rotated");

        Ok(Tokens::bearer(access_token, new_refresh_token, expires_in))
    }

    /// Revoke a refresh token without issuing a successor
    ///
    /// Revoking an already revoked token succeeds and keeps the original
    /// revocation time.
    pub async fn logout(&self, raw_refresh_token: &str) -> Result<(), AuthError> {
        let raw_refresh_token = raw_refresh_token.trim();
        if raw_refresh_token.is_empty() {
            return Err(AuthError::ValidationError(
                "refresh_token is required".to_string(),
            ));
        }

        let now = self.clock.now();
        let found = self
            .bounded(self.stores.ledger.revoke(raw_refresh_token, now))
            .await?;

        if found {
            Ok(())
        } else {
            Err(AuthError::InvalidRefreshToken)
        }
    }

    /// Make `username`/`password` the sole credential pair
    ///
    /// Both empty is a no-op and returns `false`; exactly one empty is a
    /// configuration error.
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let username = username.trim().to_lowercase();
        let password = password.trim();

        match (username.is_empty(), password.is_empty()) {
            (true, true) => return Ok(false),
            (false, false) => {}
            _ => {
                return Err(AuthError::ConfigError(
                    "ADMIN_USERNAME and ADMIN_PASSWORD are required together".to_string(),
                ))
            }
        }

        let password_hash = self.password_service.hash_password_blocking(password).await?;
        let now = self.clock.now();
        let user = self
            .bounded(
                self.stores
                    .credentials
                    .upsert_sole_user(&username, &password_hash, now),
            )
            .await?;

        info!(user_id = %user.id, username = %user.username, "Admin credentials bootstrapped");
        Ok(true)
    }

    /// Delete stale ledger, lockout, and rate-limit rows in one batch-limited pass
    pub async fn cleanup(
        &self,
        refresh_retention: Duration,
        login_attempt_retention: Duration,
        batch_size: i64,
    ) -> Result<CleanupReport, AuthError> {
        let now = self.clock.now();
        let limit = batch_size.max(1);
        let token_cutoff = shift(now, -refresh_retention)?;
        let attempt_cutoff = shift(now, -login_attempt_retention)?;

        let deleted_refresh_tokens = self
            .bounded(self.stores.ledger.delete_stale_tokens(token_cutoff, limit))
            .await?;

        let deleted_login_attempts = self
            .bounded(
                self.stores
                    .attempts
                    .delete_stale_attempts(attempt_cutoff, now, limit),
            )
            .await?;

        let deleted_ip_limits = self
            .bounded(
                self.stores
                    .ip_limits
                    .delete_stale_limits(attempt_cutoff, limit),
            )
            .await?;

        let pruned = self
            .rate_limiter
            .prune(self.policy.rate_limit_window, now)
            .await;

        let report = CleanupReport {
            deleted_refresh_tokens,
            deleted_login_attempts,
            deleted_ip_limits,
        };
        info!(
            deleted_refresh_tokens,
            deleted_login_attempts,
            deleted_ip_limits,
            pruned_rate_limit_entries = pruned,
            "Auth retention cleanup finished"
        );

        Ok(report)
    }

    /// Verify a bearer access token and return its user id
    pub fn verify_access(&self, token: &str) -> Result<Uuid, AuthError> {
        self.token_service.verify_access(token)
    }

    /// Check the backing store answers within the operation timeout
    pub async fn ping(&self) -> Result<(), AuthError> {
        self.bounded(self.stores.health.ping()).await
    }
}

/// `at + by`, or a configuration error when the result leaves chrono's range
fn shift(at: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>, AuthError> {
    at.checked_add_signed(by).ok_or_else(|| {
        AuthError::ConfigError(format!(
            "duration of {}s is out of range",
            by.num_seconds()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        clock::ManualClock,
        models::{RefreshToken, User},
        password::PasswordHashParams,
        rate_limit::SlidingWindowRateLimiter,
        repository::MemoryAuthRepository,
    };
    use async_trait::async_trait;

    struct Harness {
        service: AuthService,
        repo: Arc<MemoryAuthRepository>,
        clock: ManualClock,
    }

    fn harness(policy: AuthPolicy) -> Harness {
        let repo = Arc::new(MemoryAuthRepository::new());
        let clock = ManualClock::new(DateTime::<Utc>::from_timestamp(1_900_000_000, 0).unwrap());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let service = AuthService::new(
            AuthStores::from_repository(repo.clone()),
            Arc::new(SlidingWindowRateLimiter::default()),
            TokenService::new("service-test-secret", Duration::minutes(15), shared_clock.clone()),
            PasswordService::new(PasswordHashParams {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            }),
            shared_clock,
            policy,
        );
        Harness {
            service,
            repo,
            clock,
        }
    }

    const PASSWORD: &str = "correct-horse-battery";

    async fn seeded(policy: AuthPolicy) -> Harness {
        let h = harness(policy);
        h.service.bootstrap_admin("Admin", PASSWORD).await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_login_normalizes_username() {
        let h = seeded(AuthPolicy::default()).await;
        let tokens = h
            .service
            .login("127.0.0.1", "  ADMIN ", &format!(" {} ", PASSWORD))
            .await
            .unwrap();

        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 900);
        assert_eq!(tokens.refresh_token.len(), 96);

        let user_id = h.service.verify_access(&tokens.access_token).unwrap();
        assert_eq!(user_id, h.repo.users().await[0].id);
    }

    #[tokio::test]
    async fn test_empty_credentials_do_not_count_as_failures() {
        let h = seeded(AuthPolicy {
            max_login_attempts: 1,
            ..AuthPolicy::default()
        })
        .await;

        let err = h.service.login("127.0.0.1", "admin", "   ").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        // Still not locked
        assert!(h.service.login("127.0.0.1", "admin", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_username_counts_toward_lock() {
        let h = seeded(AuthPolicy {
            max_login_attempts: 2,
            ..AuthPolicy::default()
        })
        .await;

        let first = h.service.login("ip", "ghost", PASSWORD).await.unwrap_err();
        assert!(matches!(first, AuthError::InvalidCredentials));
        let second = h.service.login("ip", "ghost", PASSWORD).await.unwrap_err();
        assert!(matches!(second, AuthError::LoginLocked { .. }));
    }

    #[tokio::test]
    async fn test_successful_login_resets_failures() {
        let h = seeded(AuthPolicy {
            max_login_attempts: 3,
            ..AuthPolicy::default()
        })
        .await;

        for _ in 0..2 {
            h.service.login("ip", "admin", "wrong-password-123").await.unwrap_err();
        }
        h.service.login("ip", "admin", PASSWORD).await.unwrap();

        // Two more failures are not enough to lock after the reset
        for _ in 0..2 {
            let err = h.service.login("ip", "admin", "wrong-password-123").await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn test_rate_limit_applies_before_credentials() {
        let h = seeded(AuthPolicy {
            rate_limit_max_hits: 2,
            ..AuthPolicy::default()
        })
        .await;

        h.service.login("10.1.1.1", "admin", PASSWORD).await.unwrap();
        h.service.login("10.1.1.1", "admin", PASSWORD).await.unwrap();
        let err = h.service.login("10.1.1.1", "admin", PASSWORD).await.unwrap_err();
        match err {
            AuthError::RateLimited { retry_after } => assert!(retry_after >= Duration::seconds(1)),
            other => panic!("expected RateLimited, got {:?}", other),
        }

        // A different client is unaffected
        assert!(h.service.login("10.1.1.2", "admin", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_blank_and_unknown_tokens() {
        let h = seeded(AuthPolicy::default()).await;
        assert!(matches!(
            h.service.refresh("  ").await.unwrap_err(),
            AuthError::InvalidRefreshToken
        ));
        assert!(matches!(
            h.service.refresh("deadbeef").await.unwrap_err(),
            AuthError::InvalidRefreshToken
        ));
    }

    #[tokio::test]
    async fn test_refresh_expiry_counts_from_rotation_time() {
        let h = seeded(AuthPolicy {
            refresh_token_ttl: Duration::hours(1),
            ..AuthPolicy::default()
        })
        .await;
        let start = h.clock.now();

        let tokens = h.service.login("ip", "admin", PASSWORD).await.unwrap();
        h.clock.advance(Duration::minutes(30));
        let rotated = h.service.refresh(&tokens.refresh_token).await.unwrap();

        let ledger = h.repo.refresh_tokens().await;
        let successor = ledger
            .iter()
            .find(|t: &&RefreshToken| t.revoked_at.is_none())
            .unwrap();
        assert_eq!(successor.expires_at, start + Duration::minutes(90));
        assert_ne!(rotated.refresh_token, tokens.refresh_token);
    }

    #[tokio::test]
    async fn test_logout_semantics() {
        let h = seeded(AuthPolicy::default()).await;
        let tokens = h.service.login("ip", "admin", PASSWORD).await.unwrap();

        h.service.logout(&tokens.refresh_token).await.unwrap();
        let revoked_at = h.repo.refresh_tokens().await[0].revoked_at;
        assert!(revoked_at.is_some());

        // Second logout succeeds and keeps the first revocation time
        h.clock.advance(Duration::minutes(5));
        h.service.logout(&tokens.refresh_token).await.unwrap();
        assert_eq!(h.repo.refresh_tokens().await[0].revoked_at, revoked_at);

        assert!(matches!(
            h.service.refresh(&tokens.refresh_token).await.unwrap_err(),
            AuthError::InvalidRefreshToken
        ));
        assert!(matches!(
            h.service.logout("unknown").await.unwrap_err(),
            AuthError::InvalidRefreshToken
        ));
        assert!(matches!(
            h.service.logout("").await.unwrap_err(),
            AuthError::ValidationError(_)
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_requires_both_values() {
        let h = harness(AuthPolicy::default());

        assert!(!h.service.bootstrap_admin("", "  ").await.unwrap());
        assert!(h.repo.users().await.is_empty());

        assert!(matches!(
            h.service.bootstrap_admin("admin", "").await.unwrap_err(),
            AuthError::ConfigError(_)
        ));
        assert!(matches!(
            h.service.bootstrap_admin("", PASSWORD).await.unwrap_err(),
            AuthError::ConfigError(_)
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_stores_a_hash_not_the_password() {
        let h = harness(AuthPolicy::default());
        h.service.bootstrap_admin("admin", PASSWORD).await.unwrap();

        let users: Vec<User> = h.repo.users().await;
        assert_eq!(users.len(), 1);
        assert_ne!(users[0].password_hash, PASSWORD);
        assert!(users[0].password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_lock_error_carries_remaining_time_on_service_clock() {
        let h = seeded(AuthPolicy {
            max_login_attempts: 1,
            ..AuthPolicy::default()
        })
        .await;

        let err = h.service.login("ip", "admin", "wrong-password-123").await.unwrap_err();
        assert_eq!(err.retry_after_seconds(), Some(15 * 60));

        h.clock.advance(Duration::minutes(10));
        match h.service.login("ip", "admin", PASSWORD).await.unwrap_err() {
            AuthError::LoginLocked { retry_after, .. } => {
                assert_eq!(retry_after, Duration::minutes(5))
            }
            other => panic!("expected LoginLocked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_refresh_ttl_is_an_error() {
        let h = seeded(AuthPolicy {
            refresh_token_ttl: Duration::hours(3_000_000_000),
            ..AuthPolicy::default()
        })
        .await;

        let err = h.service.login("ip", "admin", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::ConfigError(_)));
        assert!(h.repo.refresh_tokens().await.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_lock_duration_is_an_error() {
        let h = seeded(AuthPolicy {
            lock_duration: Duration::hours(3_000_000_000),
            ..AuthPolicy::default()
        })
        .await;

        let err = h.service.login("ip", "admin", "wrong-password-123").await.unwrap_err();
        assert!(matches!(err, AuthError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_cleanup_removes_stale_rows() {
        let h = seeded(AuthPolicy::default()).await;

        let tokens = h.service.login("ip", "admin", PASSWORD).await.unwrap();
        h.service.logout(&tokens.refresh_token).await.unwrap();
        h.service.login("ip", "nobody", PASSWORD).await.unwrap_err();

        h.clock.advance(Duration::days(31));
        let report = h
            .service
            .cleanup(Duration::days(14), Duration::days(30), 500)
            .await
            .unwrap();

        assert_eq!(report.deleted_refresh_tokens, 1);
        assert_eq!(report.deleted_login_attempts, 1);
        assert_eq!(report.deleted_ip_limits, 0);
        assert!(h.repo.refresh_tokens().await.is_empty());
    }

    struct StalledLedger;

    #[async_trait]
    impl RefreshTokenLedger for StalledLedger {
        async fn create(
            &self,
            _user_id: Uuid,
            _raw_token: &str,
            _expires_at: DateTime<Utc>,
            _now: DateTime<Utc>,
        ) -> Result<RefreshToken, AuthError> {
            stall().await
        }

        async fn rotate(
            &self,
            _raw_old_token: &str,
            _raw_new_token: &str,
            _new_expires_at: DateTime<Utc>,
            _now: DateTime<Utc>,
        ) -> Result<Uuid, AuthError> {
            stall().await
        }

        async fn revoke(&self, _raw_token: &str, _now: DateTime<Utc>) -> Result<bool, AuthError> {
            stall().await
        }

        async fn delete_stale_tokens(
            &self,
            _cutoff: DateTime<Utc>,
            _limit: i64,
        ) -> Result<u64, AuthError> {
            stall().await
        }
    }

    async fn stall<T>() -> Result<T, AuthError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Err(AuthError::DatabaseError("unreachable".to_string()))
    }

    #[tokio::test]
    async fn test_slow_store_surfaces_timeout() {
        let mut h = harness(AuthPolicy {
            operation_timeout: std::time::Duration::from_millis(20),
            ..AuthPolicy::default()
        });
        h.service.stores.ledger = Arc::new(StalledLedger);

        let err = h.service.refresh("some-token").await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout));
    }
}
