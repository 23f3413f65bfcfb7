// Shared fixtures for integration tests
#![allow(dead_code)]

use axum_test::TestServer;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use store_auth::{
    app::{create_router, AppState},
    auth::{
        clock::{Clock, ManualClock},
        middleware::ForwardedForPolicy,
        password::{PasswordHashParams, PasswordService},
        rate_limit::{FixedWindowRateLimiter, LoginRateLimiter, SlidingWindowRateLimiter},
        repository::MemoryAuthRepository,
        service::{AuthPolicy, AuthService, AuthStores},
        token::TokenService,
    },
    config::CleanupConfig,
};

pub const ADMIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct-horse-battery-staple";
pub const WRONG_PASSWORD: &str = "definitely-not-the-password";
pub const CRON_SECRET: &str = "cron-test-secret";

pub struct TestContext {
    pub service: AuthService,
    pub repo: Arc<MemoryAuthRepository>,
    pub clock: ManualClock,
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_900_000_000, 0).unwrap()
}

/// Minimum Argon2 cost keeps the suites fast
fn cheap_passwords() -> PasswordService {
    PasswordService::new(PasswordHashParams {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    })
}

fn build(policy: AuthPolicy, shared_rate_limit: bool) -> TestContext {
    let repo = Arc::new(MemoryAuthRepository::new());
    let clock = ManualClock::new(start_time());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

    let rate_limiter: Arc<dyn LoginRateLimiter> = if shared_rate_limit {
        Arc::new(FixedWindowRateLimiter::new(repo.clone()))
    } else {
        Arc::new(SlidingWindowRateLimiter::default())
    };

    let service = AuthService::new(
        AuthStores::from_repository(repo.clone()),
        rate_limiter,
        TokenService::new(
            "integration-test-secret",
            Duration::minutes(15),
            shared_clock.clone(),
        ),
        cheap_passwords(),
        shared_clock,
        policy,
    );

    TestContext {
        service,
        repo,
        clock,
    }
}

/// Service over the in-memory repository with a store-backed rate limiter
pub fn context(policy: AuthPolicy) -> TestContext {
    build(policy, true)
}

/// Same, but rate limiting uses the in-process sliding window
pub fn context_with_sliding_limiter(policy: AuthPolicy) -> TestContext {
    build(policy, false)
}

/// Context with the admin account already bootstrapped
pub async fn seeded(policy: AuthPolicy) -> TestContext {
    let ctx = context(policy);
    ctx.service
        .bootstrap_admin(ADMIN, ADMIN_PASSWORD)
        .await
        .expect("bootstrap admin");
    ctx
}

pub fn test_server(ctx: &TestContext, cron_secret: Option<&str>) -> TestServer {
    let state = AppState {
        auth: ctx.service.clone(),
        cleanup: CleanupConfig {
            cron_secret: cron_secret.map(str::to_string),
            ..CleanupConfig::default()
        },
        forwarded_for: ForwardedForPolicy { trusted: true },
    };

    TestServer::new(create_router(state)).unwrap()
}
