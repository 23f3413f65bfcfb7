// Application state, router, and OpenAPI document

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{
    self,
    clock::Clock,
    middleware::ForwardedForPolicy,
    models::{CleanupReport, LoginRequest, MeResponse, RefreshRequest, Tokens},
    password::PasswordService,
    rate_limit::{FixedWindowRateLimiter, LoginRateLimiter, SlidingWindowRateLimiter},
    repository::{
        CredentialStore, LoginAttemptTracker, LoginIpLimitStore, RefreshTokenLedger, StoreHealth,
    },
    service::{AuthPolicy, AuthService, AuthStores},
    token::TokenService,
};
use crate::config::{AppConfig, CleanupConfig, RateLimitBackend};
use crate::error::ErrorResponse;
use crate::maintenance::{self, CleanupResponse};

/// Request bodies above this size are rejected before reaching a handler
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::handlers::login_handler,
        auth::handlers::refresh_handler,
        auth::handlers::logout_handler,
        auth::handlers::me_handler,
        maintenance::cleanup_handler,
        health_handler,
    ),
    components(
        schemas(
            LoginRequest,
            RefreshRequest,
            Tokens,
            MeResponse,
            CleanupReport,
            CleanupResponse,
            HealthResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "auth", description = "Login, token refresh, and logout"),
        (name = "maintenance", description = "Scheduled retention cleanup"),
        (name = "health", description = "Liveness and store connectivity")
    ),
    info(
        title = "Store Auth API",
        version = "1.0.0",
        description = "Single-admin authentication with lockout, rate limiting, and rotating refresh tokens"
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub cleanup: CleanupConfig,
    pub forwarded_for: ForwardedForPolicy,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.token_service().clone()
    }
}

impl FromRef<AppState> for ForwardedForPolicy {
    fn from_ref(state: &AppState) -> Self {
        state.forwarded_for
    }
}

/// Wire an `AuthService` over `repo` using the configured policy and limiter backend
pub fn build_auth_service<R>(config: &AppConfig, repo: Arc<R>, clock: Arc<dyn Clock>) -> AuthService
where
    R: CredentialStore
        + LoginAttemptTracker
        + RefreshTokenLedger
        + LoginIpLimitStore
        + StoreHealth
        + 'static,
{
    let rate_limiter: Arc<dyn LoginRateLimiter> = match config.rate_limit.backend {
        RateLimitBackend::Store => Arc::new(FixedWindowRateLimiter::new(repo.clone())),
        RateLimitBackend::Memory => Arc::new(SlidingWindowRateLimiter::new(
            config.rate_limit.max_tracked_ips,
        )),
    };

    let token_service = TokenService::new(
        &config.jwt_secret,
        config.security.access_token_ttl,
        clock.clone(),
    );

    AuthService::new(
        AuthStores::from_repository(repo),
        rate_limiter,
        token_service,
        PasswordService::new(config.password_hash),
        clock,
        AuthPolicy::from_config(config),
    )
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Health check
/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and store are reachable", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.auth.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                time: Some(Utc::now().to_rfc3339()),
            }),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    time: None,
                }),
            )
        }
    }
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS, tracing, and body-size layers
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/internal/maintenance/cleanup",
            get(maintenance::cleanup_handler).post(maintenance::cleanup_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/auth/refresh",
            "/auth/logout",
            "/auth/me",
            "/internal/maintenance/cleanup",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
