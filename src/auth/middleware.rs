// Request extractors for authenticated routes and client addressing

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{error::AuthError, token::TokenService};

const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

/// Authenticated user extractor for protected routes
///
/// Reads `Authorization: Bearer <access token>` and verifies it with the
/// state's `TokenService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let endpoint = parts.uri.path().to_string();

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            warn!(endpoint = %endpoint, "Authorization header missing 'Bearer ' prefix");
            AuthError::InvalidToken
        })?;

        let token_service = TokenService::from_ref(state);
        let user_id = token_service.verify_access(token.trim())?;

        Ok(AuthenticatedUser { user_id })
    }
}

/// Whether `X-Forwarded-For` may be used to identify the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardedForPolicy {
    pub trusted: bool,
}

/// Best-effort client address used to key login rate limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
    ForwardedForPolicy: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = ForwardedForPolicy::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientIp(resolve_client_ip(&parts.headers, peer, policy.trusted)))
    }
}

/// First `X-Forwarded-For` entry when trusted, else the peer address, else "unknown"
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::{Clock, ManualClock};
    use axum::http::{HeaderValue, Request};
    use chrono::Duration;
    use proptest::prelude::*;
    use std::sync::Arc;

    // Helper to create test parts with Authorization header
    fn create_parts_with_auth(auth_value: &str) -> Parts {
        let req = Request::builder()
            .uri("/auth/me")
            .header(header::AUTHORIZATION, auth_value)
            .body(())
            .unwrap();

        let (parts, _) = req.into_parts();
        parts
    }

    fn test_token_service(clock: &ManualClock) -> TokenService {
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        TokenService::new("test_secret_key_for_testing_purposes", Duration::minutes(15), clock)
    }

    #[tokio::test]
    async fn test_valid_token_is_accepted() {
        let clock = ManualClock::default();
        let service = test_token_service(&clock);
        let user_id = Uuid::now_v7();

        let (token, _) = service.issue_access(user_id).unwrap();
        let mut parts = create_parts_with_auth(&format!("Bearer {}", token));

        let user = AuthenticatedUser::from_request_parts(&mut parts, &service)
            .await
            .unwrap();
        assert_eq!(user.user_id, user_id);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let clock = ManualClock::default();
        let service = test_token_service(&clock);
        let (token, _) = service.issue_access(Uuid::now_v7()).unwrap();

        clock.advance(Duration::minutes(16));
        let mut parts = create_parts_with_auth(&format!("Bearer {}", token));

        let result = AuthenticatedUser::from_request_parts(&mut parts, &service).await;
        assert!(matches!(result.unwrap_err(), AuthError::ExpiredToken));
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let service = test_token_service(&ManualClock::default());
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();

        let result = AuthenticatedUser::from_request_parts(&mut parts, &service).await;
        assert!(matches!(result.unwrap_err(), AuthError::MissingToken));
    }

    #[tokio::test]
    async fn test_invalid_bearer_format() {
        let service = test_token_service(&ManualClock::default());

        for auth_value in ["InvalidFormat token", "token_without_bearer", "Basic dXNlcjpwYXNz"] {
            let mut parts = create_parts_with_auth(auth_value);
            let result = AuthenticatedUser::from_request_parts(&mut parts, &service).await;
            assert!(matches!(result.unwrap_err(), AuthError::InvalidToken));
        }
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();

        assert_eq!(resolve_client_ip(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(resolve_client_ip(&headers, Some(peer), false), "192.0.2.1");
    }

    #[test]
    fn test_client_ip_falls_back_to_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("  "));

        assert_eq!(resolve_client_ip(&headers, None, true), UNKNOWN_CLIENT);
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None, true), UNKNOWN_CLIENT);
    }

    proptest! {
        #[test]
        fn prop_malformed_tokens_rejected(malformed in "[a-zA-Z0-9]{10,50}") {
            let service = test_token_service(&ManualClock::default());
            let mut parts = create_parts_with_auth(&format!("Bearer {}", malformed));

            let rt = tokio::runtime::Runtime::new().unwrap();
            let result = rt.block_on(AuthenticatedUser::from_request_parts(&mut parts, &service));

            prop_assert!(result.is_err());
        }
    }
}
