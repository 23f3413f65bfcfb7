// Authentication error taxonomy and HTTP mapping

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::error::ErrorResponse;

/// Authentication and session error types
///
/// Credential and refresh-token failures are deliberately undifferentiated:
/// the variant never says whether the username, the password, or the
/// token state was the cause.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Username is under a temporary lockout
    ///
    /// `retry_after` is measured on the service clock when the error is built.
    #[error("login temporarily locked")]
    LoginLocked {
        until: DateTime<Utc>,
        retry_after: Duration,
    },

    /// Client IP exceeded the login rate limit
    #[error("too many login attempts")]
    RateLimited { retry_after: Duration },

    /// Refresh token not found, revoked, or expired
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// Access token failed signature, algorithm, or type checks
    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    ExpiredToken,

    #[error("missing authentication token")]
    MissingToken,

    #[error("validation error: {0}")]
    ValidationError(String),

    /// Bootstrap or runtime misconfiguration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Underlying storage failure
    #[error("database error: {0}")]
    DatabaseError(String),

    /// A store operation exceeded its deadline and was abandoned
    #[error("storage operation timed out")]
    Timeout,

    #[error("password hashing error")]
    PasswordHashError,

    #[error("token generation error: {0}")]
    TokenGenerationError(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::DatabaseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::ValidationError(errors.to_string())
    }
}

impl AuthError {
    /// Lockout error for a deadline observed at `now`
    pub fn locked(until: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        AuthError::LoginLocked {
            until,
            retry_after: until - now,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::LoginLocked { .. } | AuthError::RateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AuthError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AuthError::ConfigError(_)
            | AuthError::DatabaseError(_)
            | AuthError::Timeout
            | AuthError::PasswordHashError
            | AuthError::TokenGenerationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code for the response body
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::LoginLocked { .. } => "LOGIN_LOCKED",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::InvalidToken | AuthError::ExpiredToken => "INVALID_TOKEN",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::ValidationError(_) => "VALIDATION_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Get a descriptive error message for this error
    /// This message is safe to send to clients (no sensitive data)
    pub fn error_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "invalid credentials".to_string(),
            AuthError::LoginLocked { .. } => "login temporarily locked".to_string(),
            AuthError::RateLimited { .. } => "too many login attempts".to_string(),
            AuthError::InvalidRefreshToken => "invalid refresh token".to_string(),
            AuthError::InvalidToken | AuthError::ExpiredToken => {
                "invalid or expired token".to_string()
            }
            AuthError::MissingToken => "missing authorization token".to_string(),
            AuthError::ValidationError(msg) => msg.clone(),
            _ => "internal server error".to_string(),
        }
    }

    /// Seconds a client should wait before retrying, floored at one
    pub fn retry_after_seconds(&self) -> Option<i64> {
        match self {
            AuthError::LoginLocked { retry_after, .. } | AuthError::RateLimited { retry_after } => {
                Some(retry_after.num_seconds().max(1))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AuthError::InvalidCredentials | AuthError::InvalidRefreshToken => {
                debug!("Rejected credential: {}", self);
            }
            AuthError::LoginLocked { until, .. } => {
                warn!(locked_until = %until, "Login attempt during lockout");
            }
            AuthError::RateLimited { .. } => {
                warn!("Login rate limit exceeded");
            }
            AuthError::InvalidToken | AuthError::ExpiredToken | AuthError::MissingToken => {
                warn!("Rejected access token: {}", self);
            }
            AuthError::ValidationError(msg) => {
                debug!("Validation error: {}", msg);
            }
            _ => {
                // Full detail stays server-side; this line feeds error tracking
                error!("Internal auth error: {}", self);
            }
        }

        let retry_after = self.retry_after_seconds();
        let body = ErrorResponse::new(self.error_code(), self.error_message());
        let mut response = (status, Json(body)).into_response();

        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_errors_are_unauthorized() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InvalidRefreshToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::ExpiredToken.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_throttling_errors_are_too_many_requests() {
        let locked = AuthError::locked(Utc::now(), Utc::now());
        let limited = AuthError::RateLimited { retry_after: Duration::seconds(30) };
        assert_eq!(locked.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = AuthError::DatabaseError("connection refused on 10.0.0.3".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_message(), "internal server error");
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(AuthError::Timeout.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_retry_after_is_floored_at_one_second() {
        let now = Utc::now();
        let past_lock = AuthError::locked(now - Duration::seconds(5), now);
        assert_eq!(past_lock.retry_after_seconds(), Some(1));

        let lock = AuthError::locked(now + Duration::seconds(90), now);
        assert_eq!(lock.retry_after_seconds(), Some(90));

        assert_eq!(AuthError::InvalidCredentials.retry_after_seconds(), None);
    }

    #[test]
    fn test_lock_header_uses_the_observed_clock() {
        // Deadline far from wall-clock time, as under an injected clock
        let observed = DateTime::<Utc>::from_timestamp(1_900_000_000, 0).unwrap();
        let err = AuthError::locked(observed + Duration::minutes(15), observed);

        let response = err.into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "900");
    }

    #[test]
    fn test_locked_response_carries_retry_after_header() {
        let err = AuthError::RateLimited { retry_after: Duration::seconds(42) };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}
