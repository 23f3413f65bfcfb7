// Authentication data models and DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::validation::validate_username_format;

/// Sole administrator identity
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-username failure counter and lock deadline
///
/// Absent rows read back as zero failures with no lock.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LoginAttempt {
    pub username: String,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LoginAttempt {
    pub fn empty(username: &str) -> Self {
        Self {
            username: username.to_string(),
            failed_attempts: 0,
            locked_until: None,
        }
    }

    /// Lock deadline if the lock is still active at `now`
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| now < *until)
    }
}

/// Refresh token ledger record
///
/// Only the SHA-256 digest of the bearer secret is stored.
/// `replaced_by` points forward to the successor minted by rotation.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// A token can authenticate a refresh iff it is unrevoked and unexpired
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Fixed-window login counter for one client IP
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LoginIpLimit {
    pub ip: String,
    pub window_started_at: DateTime<Utc>,
    pub hits: i32,
}

/// Token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds
    #[schema(example = 900)]
    pub expires_in: i64,
}

impl Tokens {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Rows removed by one retention cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CleanupReport {
    pub deleted_refresh_tokens: u64,
    pub deleted_login_attempts: u64,
    pub deleted_ip_limits: u64,
}

/// Login request DTO
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[validate(custom = "validate_username_format")]
    #[schema(example = "admin")]
    pub username: String,
    #[validate(length(min = 12, max = 200, message = "password format is invalid"))]
    pub password: String,
}

impl LoginRequest {
    /// Trim both fields and lowercase the username before validation
    pub fn normalized(self) -> Self {
        Self {
            username: self.username.trim().to_lowercase(),
            password: self.password.trim().to_string(),
        }
    }
}

/// Token refresh / logout request DTO
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Identity of the caller behind a verified access token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
}
