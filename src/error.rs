// Shared error types
// JSON error body used by every HTTP error, and the startup failure type

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Consistent error response structure
///
/// Carries a machine-readable `error_code` next to the human-readable
/// `message`. Internal failures only ever get a generic message here; the
/// detail goes to the logs.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "INVALID_CREDENTIALS", "RATE_LIMITED")
    pub error_code: String,

    pub message: String,

    /// RFC 3339 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_code: &str, message: String) -> Self {
        Self {
            error_code: error_code.to_string(),
            message,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Failures that stop the binary before it starts serving
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("admin bootstrap failed: {0}")]
    Bootstrap(#[from] crate::auth::AuthError),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}
