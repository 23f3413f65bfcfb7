// Retention cleanup trigger for an external scheduler
//
// Disabled (404) unless CRON_SECRET is configured; callers authenticate with
// `Authorization: Bearer <CRON_SECRET>`.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::app::AppState;
use crate::auth::{error::AuthError, models::CleanupReport};
use crate::error::ErrorResponse;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    pub status: String,
    pub result: CleanupReport,
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("maintenance endpoint is disabled")]
    Disabled,

    #[error("invalid cron secret")]
    Unauthorized,

    #[error(transparent)]
    Cleanup(#[from] AuthError),
}

impl IntoResponse for MaintenanceError {
    fn into_response(self) -> Response {
        match self {
            MaintenanceError::Disabled => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("NOT_FOUND", "not found".to_string())),
            )
                .into_response(),
            MaintenanceError::Unauthorized => {
                warn!("Rejected maintenance request with a bad cron secret");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse::new("UNAUTHORIZED", "unauthorized".to_string())),
                )
                    .into_response()
            }
            MaintenanceError::Cleanup(err) => err.into_response(),
        }
    }
}

/// True when `headers` carry `Bearer <secret>` (scheme matched case-insensitively)
fn bearer_matches(headers: &HeaderMap, secret: &str) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    match value.trim().split_once(' ') {
        Some((scheme, presented)) => {
            scheme.eq_ignore_ascii_case("bearer") && presented.trim() == secret
        }
        None => false,
    }
}

/// Run one retention cleanup pass
/// GET|POST /internal/maintenance/cleanup
#[utoipa::path(
    post,
    path = "/internal/maintenance/cleanup",
    responses(
        (status = 200, description = "Cleanup finished", body = CleanupResponse),
        (status = 401, description = "Wrong cron secret", body = ErrorResponse),
        (status = 404, description = "Cleanup endpoint disabled", body = ErrorResponse)
    ),
    tag = "maintenance"
)]
pub async fn cleanup_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, MaintenanceError> {
    let cleanup = &state.cleanup;
    let secret = cleanup
        .cron_secret
        .as_deref()
        .ok_or(MaintenanceError::Disabled)?;

    if !bearer_matches(&headers, secret) {
        return Err(MaintenanceError::Unauthorized);
    }

    let report = state
        .auth
        .cleanup(
            cleanup.refresh_retention,
            cleanup.login_attempt_retention,
            cleanup.batch_size,
        )
        .await?;

    info!(
        deleted_refresh_tokens = report.deleted_refresh_tokens,
        deleted_login_attempts = report.deleted_login_attempts,
        deleted_ip_limits = report.deleted_ip_limits,
        "Maintenance cleanup completed"
    );

    Ok(Json(CleanupResponse {
        status: "ok".to_string(),
        result: report,
    }))
}
