// HTTP handlers for authentication endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::auth::{
    error::AuthError,
    middleware::{AuthenticatedUser, ClientIp},
    models::{LoginRequest, MeResponse, RefreshRequest, Tokens},
    service::AuthService,
};
use crate::error::ErrorResponse;

/// Unwrap a JSON body, turning any decode failure into a 400
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        AuthError::ValidationError("invalid json body".to_string())
    })
}

/// Login with username and password
/// POST /auth/login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = Tokens),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Username locked or client rate limited", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(service): State<AuthService>,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Tokens>, AuthError> {
    let request = json_body(payload)?.normalized();
    request.validate()?;

    let tokens = service
        .login(&client_ip, &request.username, &request.password)
        .await?;
    Ok(Json(tokens))
}

/// Rotate a refresh token
/// POST /auth/refresh
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair rotated", body = Tokens),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh_handler(
    State(service): State<AuthService>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<Tokens>, AuthError> {
    let request = json_body(payload)?;
    let tokens = service.refresh(&request.refresh_token).await?;
    Ok(Json(tokens))
}

/// Revoke a refresh token
/// POST /auth/logout
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Refresh token revoked"),
        (status = 400, description = "Malformed request or empty token", body = ErrorResponse),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout_handler(
    State(service): State<AuthService>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<StatusCode, AuthError> {
    let request = json_body(payload)?;
    service.logout(&request.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Identity behind the presented access token
/// GET /auth/me
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Caller identity", body = MeResponse),
        (status = 401, description = "Missing, invalid, or expired access token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me_handler(user: AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
    })
}
