use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginRequest, LogoutResponse, RefreshRequest},
    middleware::{AuthUser, Client},
    utils::ValidatedJson,
    AppState,
};

/// Login with email and password
///
/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .manager
        .login(&req.email, req.password, &client)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Rotate a refresh token
///
/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.manager.refresh(&req.refresh_token, &client).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Log out of every session
///
/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Client(client): Client,
    AuthUser(auth): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.manager.logout(&auth, &client).await?;
    Ok((
        StatusCode::OK,
        Json(LogoutResponse {
            sessions_revoked: summary.sessions_revoked,
            families_revoked: summary.families_revoked,
        }),
    ))
}
