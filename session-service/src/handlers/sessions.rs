use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    middleware::{AuthUser, Client},
    AppState,
};

/// GET /auth/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let sessions = state.manager.list_sessions(&auth).await?;
    Ok(Json(sessions))
}

/// DELETE /auth/sessions/:session_id
#[tracing::instrument(skip(state, auth, client), fields(user_id = %auth.user_id))]
pub async fn revoke_session(
    State(state): State<AppState>,
    Client(client): Client,
    AuthUser(auth): AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .manager
        .revoke_session(&auth, &session_id, &client)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
