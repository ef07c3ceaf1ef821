use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{services::AuthContext, AppState};

/// Require a valid access token bound to a live session
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let context = state.manager.authenticate(token).await?;

    // Handlers read the identity from request extensions
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

/// Must be layered inside [`auth_middleware`].
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = req
        .extensions()
        .get::<AuthContext>()
        .is_some_and(|context| context.is_admin);

    if !is_admin {
        return Err(AppError::Forbidden(anyhow::anyhow!("Admin access required")));
    }

    Ok(next.run(req).await)
}

/// Extractor for the authenticated identity
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<AuthContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })?;

        Ok(AuthUser(context.clone()))
    }
}
