//! Read access to the security audit trail for administrators.

use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::auth::{AuditQuery, MAX_AUDIT_LIMIT};
use crate::models::AuditEvent;
use crate::AppState;

/// List recent audit events, newest first.
///
/// GET /admin/audit
#[tracing::instrument(skip(state), fields(user_id = ?query.user_id, limit = query.limit))]
pub async fn list_audit_events(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let limit = query.limit.clamp(1, MAX_AUDIT_LIMIT);
    let events = state
        .manager
        .audit_events(query.user_id.as_deref(), limit)
        .await?;
    Ok(Json(events))
}
