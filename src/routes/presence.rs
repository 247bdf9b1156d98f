// ============================================================================
// Presence Routes
// ============================================================================
//
// Endpoints:
// - POST   /presence/heartbeat - Mark the caller online / refresh TTL
// - DELETE /presence           - Mark the caller offline
// - GET    /presence/online    - List online users
// - GET    /presence/:user_id  - Check one user
//
// ============================================================================

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::extractors::CallerIdentity;

/// POST /presence/heartbeat
pub async fn heartbeat(
    State(ctx): State<Arc<AppContext>>,
    caller: CallerIdentity,
) -> Result<impl IntoResponse, AppError> {
    ctx.presence.mark_online(caller.0).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// DELETE /presence
pub async fn go_offline(
    State(ctx): State<Arc<AppContext>>,
    caller: CallerIdentity,
) -> Result<impl IntoResponse, AppError> {
    ctx.presence.mark_offline(caller.0).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// GET /presence/online
pub async fn online_users(
    State(ctx): State<Arc<AppContext>>,
) -> Result<impl IntoResponse, AppError> {
    let users = ctx.presence.online_users().await?;
    Ok(Json(json!({ "users": users })))
}

/// GET /presence/:user_id
pub async fn is_online(
    State(ctx): State<Arc<AppContext>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| AppError::validation("invalid user id format"))?;
    let online = ctx.presence.is_online(user_id).await?;
    Ok(Json(json!({ "online": online })))
}
