// ============================================================================
// Messages Routes
// ============================================================================
//
// Endpoints:
// - POST /messages                              - Send a direct message
// - GET  /messages/poll/:user_id                - Poll the fast queue delta
// - GET  /messages/reconcile                    - Backfill from the durable log
// - GET  /messages/conversation/:partner_id     - Conversation history
// - GET  /messages/unread/:partner_id           - Unread counter
// - POST/GET /messages/typing/:partner_id       - Typing indicator
//
// ============================================================================

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::ingest;
use crate::resolver;
use crate::routes::extractors::CallerIdentity;

const DEFAULT_CONVERSATION_LIMIT: usize = 100;
const MAX_CONVERSATION_LIMIT: usize = 500;

fn parse_user_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::validation("invalid user id format"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub recipient_id: String,
    pub body: String,
}

/// POST /messages
/// Validates, writes the durable record, then best-effort accelerates
/// delivery through the recipient's fast queue.
pub async fn send_message(
    State(ctx): State<Arc<AppContext>>,
    caller: CallerIdentity,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let recipient_id = Uuid::parse_str(&request.recipient_id)
        .map_err(|_| AppError::validation("invalid recipient id format"))?;

    let message = ingest::ingest_message(
        ctx.log.as_ref(),
        &ctx.queue,
        &ctx.clock,
        caller.0,
        recipient_id,
        &request.body,
    )
    .await?;

    Ok(Json(json!({ "message": message })))
}

#[derive(Debug, Deserialize)]
pub struct PollParams {
    pub since: Option<String>,
    pub limit: Option<String>,
}

/// GET /messages/poll/:user_id?since=<millis>&limit=<1..100>
/// Returns the delta of fast-queue entries newer than the cursor. A store
/// outage is a 503, never an empty 200.
pub async fn poll_messages(
    State(ctx): State<Arc<AppContext>>,
    Path(user_id): Path<String>,
    Query(params): Query<PollParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = parse_user_id(&user_id)?;
    let since = resolver::parse_since(params.since.as_deref());
    let limit = resolver::clamp_limit(params.limit.as_deref().and_then(|s| s.parse().ok()));

    let messages =
        resolver::resolve_new_messages(ctx.log.as_ref(), &ctx.queue, user_id, since, limit).await?;

    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileParams {
    pub since: Option<String>,
}

/// GET /messages/reconcile?since=<millis>
/// Out-of-band backfill straight from the durable log, for clients that
/// suspect fast-queue gaps (eviction, TTL reclaim, missed pushes).
pub async fn reconcile(
    State(ctx): State<Arc<AppContext>>,
    caller: CallerIdentity,
    Query(params): Query<ReconcileParams>,
) -> Result<impl IntoResponse, AppError> {
    let since = resolver::parse_since(params.since.as_deref());
    let messages = ctx
        .log
        .fetch_since(caller.0, since)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
    pub limit: Option<i64>,
}

/// GET /messages/conversation/:partner_id?limit=
/// Both directions of the conversation from the durable log, chronological.
/// Reading a conversation clears the caller's unread counter for it.
pub async fn get_conversation(
    State(ctx): State<Arc<AppContext>>,
    caller: CallerIdentity,
    Path(partner_id): Path<String>,
    Query(params): Query<ConversationParams>,
) -> Result<impl IntoResponse, AppError> {
    let partner_id = parse_user_id(&partner_id)?;

    let known = ctx
        .log
        .user_exists(partner_id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !known {
        return Err(AppError::NotFound(format!(
            "user {} does not exist",
            partner_id
        )));
    }

    let limit = match params.limit {
        Some(limit) if limit > 0 => (limit as usize).min(MAX_CONVERSATION_LIMIT),
        _ => DEFAULT_CONVERSATION_LIMIT,
    };

    let messages = ctx
        .log
        .fetch_conversation(caller.0, partner_id, limit)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    if let Err(e) = ctx.queue.clear_unread(caller.0, partner_id).await {
        tracing::warn!(error = %e, partner_id = %partner_id, "Failed to clear unread counter");
    }

    Ok(Json(json!({
        "messages": messages,
        "partnerId": partner_id,
    })))
}

/// GET /messages/unread/:partner_id
pub async fn unread_count(
    State(ctx): State<Arc<AppContext>>,
    caller: CallerIdentity,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let partner_id = parse_user_id(&partner_id)?;
    let count = ctx.queue.unread_count(caller.0, partner_id).await?;

    Ok(Json(json!({ "count": count })))
}

/// POST /messages/typing/:partner_id
pub async fn set_typing(
    State(ctx): State<Arc<AppContext>>,
    caller: CallerIdentity,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let partner_id = parse_user_id(&partner_id)?;
    ctx.queue.set_typing(caller.0, partner_id).await?;

    Ok(Json(json!({ "status": "ok" })))
}

/// GET /messages/typing/:partner_id
/// Whether the partner is currently typing toward the caller.
pub async fn get_typing(
    State(ctx): State<Arc<AppContext>>,
    caller: CallerIdentity,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let partner_id = parse_user_id(&partner_id)?;
    let typing = ctx.queue.is_typing(caller.0, partner_id).await?;

    Ok(Json(json!({ "typing": typing })))
}
