// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Structure:
// - mod.rs: router assembly and middleware
// - health.rs: health check and metrics endpoints
// - messages.rs: ingestion, polling and reconciliation endpoints
// - presence.rs: online registry endpoints
// - extractors.rs: custom Axum extractors (caller identity)
// - middleware.rs: request logging
//
// ============================================================================

mod extractors;
mod health;
mod messages;
mod middleware;
mod presence;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

/// Create the main application router with all routes
pub fn create_router(app_context: Arc<AppContext>) -> Router {
    Router::new()
        // Health and monitoring
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Messages
        .route("/messages", post(messages::send_message))
        .route("/messages/poll/:user_id", get(messages::poll_messages))
        .route("/messages/reconcile", get(messages::reconcile))
        .route(
            "/messages/conversation/:partner_id",
            get(messages::get_conversation),
        )
        .route("/messages/unread/:partner_id", get(messages::unread_count))
        .route(
            "/messages/typing/:partner_id",
            post(messages::set_typing).get(messages::get_typing),
        )
        // Presence
        .route("/presence/heartbeat", post(presence::heartbeat))
        .route("/presence", delete(presence::go_offline))
        .route("/presence/online", get(presence::online_users))
        .route("/presence/:user_id", get(presence::is_online))
        // Apply middleware (order matters - last added runs first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .into_inner(),
        )
        .with_state(app_context)
}
