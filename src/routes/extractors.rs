// ============================================================================
// Axum Extractors
// ============================================================================
//
// CallerIdentity: the platform's API gateway authenticates callers and
// forwards the caller's id in the X-User-Id header. Token issuance and
// verification live outside this subsystem.
//
// ============================================================================

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::AppError;

/// Extractor for the authenticated caller id from the X-User-Id header.
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::validation("missing X-User-Id header").into_response()
            })?;

        let user_id = Uuid::parse_str(header).map_err(|_| {
            tracing::debug!(header = %header, "Rejected malformed X-User-Id header");
            AppError::validation("invalid X-User-Id header").into_response()
        })?;

        Ok(CallerIdentity(user_id))
    }
}
