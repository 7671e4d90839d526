//! Request-scoped caller context.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use convo_shared::constants::IDENTITY_HEADER;
use convo_shared::UserId;

use crate::api::AppState;
use crate::error::ServerError;

/// The authenticated caller of an HTTP request.
///
/// Authentication happens upstream; the identity arrives in the
/// `x-user-id` header. The caller's own block list is loaded once here so
/// handlers can consult it without another store round trip.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: UserId,
    pub blocked: Vec<UserId>,
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| UserId::parse(raw).ok())
            .ok_or(ServerError::Unauthenticated)?;

        let blocked = state.store.block_list(&id).await?;
        Ok(Caller { id, blocked })
    }
}
