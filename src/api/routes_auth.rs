//! Profile API.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::AppState;

/// `GET /api/me`: the caller's account, level and pets.
pub(super) async fn handler_api_me(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
) -> impl IntoResponse {
    match state.service.profile(&auth_user.user_id).await {
        Ok(profile) => Json(serde_json::json!(profile)).into_response(),
        Err(e) => e.into_response(),
    }
}
