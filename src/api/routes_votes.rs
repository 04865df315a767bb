//! Vote API.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::middleware_auth::RequireAuth;
use super::{ApiJson, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct VotePayload {
    votable_id: Uuid,
    value: i64,
}

/// `POST /api/votes {votableId, value}`: cast, flip or retract the caller's
/// vote. Responds with the action taken and the recomputed score.
pub(super) async fn handler_api_vote(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiJson(payload): ApiJson<VotePayload>,
) -> impl IntoResponse {
    match state
        .service
        .cast_vote(&auth_user.user_id, payload.votable_id, payload.value)
        .await
    {
        Ok(outcome) => Json(serde_json::json!(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}
