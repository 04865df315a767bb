//! # XP Challenge API
//!
//! | Endpoint | Operation |
//! |----------|-----------|
//! | `GET /api/challenges` | The static challenge catalog |
//! | `GET /api/xp/progress` | Caller's progress on every challenge, as of now |
//! | `POST /api/xp/track` | Record one progress increment |

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::{ApiJson, AppState};
use crate::catalog;
use crate::store::ProgressOutcome;

pub(super) async fn handler_api_challenges() -> impl IntoResponse {
    Json(serde_json::json!({ "challenges": catalog::all() }))
}

pub(super) async fn handler_api_progress(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
) -> impl IntoResponse {
    match state.service.list_progress(&auth_user.user_id).await {
        Ok(progress) => Json(serde_json::json!({ "progress": progress })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TrackPayload {
    challenge_id: String,
    increment: Option<i64>,
    recipient: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackResponse {
    success: bool,
    #[serde(flatten)]
    outcome: ProgressOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn completion_message(outcome: &ProgressOutcome) -> Option<String> {
    (outcome.xp_gained > 0).then(|| format!("Challenge complete! +{} XP", outcome.xp_gained))
}

/// `POST /api/xp/track {challengeId, increment?, recipient?}`
pub(super) async fn handler_api_track(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiJson(payload): ApiJson<TrackPayload>,
) -> impl IntoResponse {
    match state
        .service
        .record_progress(
            &auth_user.user_id,
            &payload.challenge_id,
            payload.increment,
            payload.recipient.as_deref(),
        )
        .await
    {
        Ok(outcome) => Json(TrackResponse {
            success: true,
            message: completion_message(&outcome),
            outcome,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}
