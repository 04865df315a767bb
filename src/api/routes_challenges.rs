//! # Weekly Photo Challenge API
//!
//! | Endpoint | Operation |
//! |----------|-----------|
//! | `GET /api/weekly-challenge` | The running challenge and its entries |
//! | `POST /api/weekly-challenges` | Schedule a challenge (admin) |
//! | `POST /api/weekly-challenge/submissions` | Enter the running challenge |

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::middleware_auth::{RequireAdmin, RequireAuth};
use super::{ApiJson, AppState};
use crate::service::{SubmissionInput, WeeklyChallengeInput};

/// `{"challenge": null, "submissions": []}` when nothing is running.
pub(super) async fn handler_api_weekly_active(
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let active = match state.service.active_weekly_challenge().await {
        Ok(active) => active,
        Err(e) => return e.into_response(),
    };
    let submissions = match &active {
        Some(challenge) => match state.service.list_submissions(challenge.id).await {
            Ok(rows) => rows,
            Err(e) => return e.into_response(),
        },
        None => Vec::new(),
    };
    Json(serde_json::json!({
        "challenge": active,
        "submissions": submissions,
    }))
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateWeeklyPayload {
    title: String,
    prompt: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

pub(super) async fn handler_api_weekly_create(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(payload): ApiJson<CreateWeeklyPayload>,
) -> impl IntoResponse {
    let input = WeeklyChallengeInput {
        title: payload.title,
        prompt: payload.prompt,
        starts_at: payload.starts_at,
        ends_at: payload.ends_at,
    };
    match state
        .service
        .create_weekly_challenge(&admin.user_id, input)
        .await
    {
        Ok(challenge) => (StatusCode::CREATED, Json(serde_json::json!(challenge))).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubmissionPayload {
    #[serde(default)]
    caption: String,
    media_url: String,
    pet_id: Option<Uuid>,
}

pub(super) async fn handler_api_submission_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiJson(payload): ApiJson<SubmissionPayload>,
) -> impl IntoResponse {
    let input = SubmissionInput {
        caption: payload.caption,
        media_url: payload.media_url,
        pet_id: payload.pet_id,
    };
    match state.service.submit_entry(&auth_user.user_id, input).await {
        Ok(entry) => (StatusCode::CREATED, Json(serde_json::json!(entry))).into_response(),
        Err(e) => e.into_response(),
    }
}
