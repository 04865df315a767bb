//! Media upload API.
//!
//! `POST /api/media {data: <base64>, contentType, folder?}` returns
//! `{url}`. Callers store the URL on the post, pet, submission or listing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::{ApiJson, AppState};
use crate::error::PetnetError;
use crate::media;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UploadPayload {
    data: String,
    content_type: String,
    folder: Option<String>,
}

pub(super) async fn handler_api_media_upload(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiJson(payload): ApiJson<UploadPayload>,
) -> impl IntoResponse {
    let upload = match media::prepare_upload(
        &payload.data,
        &payload.content_type,
        payload.folder.as_deref(),
        state.config.media.max_bytes,
    ) {
        Ok(upload) => upload,
        Err(e) => return e.into_response(),
    };
    match state.media.put(&upload).await {
        Ok(url) => {
            tracing::info!(user_id = %auth_user.user_id, key = %upload.key, "media uploaded");
            (StatusCode::CREATED, Json(serde_json::json!({ "url": url }))).into_response()
        }
        Err(e) => PetnetError::Internal(e).into_response(),
    }
}
