//! # Barks, Posts and Comments API
//!
//! | Endpoint | Operation |
//! |----------|-----------|
//! | `GET /api/barks` | All barks by name |
//! | `POST /api/barks` | Create a bark (unique slug) |
//! | `GET /api/posts?bark=<uuid>&limit=N` | Newest posts, optionally in one bark |
//! | `POST /api/posts` | Create a post |
//! | `GET /api/posts/{id}` | One post |
//! | `GET /api/posts/{id}/comments` | Comments, oldest first |
//! | `POST /api/posts/{id}/comments` | Comment on a post |
//!
//! Posts and comments carry their live net vote `score`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::middleware_auth::RequireAuth;
use super::{ApiJson, ApiPath, ApiQuery, AppState};
use crate::service::PostInput;

pub(super) async fn handler_api_barks_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.list_barks().await {
        Ok(barks) => Json(serde_json::json!({ "barks": barks })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub(super) struct CreateBarkPayload {
    slug: String,
    name: String,
    #[serde(default)]
    description: String,
}

pub(super) async fn handler_api_barks_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiJson(payload): ApiJson<CreateBarkPayload>,
) -> impl IntoResponse {
    match state
        .service
        .create_bark(&auth_user.user_id, &payload.slug, &payload.name, &payload.description)
        .await
    {
        Ok(bark) => (StatusCode::CREATED, Json(serde_json::json!(bark))).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub(super) struct PostsQuery {
    bark: Option<Uuid>,
    limit: Option<usize>,
}

pub(super) async fn handler_api_posts_list(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<PostsQuery>,
) -> impl IntoResponse {
    match state.service.list_posts(params.bark, params.limit).await {
        Ok(posts) => Json(serde_json::json!({ "posts": posts })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreatePostPayload {
    #[serde(default)]
    body: String,
    media_url: Option<String>,
    bark_id: Option<Uuid>,
}

pub(super) async fn handler_api_posts_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiJson(payload): ApiJson<CreatePostPayload>,
) -> impl IntoResponse {
    let input = PostInput {
        body: payload.body,
        media_url: payload.media_url,
        bark_id: payload.bark_id,
    };
    match state.service.create_post(&auth_user.user_id, input).await {
        Ok(post) => (StatusCode::CREATED, Json(serde_json::json!(post))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub(super) async fn handler_api_post_get(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> impl IntoResponse {
    match state.service.get_post(id).await {
        Ok(post) => Json(serde_json::json!(post)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub(super) async fn handler_api_comments_list(
    State(state): State<Arc<AppState>>,
    ApiPath(post_id): ApiPath<Uuid>,
) -> impl IntoResponse {
    match state.service.list_comments(post_id).await {
        Ok(comments) => Json(serde_json::json!({ "comments": comments })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub(super) struct CreateCommentPayload {
    body: String,
}

pub(super) async fn handler_api_comments_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiPath(post_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CreateCommentPayload>,
) -> impl IntoResponse {
    match state
        .service
        .create_comment(&auth_user.user_id, post_id, &payload.body)
        .await
    {
        Ok(comment) => (StatusCode::CREATED, Json(serde_json::json!(comment))).into_response(),
        Err(e) => e.into_response(),
    }
}
