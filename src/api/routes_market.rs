//! # Marketplace API
//!
//! | Endpoint | Operation |
//! |----------|-----------|
//! | `GET /api/listings?status=active\|sold` | Listings, newest first (`active` by default) |
//! | `POST /api/listings` | Create a listing |
//! | `GET /api/listings/{id}` | One listing |
//! | `PATCH /api/listings/{id}` | Seller edits fields or marks it sold |
//! | `DELETE /api/listings/{id}` | Seller removes it |

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::middleware_auth::RequireAuth;
use super::{ApiJson, ApiPath, ApiQuery, AppState};
use crate::service::ListingInput;
use crate::store::{ListingStatus, ListingUpdate};

#[derive(Deserialize)]
pub(super) struct ListingsQuery {
    status: Option<ListingStatus>,
}

pub(super) async fn handler_api_listings_list(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListingsQuery>,
) -> impl IntoResponse {
    match state.service.list_listings(params.status).await {
        Ok(listings) => Json(serde_json::json!({ "listings": listings })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateListingPayload {
    title: String,
    #[serde(default)]
    description: String,
    price_cents: i64,
    image_url: Option<String>,
}

pub(super) async fn handler_api_listings_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiJson(payload): ApiJson<CreateListingPayload>,
) -> impl IntoResponse {
    let input = ListingInput {
        title: payload.title,
        description: payload.description,
        price_cents: payload.price_cents,
        image_url: payload.image_url,
    };
    match state.service.create_listing(&auth_user.user_id, input).await {
        Ok(listing) => (StatusCode::CREATED, Json(serde_json::json!(listing))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub(super) async fn handler_api_listing_get(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> impl IntoResponse {
    match state.service.get_listing(id).await {
        Ok(listing) => Json(serde_json::json!(listing)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UpdateListingPayload {
    title: Option<String>,
    description: Option<String>,
    price_cents: Option<i64>,
    image_url: Option<String>,
    status: Option<ListingStatus>,
}

pub(super) async fn handler_api_listing_update(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateListingPayload>,
) -> impl IntoResponse {
    let update = ListingUpdate {
        title: payload.title,
        description: payload.description,
        price_cents: payload.price_cents,
        image_url: payload.image_url,
        status: payload.status,
    };
    match state
        .service
        .update_listing(&auth_user.user_id, id, update)
        .await
    {
        Ok(listing) => Json(serde_json::json!(listing)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub(super) async fn handler_api_listing_delete(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> impl IntoResponse {
    match state.service.delete_listing(&auth_user.user_id, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
