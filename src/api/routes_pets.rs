//! # Pet API
//!
//! | Endpoint | Operation |
//! |----------|-----------|
//! | `GET /api/pets` | Caller's pets |
//! | `POST /api/pets` | Add a pet |
//! | `GET /api/pets/{id}` | One pet |
//! | `POST /api/pets/{id}/love` | Add one to the pet's love count |

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::middleware_auth::RequireAuth;
use super::{ApiJson, ApiPath, AppState};
use crate::service::PetInput;

pub(super) async fn handler_api_pets_list(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
) -> impl IntoResponse {
    match state.service.list_pets(&auth_user.user_id).await {
        Ok(pets) => Json(serde_json::json!({ "pets": pets })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreatePetPayload {
    name: String,
    species: String,
    breed: Option<String>,
    avatar_url: Option<String>,
}

pub(super) async fn handler_api_pets_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(auth_user): RequireAuth,
    ApiJson(payload): ApiJson<CreatePetPayload>,
) -> impl IntoResponse {
    let input = PetInput {
        name: payload.name,
        species: payload.species,
        breed: payload.breed,
        avatar_url: payload.avatar_url,
    };
    match state.service.create_pet(&auth_user.user_id, input).await {
        Ok(pet) => (StatusCode::CREATED, Json(serde_json::json!(pet))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub(super) async fn handler_api_pet_get(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> impl IntoResponse {
    match state.service.get_pet(id).await {
        Ok(pet) => Json(serde_json::json!(pet)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub(super) async fn handler_api_pet_love(
    State(state): State<Arc<AppState>>,
    RequireAuth(_auth_user): RequireAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> impl IntoResponse {
    match state.service.love_pet(id).await {
        Ok(pet) => Json(serde_json::json!(pet)).into_response(),
        Err(e) => e.into_response(),
    }
}
