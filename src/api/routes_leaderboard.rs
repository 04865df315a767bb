//! Leaderboard API.
//!
//! `GET /api/leaderboard?scope=global|challenge&limit=N&offset=M`
//!
//! `global` ranks pets by love count; `challenge` ranks submissions to the
//! active weekly challenge by net vote score. `limit` defaults to
//! `[leaderboard] default_limit` and is clamped to `max_limit`.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiQuery, AppState};
use crate::leaderboard::Scope;

#[derive(Deserialize)]
pub(super) struct LeaderboardQuery {
    #[serde(default)]
    scope: Scope,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

pub(super) async fn handler_api_leaderboard(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<LeaderboardQuery>,
) -> impl IntoResponse {
    match state
        .service
        .leaderboard(params.scope, params.limit, params.offset)
        .await
    {
        Ok(page) => Json(serde_json::json!(page)).into_response(),
        Err(e) => e.into_response(),
    }
}
