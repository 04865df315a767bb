//! # API — HTTP Surface
//!
//! Axum router over [`Petnet`]. Handlers authenticate the caller with the
//! extractors in [`middleware_auth`], call one service operation, and return
//! its JSON projection. Failures become `{"success": false, "error", "kind"}`
//! with the status chosen by [`PetnetError`]'s `IntoResponse` impl below.
//!
//! Every request passes through [`metrics_middleware`], which assigns or
//! propagates `x-request-id`, opens a `request` tracing span and records the
//! latency histogram.

pub(crate) mod middleware_auth;
mod routes_auth;
mod routes_challenges;
mod routes_health;
mod routes_leaderboard;
mod routes_market;
mod routes_media;
mod routes_pets;
mod routes_posts;
mod routes_votes;
mod routes_xp;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};

use crate::config::{Config, MediaBackend};
use crate::error::PetnetError;
use crate::media::{self, BlobStore};
use crate::metrics::HttpLabel;
use crate::service::Petnet;
use crate::store::Store;

pub struct AppState {
    pub service: Petnet,
    pub config: Config,
    pub media: Arc<dyn BlobStore>,
}

impl AppState {
    pub fn new(service: Petnet, config: Config, media: Arc<dyn BlobStore>) -> Arc<Self> {
        Arc::new(AppState {
            service,
            config,
            media,
        })
    }

    /// Wire a service and blob store from configuration.
    pub fn from_config(store: Arc<dyn Store>, config: Config) -> Result<Arc<Self>> {
        let service = Petnet::new(store)
            .with_reset_policy(config.xp.reset_policy()?)
            .with_leaderboard(config.leaderboard.clone());
        let media = media::from_config(&config.media)?;
        Ok(AppState::new(service, config, media))
    }
}

impl IntoResponse for PetnetError {
    fn into_response(self) -> Response {
        let status = match &self {
            PetnetError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PetnetError::NotFound(_) => StatusCode::NOT_FOUND,
            PetnetError::Forbidden(_) => StatusCode::FORBIDDEN,
            PetnetError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PetnetError::DuplicateAction(_) | PetnetError::Conflict(_) => StatusCode::CONFLICT,
            PetnetError::NotEligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PetnetError::Database(_) | PetnetError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = if self.is_internal() {
            error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": message,
                "kind": self.kind(),
            })),
        )
            .into_response()
    }
}

/// `Json` whose rejection is reported as `invalid_input`.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(rejected_json(rejection)),
        }
    }
}

fn rejected_json(rejection: JsonRejection) -> Response {
    PetnetError::invalid(rejection.body_text()).into_response()
}

/// `Path` whose rejection is reported as `invalid_input`.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Path::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Path(value)| ApiPath(value))
            .map_err(|rejection: PathRejection| {
                PetnetError::invalid(rejection.body_text()).into_response()
            })
    }
}

/// `Query` whose rejection is reported as `invalid_input`.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Query::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Query(value)| ApiQuery(value))
            .map_err(|rejection: QueryRejection| {
                PetnetError::invalid(rejection.body_text()).into_response()
            })
    }
}

/// Records request latency, propagates or assigns `x-request-id`, and runs
/// the request inside a `request` span.
async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .service
        .metrics()
        .http_request_duration
        .get_or_create(&HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse ids in a path so histogram labels stay low-cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if uuid::Uuid::parse_str(seg).is_ok() {
                ":uuid".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let static_dir = state.config.server.static_dir.clone();
    let mut app = Router::new()
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        .route("/api/me", get(routes_auth::handler_api_me))
        .route("/api/challenges", get(routes_xp::handler_api_challenges))
        .route("/api/xp/progress", get(routes_xp::handler_api_progress))
        .route("/api/xp/track", post(routes_xp::handler_api_track))
        .route(
            "/api/pets",
            get(routes_pets::handler_api_pets_list).post(routes_pets::handler_api_pets_create),
        )
        .route("/api/pets/{id}", get(routes_pets::handler_api_pet_get))
        .route("/api/pets/{id}/love", post(routes_pets::handler_api_pet_love))
        .route(
            "/api/barks",
            get(routes_posts::handler_api_barks_list).post(routes_posts::handler_api_barks_create),
        )
        .route(
            "/api/posts",
            get(routes_posts::handler_api_posts_list).post(routes_posts::handler_api_posts_create),
        )
        .route("/api/posts/{id}", get(routes_posts::handler_api_post_get))
        .route(
            "/api/posts/{id}/comments",
            get(routes_posts::handler_api_comments_list)
                .post(routes_posts::handler_api_comments_create),
        )
        .route(
            "/api/weekly-challenge",
            get(routes_challenges::handler_api_weekly_active),
        )
        .route(
            "/api/weekly-challenges",
            post(routes_challenges::handler_api_weekly_create),
        )
        .route(
            "/api/weekly-challenge/submissions",
            post(routes_challenges::handler_api_submission_create),
        )
        .route("/api/votes", post(routes_votes::handler_api_vote))
        .route(
            "/api/leaderboard",
            get(routes_leaderboard::handler_api_leaderboard),
        )
        .route(
            "/api/listings",
            get(routes_market::handler_api_listings_list)
                .post(routes_market::handler_api_listings_create),
        )
        .route(
            "/api/listings/{id}",
            get(routes_market::handler_api_listing_get)
                .patch(routes_market::handler_api_listing_update)
                .delete(routes_market::handler_api_listing_delete),
        )
        .route("/api/media", post(routes_media::handler_api_media_upload));

    if state.config.media.backend == MediaBackend::Local {
        app = app.nest_service("/media", ServeDir::new(&state.config.media.local_dir));
    }
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(CatchPanicLayer::new())
    .layer(axum::middleware::from_fn_with_state(
        state.clone(),
        metrics_middleware,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(DefaultBodyLimit::max(body_limit))
    .layer(RequestBodyLimitLayer::new(body_limit))
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        timeout,
    ))
    .with_state(state)
}

pub async fn run(state: Arc<AppState>, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, "petnet listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("petnet shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
