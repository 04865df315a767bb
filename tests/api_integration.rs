//! API integration tests for the Petnet Axum REST endpoints.
//!
//! Requests go straight into the router with `tower::ServiceExt::oneshot`,
//! no TCP listener. Each test builds a fresh app over the in-memory store
//! with a pinned clock (`common::build_test_app()`), so no database is
//! needed.
//!
//! Tokens are minted with the same HS256 secret the test config verifies
//! against. The helpers return `(StatusCode, serde_json::Value)` tuples for
//! concise assertions.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(json!(null));
    (status, json)
}

async fn get(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

async fn with_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

async fn post_json(app: &Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    with_json(app, "POST", uri, Some(token), body).await
}

async fn track(app: &Router, token: &str, body: Value) -> (StatusCode, Value) {
    post_json(app, "/api/xp/track", token, body).await
}

// == Health ==================================================================

#[tokio::test]
async fn healthz_and_readyz() {
    let app = common::build_test_app();
    let (status, _) = get(&app.router, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&app.router, "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_exposes_prometheus_text() {
    let app = common::build_test_app();
    let token = common::token_for("mia");
    track(&app.router, &token, json!({"challengeId": "daily_post"})).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("petnet_challenge_completions"));
    assert!(text.contains("petnet_http_request_duration_seconds"));
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = common::build_test_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

// == Auth ====================================================================

#[tokio::test]
async fn me_requires_a_token() {
    let app = common::build_test_app();
    let (status, body) = get(&app.router, "/api/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "unauthenticated");
}

#[tokio::test]
async fn forged_and_wrong_audience_tokens_are_rejected() {
    let app = common::build_test_app();
    let forged = common::token_with("mia", "not-the-secret", "authenticated");
    let (status, _) = get(&app.router, "/api/me", Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let anon = common::token_with("mia", common::TEST_SECRET, "anon");
    let (status, _) = get(&app.router, "/api/me", Some(&anon)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_request_provisions_the_account() {
    let app = common::build_test_app();
    let token = common::token_for("mia");
    let (status, body) = get(&app.router, "/api/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "mia");
    assert_eq!(body["displayName"], "mia the human");
    assert_eq!(body["role"], "member");
    assert_eq!(body["totalXp"], 0);
    assert_eq!(body["level"], 1);
}

// == XP challenges ===========================================================

#[tokio::test]
async fn catalog_is_public() {
    let app = common::build_test_app();
    let (status, body) = get(&app.router, "/api/challenges", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["challenges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"daily_love"));
    assert!(ids.contains(&"daily_expand_petnet"));
}

#[tokio::test]
async fn completing_a_challenge_credits_xp_once() {
    let app = common::build_test_app();
    let token = common::token_for("mia");

    for expected in 1..=4 {
        let (status, body) = track(&app.router, &token, json!({"challengeId": "daily_love"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["progress"], expected);
        assert_eq!(body["completed"], false);
        assert_eq!(body["xpGained"], 0);
        assert!(body.get("message").is_none());
    }

    let (_, body) = track(&app.router, &token, json!({"challengeId": "daily_love"})).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["completed"], true);
    assert_eq!(body["xpGained"], 15);
    assert_eq!(body["totalXp"], 15);
    assert_eq!(body["message"], "Challenge complete! +15 XP");

    let (_, body) = track(&app.router, &token, json!({"challengeId": "daily_love"})).await;
    assert_eq!(body["progress"], 5);
    assert_eq!(body["xpGained"], 0);
    assert_eq!(body["totalXp"], 15);

    let (_, me) = get(&app.router, "/api/me", Some(&token)).await;
    assert_eq!(me["totalXp"], 15);
}

#[tokio::test]
async fn daily_progress_resets_after_the_boundary() {
    let app = common::build_test_app();
    let token = common::token_for("mia");
    let (_, body) = track(&app.router, &token, json!({"challengeId": "daily_post"})).await;
    assert_eq!(body["xpGained"], 10);

    // Next day, past 06:00 UTC.
    app.clock.advance(Duration::hours(19));

    let (_, progress) = get(&app.router, "/api/xp/progress", Some(&token)).await;
    let daily_post = progress["progress"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["challengeId"] == "daily_post")
        .unwrap()
        .clone();
    assert_eq!(daily_post["progress"], 0);
    assert_eq!(daily_post["completed"], false);

    let (_, body) = track(&app.router, &token, json!({"challengeId": "daily_post"})).await;
    assert_eq!(body["reset"], true);
    assert_eq!(body["xpGained"], 10);
    assert_eq!(body["totalXp"], 20);
}

#[tokio::test]
async fn track_rejects_bad_input() {
    let app = common::build_test_app();
    let token = common::token_for("mia");

    let (status, body) = track(&app.router, &token, json!({"challengeId": "daily_nap"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, body) = track(
        &app.router,
        &token,
        json!({"challengeId": "daily_love", "increment": -1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let (status, body) = track(&app.router, &token, json!({"increment": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn sharing_twice_with_the_same_recipient_is_a_duplicate() {
    let app = common::build_test_app();
    let token = common::token_for("mia");
    let share = |recipient: &str| json!({"challengeId": "daily_expand_petnet", "recipient": recipient});

    let (status, _) = track(&app.router, &token, share("Leo@Example.com")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = track(&app.router, &token, share(" leo@example.com ")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "duplicate_action");

    let (status, _) = track(&app.router, &token, json!({"challengeId": "daily_expand_petnet"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    track(&app.router, &token, share("ana@example.com")).await;
    let (_, body) = track(&app.router, &token, share("sol@example.com")).await;
    assert_eq!(body["completed"], true);
    assert_eq!(body["xpGained"], 30);
}

// == Pets and leaderboard ====================================================

#[tokio::test]
async fn pets_are_created_loved_and_ranked() {
    let app = common::build_test_app();
    let token = common::token_for("mia");

    let (status, rex) = post_json(
        &app.router,
        "/api/pets",
        &token,
        json!({"name": "Rex", "species": "dog"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rex["level"], 1);
    let (_, tom) = post_json(
        &app.router,
        "/api/pets",
        &token,
        json!({"name": "Tom", "species": "cat"}),
    )
    .await;

    let tom_love = format!("/api/pets/{}/love", tom["id"].as_str().unwrap());
    for _ in 0..2 {
        let (status, _) = post_json(&app.router, &tom_love, &token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, page) = get(&app.router, "/api/leaderboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["scope"], "global");
    let ranked = page["rankedEntities"].as_array().unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0]["entity"]["name"], "Tom");
    assert_eq!(ranked[0]["score"], 2);
    assert_eq!(ranked[0]["rank"], 1);
    assert_eq!(ranked[1]["entity"]["name"], "Rex");
    assert_eq!(ranked[1]["rank"], 2);

    let (_, page) = get(&app.router, "/api/leaderboard?limit=1&offset=1", None).await;
    let ranked = page["rankedEntities"].as_array().unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0]["rank"], 2);

    let (_, mine) = get(&app.router, "/api/pets", Some(&token)).await;
    assert_eq!(mine["pets"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_pet_is_not_found_and_bad_ids_are_invalid() {
    let app = common::build_test_app();
    let (status, _) = get(&app.router, &format!("/api/pets/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app.router, "/api/pets/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn unknown_scope_is_invalid() {
    let app = common::build_test_app();
    let (status, body) = get(&app.router, "/api/leaderboard?scope=galaxy", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

// == Barks, posts, votes =====================================================

#[tokio::test]
async fn bark_post_comment_and_vote() {
    let app = common::build_test_app();
    let mia = common::token_for("mia");
    let leo = common::token_for("leo");

    let (status, bark) = post_json(
        &app.router,
        "/api/barks",
        &mia,
        json!({"slug": "good-dogs", "name": "Good Dogs"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post_json(
        &app.router,
        "/api/barks",
        &leo,
        json!({"slug": "good-dogs", "name": "Also Good Dogs"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (status, post) = post_json(
        &app.router,
        "/api/posts",
        &mia,
        json!({"body": "Rex learned to sit", "barkId": bark["id"]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = post["id"].as_str().unwrap().to_string();

    let comments_uri = format!("/api/posts/{}/comments", post_id);
    let (status, _) = post_json(&app.router, &comments_uri, &leo, json!({"body": "Good boy!"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, comments) = get(&app.router, &comments_uri, None).await;
    assert_eq!(comments["comments"].as_array().unwrap().len(), 1);

    let vote = |value: i64| json!({"votableId": post_id, "value": value});
    let (status, outcome) = post_json(&app.router, "/api/votes", &leo, vote(1)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["action"], "cast");
    assert_eq!(outcome["score"], 1);

    let (_, outcome) = post_json(&app.router, "/api/votes", &mia, vote(-1)).await;
    assert_eq!(outcome["score"], 0);

    let (_, outcome) = post_json(&app.router, "/api/votes", &leo, vote(1)).await;
    assert_eq!(outcome["action"], "retracted");
    assert_eq!(outcome["value"], Value::Null);
    assert_eq!(outcome["score"], -1);

    let (_, fetched) = get(&app.router, &format!("/api/posts/{}", post_id), None).await;
    assert_eq!(fetched["score"], -1);

    let (_, listed) = get(
        &app.router,
        &format!("/api/posts?bark={}", bark["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(listed["posts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn votes_validate_value_and_target() {
    let app = common::build_test_app();
    let token = common::token_for("mia");

    let (status, body) = post_json(
        &app.router,
        "/api/votes",
        &token,
        json!({"votableId": uuid::Uuid::new_v4(), "value": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let (status, body) = post_json(
        &app.router,
        "/api/votes",
        &token,
        json!({"votableId": uuid::Uuid::new_v4(), "value": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "not_eligible");
}

#[tokio::test]
async fn empty_post_is_rejected() {
    let app = common::build_test_app();
    let token = common::token_for("mia");
    let (status, body) = post_json(&app.router, "/api/posts", &token, json!({"body": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

// == Weekly challenge ========================================================

#[tokio::test]
async fn weekly_challenge_flow() {
    let app = common::build_test_app();
    let admin = common::token_for("ada");
    let mia = common::token_for("mia");
    let leo = common::token_for("leo");
    app.state.service.grant_admin("ada").await.unwrap();

    let starts = common::start_time() - Duration::days(1);
    let window = json!({
        "title": "Sleepiest pet",
        "prompt": "Show us the nap",
        "startsAt": starts,
        "endsAt": starts + Duration::days(7),
    });

    let (status, body) = post_json(&app.router, "/api/weekly-challenges", &mia, window.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (status, challenge) =
        post_json(&app.router, "/api/weekly-challenges", &admin, window).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, entry) = post_json(
        &app.router,
        "/api/weekly-challenge/submissions",
        &mia,
        json!({"caption": "zzz", "mediaUrl": "https://cdn.example/nap.jpg"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["challengeId"], challenge["id"]);

    let (_, outcome) = post_json(
        &app.router,
        "/api/votes",
        &leo,
        json!({"votableId": entry["id"], "value": 1}),
    )
    .await;
    assert_eq!(outcome["score"], 1);

    let (_, active) = get(&app.router, "/api/weekly-challenge", None).await;
    assert_eq!(active["challenge"]["id"], challenge["id"]);
    assert_eq!(active["submissions"][0]["score"], 1);

    let (_, page) = get(&app.router, "/api/leaderboard?scope=challenge", None).await;
    assert_eq!(page["challenge"]["id"], challenge["id"]);
    assert_eq!(page["rankedEntities"][0]["entity"]["id"], entry["id"]);
    assert_eq!(page["rankedEntities"][0]["rank"], 1);

    // After the window closes the entry can no longer be voted on.
    app.clock.advance(Duration::days(7));
    let (status, body) = post_json(
        &app.router,
        "/api/votes",
        &mia,
        json!({"votableId": entry["id"], "value": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "not_eligible");

    let (_, page) = get(&app.router, "/api/leaderboard?scope=challenge", None).await;
    assert_eq!(page["challenge"], Value::Null);
    assert!(page["rankedEntities"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn submitting_without_an_active_challenge_is_not_eligible() {
    let app = common::build_test_app();
    let token = common::token_for("mia");
    let (status, body) = post_json(
        &app.router,
        "/api/weekly-challenge/submissions",
        &token,
        json!({"mediaUrl": "https://cdn.example/nap.jpg"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "not_eligible");
}

// == Marketplace =============================================================

#[tokio::test]
async fn listings_are_owned_by_their_seller() {
    let app = common::build_test_app();
    let mia = common::token_for("mia");
    let leo = common::token_for("leo");

    let (status, listing) = post_json(
        &app.router,
        "/api/listings",
        &mia,
        json!({"title": "Cat tree", "priceCents": 4500}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(listing["status"], "active");
    let uri = format!("/api/listings/{}", listing["id"].as_str().unwrap());

    let (status, _) = with_json(&app.router, "PATCH", &uri, Some(&leo), json!({"priceCents": 1})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = with_json(
        &app.router,
        "PATCH",
        &uri,
        Some(&mia),
        json!({"status": "sold"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "sold");
    assert_eq!(updated["priceCents"], 4500);

    let (_, active) = get(&app.router, "/api/listings", None).await;
    assert!(active["listings"].as_array().unwrap().is_empty());
    let (_, sold) = get(&app.router, "/api/listings?status=sold", None).await;
    assert_eq!(sold["listings"].as_array().unwrap().len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .header("authorization", format!("Bearer {}", mia))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(&app.router, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn negative_price_is_rejected() {
    let app = common::build_test_app();
    let token = common::token_for("mia");
    let (status, _) = post_json(
        &app.router,
        "/api/listings",
        &token,
        json!({"title": "Leash", "priceCents": -5}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// == Media ===================================================================

#[tokio::test]
async fn media_upload_stores_content_addressed_file() {
    let app = common::build_test_app();
    let token = common::token_for("mia");
    use base64::Engine;
    let data = base64::engine::general_purpose::STANDARD.encode(b"\x89PNG fake image bytes");

    let (status, body) = post_json(
        &app.router,
        "/api/media",
        &token,
        json!({"data": format!("data:image/png;base64,{}", data), "contentType": "image/png", "folder": "pets"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let url = body["url"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:7001/media/pets/"));
    assert!(url.ends_with(".png"));

    let key = url.trim_start_matches("http://localhost:7001/media/");
    assert!(app.media_dir.path().join(key).exists());

    let (status, body) = post_json(
        &app.router,
        "/api/media",
        &token,
        json!({"data": data, "contentType": "application/pdf"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}
