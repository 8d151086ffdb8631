// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Comparison engine tests.
//!
//! Two users' Oura data is served by one mock server and told apart by
//! bearer token.

use chrono::NaiveDate;
use oura_compare::error::{AppError, NotAuthorizedReason};
use oura_compare::models::{DateRange, MetricType, SideFailure};
use oura_compare::AppState;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{
    daily_page, make_friends, seed_credentials, seed_credentials_with_key, seed_user, test_state,
    token_json,
};

const SLEEP_PATH: &str = "/v2/usercollection/daily_sleep";

struct Fixture {
    server: MockServer,
    state: Arc<AppState>,
    alice: Uuid,
    bob: Uuid,
}

/// Alice and Bob, friends, both connected with fresh tokens.
async fn setup() -> Fixture {
    let server = MockServer::start().await;
    let state = test_state(&server.uri());
    let alice = seed_user(&state.db, "oura-alice").await.user_id;
    let bob = seed_user(&state.db, "oura-bob").await.user_id;
    make_friends(&state, alice, bob).await;
    seed_credentials(&state, alice, "tok-alice", Some("rt-alice"), 3600).await;
    seed_credentials(&state, bob, "tok-bob", Some("rt-bob"), 3600).await;
    Fixture {
        server,
        state,
        alice,
        bob,
    }
}

async fn mount_sleep(server: &MockServer, token: &str, days: &[(&str, Option<f64>)]) {
    Mock::given(method("GET"))
        .and(path(SLEEP_PATH))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(daily_page(days, None)))
        .mount(server)
        .await;
}

fn march(start: u32, end: u32) -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2025, 3, start).unwrap(),
        NaiveDate::from_ymd_opt(2025, 3, end).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_compare_aligns_both_sides() {
    let f = setup().await;
    mount_sleep(
        &f.server,
        "tok-alice",
        &[
            ("2025-03-01", Some(80.0)),
            ("2025-03-02", Some(82.0)),
            ("2025-03-03", Some(75.0)),
            ("2025-03-05", Some(88.0)),
        ],
    )
    .await;
    mount_sleep(
        &f.server,
        "tok-bob",
        &[
            ("2025-03-02", Some(70.0)),
            ("2025-03-03", Some(71.0)),
            ("2025-03-04", Some(72.0)),
            // Outside the range, ignored
            ("2025-03-06", Some(99.0)),
        ],
    )
    .await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 5))
        .await
        .unwrap();

    assert_eq!(result.days.len(), 5);
    assert_eq!(result.first.user_id, f.alice);
    assert_eq!(result.second.user_id, f.bob);
    assert_eq!(
        result.first.values,
        vec![Some(80.0), Some(82.0), Some(75.0), None, Some(88.0)]
    );
    assert_eq!(
        result.second.values,
        vec![None, Some(70.0), Some(71.0), Some(72.0), None]
    );
    assert!(result.first.failure.is_none());
    assert!(result.second.failure.is_none());
}

#[tokio::test]
async fn test_compare_is_symmetric() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-alice", &[("2025-03-01", Some(80.0))]).await;
    mount_sleep(&f.server, "tok-bob", &[("2025-03-02", Some(70.0))]).await;

    let ab = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 3))
        .await
        .unwrap();
    let ba = f
        .state
        .comparison
        .compare(f.bob, f.alice, MetricType::Sleep, march(1, 3))
        .await
        .unwrap();

    assert_eq!(ab.days, ba.days);
    assert_eq!(ab.first, ba.second);
    assert_eq!(ab.second, ba.first);
}

#[tokio::test]
async fn test_compare_requires_friendship() {
    let f = setup().await;
    let carol = seed_user(&f.state.db, "oura-carol").await.user_id;
    seed_credentials(&f.state, carol, "tok-carol", None, 3600).await;

    let result = f
        .state
        .comparison
        .compare(f.alice, carol, MetricType::Sleep, march(1, 3))
        .await;
    assert!(matches!(
        result,
        Err(AppError::NotAuthorized(NotAuthorizedReason::NotFriends))
    ));

    // A pending request is not enough
    f.state.friends.propose(f.alice, carol).await.unwrap();
    let result = f
        .state
        .comparison
        .compare(carol, f.alice, MetricType::Sleep, march(1, 3))
        .await;
    assert!(matches!(
        result,
        Err(AppError::NotAuthorized(NotAuthorizedReason::NotFriends))
    ));

    // Removing a friend revokes access
    f.state.friends.remove(f.bob, f.alice).await.unwrap();
    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 3))
        .await;
    assert!(matches!(
        result,
        Err(AppError::NotAuthorized(NotAuthorizedReason::NotFriends))
    ));
}

#[tokio::test]
async fn test_compare_with_self_is_invalid() {
    let f = setup().await;
    let result = f
        .state
        .comparison
        .compare(f.alice, f.alice, MetricType::Sleep, march(1, 3))
        .await;
    assert!(matches!(result, Err(AppError::InvalidRelation(_))));
}

#[tokio::test]
async fn test_disconnected_friend_yields_partial_result() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-alice", &[("2025-03-02", Some(64.0))]).await;
    f.state.db.delete_credentials(f.bob).await.unwrap();

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 3))
        .await
        .unwrap();

    assert_eq!(result.first.values, vec![None, Some(64.0), None]);
    assert!(result.first.failure.is_none());
    assert_eq!(result.second.values, vec![None, None, None]);
    assert_eq!(result.second.failure, Some(SideFailure::ReconnectRequired));
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_retried_once() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-bob", &[("2025-03-01", Some(70.0))]).await;

    Mock::given(method("GET"))
        .and(path(SLEEP_PATH))
        .and(header("authorization", "Bearer tok-alice"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&f.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=rt-alice"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("tok-alice-2", None, 86400)),
        )
        .expect(1)
        .mount(&f.server)
        .await;
    mount_sleep(&f.server, "tok-alice-2", &[("2025-03-01", Some(90.0))]).await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 1))
        .await
        .unwrap();

    assert_eq!(result.first.values, vec![Some(90.0)]);
    assert_eq!(result.second.values, vec![Some(70.0)]);
}

#[tokio::test]
async fn test_rejected_twice_reports_reconnect() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-alice", &[("2025-03-01", Some(80.0))]).await;

    Mock::given(method("GET"))
        .and(path(SLEEP_PATH))
        .and(header("authorization", "Bearer tok-bob"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&f.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("tok-bob-2", None, 86400)),
        )
        .expect(1)
        .mount(&f.server)
        .await;
    Mock::given(method("GET"))
        .and(path(SLEEP_PATH))
        .and(header("authorization", "Bearer tok-bob-2"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&f.server)
        .await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 1))
        .await
        .unwrap();

    assert_eq!(result.first.values, vec![Some(80.0)]);
    assert_eq!(result.second.failure, Some(SideFailure::ReconnectRequired));
}

#[tokio::test]
async fn test_short_rate_limit_is_waited_out() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-alice", &[("2025-03-01", Some(80.0))]).await;

    // First call for Bob is throttled, the retry succeeds.
    Mock::given(method("GET"))
        .and(path(SLEEP_PATH))
        .and(header("authorization", "Bearer tok-bob"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&f.server)
        .await;
    mount_sleep(&f.server, "tok-bob", &[("2025-03-01", Some(60.0))]).await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 1))
        .await
        .unwrap();

    assert_eq!(result.second.values, vec![Some(60.0)]);
    assert!(result.second.failure.is_none());
}

#[tokio::test]
async fn test_persistent_rate_limit_stops_after_max_attempts() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-alice", &[("2025-03-01", Some(80.0))]).await;

    Mock::given(method("GET"))
        .and(path(SLEEP_PATH))
        .and(header("authorization", "Bearer tok-bob"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(oura_compare::services::comparison::MAX_FETCH_ATTEMPTS as u64)
        .mount(&f.server)
        .await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 1))
        .await
        .unwrap();

    assert_eq!(
        result.second.failure,
        Some(SideFailure::RateLimited {
            retry_after_secs: 0
        })
    );
}

#[tokio::test]
async fn test_long_rate_limit_is_not_waited() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-alice", &[("2025-03-01", Some(80.0))]).await;

    Mock::given(method("GET"))
        .and(path(SLEEP_PATH))
        .and(header("authorization", "Bearer tok-bob"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3600"))
        .expect(1)
        .mount(&f.server)
        .await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 1))
        .await
        .unwrap();

    assert_eq!(result.first.values, vec![Some(80.0)]);
    assert_eq!(
        result.second.failure,
        Some(SideFailure::RateLimited {
            retry_after_secs: 3600
        })
    );
}

#[tokio::test]
async fn test_provider_error_on_one_side() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-bob", &[("2025-03-01", Some(70.0))]).await;
    Mock::given(method("GET"))
        .and(path(SLEEP_PATH))
        .and(header("authorization", "Bearer tok-alice"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&f.server)
        .await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 1))
        .await
        .unwrap();

    assert_eq!(result.first.failure, Some(SideFailure::ProviderError));
    assert_eq!(result.second.values, vec![Some(70.0)]);
}

#[tokio::test]
async fn test_undecryptable_credentials_abort_comparison() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-alice", &[("2025-03-01", Some(80.0))]).await;
    seed_credentials_with_key(
        &f.state.db,
        b"another_key_that_is_32_bytes_!!!",
        f.bob,
        "tok-bob",
        Some("rt-bob"),
        3600,
    )
    .await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 1))
        .await;
    assert!(matches!(result, Err(AppError::Decryption(_))));
}

#[tokio::test]
async fn test_result_never_contains_tokens() {
    let f = setup().await;
    mount_sleep(&f.server, "tok-alice", &[("2025-03-01", Some(80.0))]).await;
    mount_sleep(&f.server, "tok-bob", &[("2025-03-01", Some(70.0))]).await;

    let result = f
        .state
        .comparison
        .compare(f.alice, f.bob, MetricType::Sleep, march(1, 1))
        .await
        .unwrap();

    let json = serde_json::to_string(&result).unwrap();
    assert!(!json.contains("tok-"));
    assert!(!json.contains("rt-"));
    assert!(!json.contains("oura-alice"));
}
