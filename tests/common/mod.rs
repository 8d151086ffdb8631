// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{Duration, Utc};
use oura_compare::config::Config;
use oura_compare::db::FirestoreDb;
use oura_compare::models::{CredentialRecord, UserIdentity};
use oura_compare::routes::create_router;
use oura_compare::services::cipher::{encrypt_tokens, TokenCipher};
use oura_compare::AppState;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", std::time::Duration::from_secs(5))
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Test config pointing all Oura traffic at `oura_base_url` (a wiremock server).
#[allow(dead_code)]
pub fn test_config(oura_base_url: &str) -> Config {
    Config {
        oura_api_base_url: oura_base_url.to_string(),
        http_timeout: std::time::Duration::from_secs(2),
        ..Config::default()
    }
}

/// Shared state on an in-memory store.
#[allow(dead_code)]
pub fn test_state(oura_base_url: &str) -> Arc<AppState> {
    let state = AppState::new(test_config(oura_base_url), FirestoreDb::new_in_memory())
        .expect("Failed to build test state");
    Arc::new(state)
}

/// Create a test app with offline dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(oura_base_url: &str) -> (axum::Router, Arc<AppState>) {
    let state = test_state(oura_base_url);
    (create_router(state.clone()), state)
}

/// Create a session JWT the way the auth middleware expects it.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: Uuid, signing_key: &[u8]) -> String {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: usize,
        iat: usize,
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 86400,
        iat: now,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}

/// Store a fresh user and return it.
#[allow(dead_code)]
pub async fn seed_user(db: &FirestoreDb, provider_user_id: &str) -> UserIdentity {
    let user = UserIdentity::new(provider_user_id.to_string(), None);
    db.upsert_user(&user).await.unwrap();
    user
}

/// Store credentials encrypted with `key`, expiring `expires_in_secs` from now.
#[allow(dead_code)]
pub async fn seed_credentials_with_key(
    db: &FirestoreDb,
    key: &[u8],
    user_id: Uuid,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in_secs: i64,
) -> CredentialRecord {
    let cipher = TokenCipher::new(key).unwrap();
    let (access_token_encrypted, refresh_token_encrypted) =
        encrypt_tokens(&cipher, access_token, refresh_token, user_id).unwrap();
    let now = Utc::now();
    let record = CredentialRecord {
        access_token_encrypted,
        refresh_token_encrypted,
        expires_at: now + Duration::seconds(expires_in_secs),
        scopes: vec!["daily".to_string()],
        updated_at: now,
        lifetime_secs: None,
    };
    db.set_credentials(user_id, &record).await.unwrap();
    record
}

/// Store credentials encrypted with the state's configured key.
#[allow(dead_code)]
pub async fn seed_credentials(
    state: &AppState,
    user_id: Uuid,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in_secs: i64,
) -> CredentialRecord {
    seed_credentials_with_key(
        &state.db,
        &state.config.token_encryption_key,
        user_id,
        access_token,
        refresh_token,
        expires_in_secs,
    )
    .await
}

/// Decrypt a stored token field for assertions.
#[allow(dead_code)]
pub fn decrypt_field(state: &AppState, user_id: Uuid, encrypted: &str) -> String {
    let cipher = TokenCipher::new(&state.config.token_encryption_key).unwrap();
    cipher
        .decrypt(encrypted, &oura_compare::services::cipher::user_aad(user_id))
        .unwrap()
}

/// Make `a` and `b` accepted friends.
#[allow(dead_code)]
pub async fn make_friends(state: &AppState, a: Uuid, b: Uuid) {
    state.friends.propose(a, b).await.unwrap();
    state.friends.accept(a, b).await.unwrap();
}

/// OAuth2 token response body.
#[allow(dead_code)]
pub fn token_json(access: &str, refresh: Option<&str>, expires_in: i64) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": expires_in,
        "scope": "personal daily",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::Value::String(refresh.to_string());
    }
    body
}

/// One page of an Oura daily collection.
#[allow(dead_code)]
pub fn daily_page(days: &[(&str, Option<f64>)], next_token: Option<&str>) -> serde_json::Value {
    let data: Vec<serde_json::Value> = days
        .iter()
        .map(|(day, score)| {
            serde_json::json!({
                "id": format!("doc-{}", day),
                "day": day,
                "score": score,
                "contributors": {},
                "timestamp": format!("{}T00:00:00+00:00", day),
            })
        })
        .collect();
    serde_json::json!({ "data": data, "next_token": next_token })
}
