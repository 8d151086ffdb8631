// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Oura OAuth authentication routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE};
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a user may sit on the Oura consent page.
const STATE_MAX_AGE_MS: u128 = 15 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/oura", get(auth_start))
        .route("/auth/oura/callback", get(auth_callback))
        .route("/auth/logout", get(logout))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize, Validate)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// If not provided, uses FRONTEND_URL env var.
    #[serde(default)]
    #[validate(url, length(max = 2048))]
    redirect_uri: Option<String>,
}

/// Start OAuth flow - redirect to Oura authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
) -> Result<Redirect> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let frontend_url = match params.redirect_uri {
        Some(url) if is_allowed_redirect(&url, &state.config.frontend_url) => url,
        Some(url) => {
            tracing::warn!(redirect_uri = %url, "Rejected redirect_uri outside the frontend");
            return Err(AppError::BadRequest("redirect_uri not allowed".to_string()));
        }
        None => state.config.frontend_url.clone(),
    };

    let oauth_state = sign_state(&frontend_url, now_ms()?, &state.config.oauth_state_key)?;
    let auth_url = state.oauth.authorize_url(&oauth_state);

    tracing::info!(
        client_id = %state.config.oura_client_id,
        frontend_url = %frontend_url,
        "Starting OAuth flow, redirecting to Oura"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, create session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    let Some(frontend_url) =
        verify_and_decode_state(&params.state, &state.config.oauth_state_key, now_ms()?)
    else {
        tracing::warn!("Invalid, expired or tampered OAuth state parameter");
        let redirect = format!("{}?error=invalid_state", state.config.frontend_url);
        return Ok(Redirect::temporary(&redirect));
    };

    // Check for OAuth errors (e.g. the user denied access)
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Oura");
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(&error));
        return Ok(Redirect::temporary(&redirect));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    tracing::info!("Exchanging authorization code for tokens");
    let user = state.tokens.connect(&code).await?;

    // Create JWT session token
    let jwt = create_jwt(user.user_id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    // Redirect to frontend with token
    let redirect_url = format!("{}/callback?token={}", frontend_url, jwt);

    Ok(Redirect::temporary(&redirect_url))
}

/// Logout - drop the session cookie and go back to the frontend.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::temporary(&state.config.frontend_url))
}

fn now_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

/// Only the configured frontend or a local dev server may receive the session.
fn is_allowed_redirect(url: &str, frontend_url: &str) -> bool {
    url == frontend_url
        || url.starts_with(&format!("{}/", frontend_url.trim_end_matches('/')))
        || url.starts_with("http://localhost:")
        || url.starts_with("http://127.0.0.1:")
}

/// Build the OAuth `state`: base64("frontend_url|timestamp_hex|signature_hex").
fn sign_state(frontend_url: &str, timestamp_ms: u128, secret: &[u8]) -> Result<String> {
    let state_payload = format!("{}|{:x}", frontend_url, timestamp_ms);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(state_payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let signed_state = format!("{}|{}", state_payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed_state.as_bytes()))
}

/// Verify HMAC signature and age, and decode the frontend URL from the OAuth state parameter.
fn verify_and_decode_state(state: &str, secret: &[u8], now_ms: u128) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // The URL may itself contain '|', so split from the right.
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}", frontend_url, timestamp_hex);
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    let expected_signature = hex::encode(mac.finalize().into_bytes());

    if !bool::from(signature_hex.as_bytes().ct_eq(expected_signature.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_ms) > STATE_MAX_AGE_MS {
        tracing::warn!("OAuth state expired");
        return None;
    }

    Some(frontend_url.to_string())
}
