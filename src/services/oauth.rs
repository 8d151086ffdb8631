// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Oura OAuth2 protocol adapter.
//!
//! Handles:
//! - Authorization URL construction
//! - Authorization-code exchange
//! - Refresh-token exchange (revoked vs. transient failures)
//! - Best-effort token revocation
//!
//! Holds no state besides the HTTP client. Codes and tokens are never logged.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::Config;
use crate::error::AppError;

/// Oura consent page.
const AUTHORIZE_URL: &str = "https://cloud.ouraring.com/oauth/authorize";

/// Longest access-token lifetime accepted from Oura (one year).
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Scopes requested at authorization time.
pub const OURA_SCOPES: &[&str] = &["personal", "daily", "heartrate", "workout", "session", "sleep"];

/// Why a refresh-token exchange failed.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The refresh token is no longer valid; the user must re-authorize.
    #[error("refresh token revoked")]
    Revoked,

    /// Network trouble or a provider-side failure; safe to retry later.
    #[error("transient refresh failure: {0}")]
    Transient(String),
}

/// Tokens issued by Oura.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Standard OAuth2 token response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_grant(self) -> Option<TokenGrant> {
        if self.access_token.is_empty()
            || self.expires_in <= 0
            || self.expires_in > MAX_TOKEN_LIFETIME_SECS
        {
            return None;
        }
        Some(TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_in: self.expires_in,
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        })
    }
}

/// OAuth2 error body (`{"error": "invalid_grant", ...}`).
#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
}

/// Oura OAuth client.
#[derive(Clone)]
pub struct OuraOAuthClient {
    http: reqwest::Client,
    token_url: String,
    revoke_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OuraOAuthClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            token_url: format!("{}/oauth/token", config.oura_api_base_url),
            revoke_url: format!("{}/oauth/revoke", config.oura_api_base_url),
            client_id: config.oura_client_id.clone(),
            client_secret: config.oura_client_secret.clone(),
            redirect_uri: config.oura_redirect_uri.clone(),
        })
    }

    /// URL the user is sent to for consent.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            AUTHORIZE_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&OURA_SCOPES.join(" ")),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AppError::TemporarilyUnavailable(format!("Token exchange request failed: {}", e))
                } else {
                    AppError::AuthExchange(format!("Token exchange request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // Only the OAuth error code; the body may echo request parameters.
            let error_code = oauth_error_code(&body);
            tracing::error!(status = %status, error = %error_code, "Oura token exchange failed");
            return Err(AppError::AuthExchange(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::AuthExchange(format!("Failed to parse token response: {}", e)))?;

        parsed.into_grant().ok_or_else(|| {
            AppError::AuthExchange("Token response missing access token or lifetime".to_string())
        })
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Transient(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_refresh_failure(status, &body));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            RefreshError::Transient(format!("Failed to parse refresh response: {}", e))
        })?;

        parsed.into_grant().ok_or_else(|| {
            RefreshError::Transient("Refresh response missing access token or lifetime".to_string())
        })
    }

    /// Revoke an access token at Oura. Best effort; callers log and move on.
    pub async fn revoke(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .get(&self.revoke_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            // The URL carries the token, keep it out of the error.
            .map_err(|e| AppError::ProviderApi(format!("Revoke request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(AppError::ProviderApi(format!(
                "Revoke failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// The `error` field of an OAuth2 error body, or empty if there is none.
fn oauth_error_code(body: &str) -> String {
    serde_json::from_str::<OAuthErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default()
}

/// Decide whether a failed refresh means the grant is gone or just a hiccup.
fn classify_refresh_failure(status: StatusCode, body: &str) -> RefreshError {
    let error_code = oauth_error_code(body);

    if error_code == "invalid_grant" || status == StatusCode::UNAUTHORIZED {
        tracing::warn!(status = %status, "Oura refresh token rejected");
        return RefreshError::Revoked;
    }

    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        tracing::error!(status = %status, error = %error_code, "Unexpected Oura refresh failure");
    }

    RefreshError::Transient(format!("HTTP {}", status))
}
