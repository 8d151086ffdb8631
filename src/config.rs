//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables (Cloud Run secret bindings
//! in production, `.env` locally) and read once at startup.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::env;
use std::time::Duration;

/// Default Oura API host (token endpoint and data API share it).
pub const DEFAULT_OURA_API_BASE_URL: &str = "https://api.ouraring.com";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Oura OAuth client ID (public)
    pub oura_client_id: String,
    /// Redirect URI registered with Oura for the OAuth callback
    pub oura_redirect_uri: String,
    /// Base URL for the Oura token endpoint and data API
    pub oura_api_base_url: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Keep all state in process memory instead of Firestore
    pub use_in_memory_store: bool,
    /// Server port
    pub port: u16,

    // --- Timeouts and retry policy ---
    /// Per-request timeout for calls to Oura
    pub http_timeout: Duration,
    /// Per-operation timeout for credential and friendship storage
    pub store_timeout: Duration,
    /// Access tokens are treated as expired this long before their literal expiry
    pub token_refresh_margin: Duration,
    /// Longest provider-requested backoff we are willing to wait out in-request
    pub max_rate_limit_wait: Duration,

    // --- Secrets ---
    /// Oura OAuth client secret
    pub oura_client_secret: String,
    /// AES-256-GCM key for stored OAuth tokens (raw bytes, validated by `TokenCipher`)
    pub token_encryption_key: Vec<u8>,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            oura_client_id: "test_client_id".to_string(),
            oura_redirect_uri: "http://localhost:8080/auth/oura/callback".to_string(),
            oura_api_base_url: DEFAULT_OURA_API_BASE_URL.to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            use_in_memory_store: true,
            port: 8080,
            http_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(10),
            token_refresh_margin: Duration::from_secs(5 * 60),
            max_rate_limit_wait: Duration::from_secs(30),
            oura_client_secret: "test_secret".to_string(),
            token_encryption_key: b"test_token_key_exactly_32_bytes!".to_vec(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            oura_client_id: required("OURA_CLIENT_ID")?,
            oura_redirect_uri: required("OURA_REDIRECT_URI")?,
            oura_api_base_url: env::var("OURA_API_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_OURA_API_BASE_URL.to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            use_in_memory_store: env::var("USE_IN_MEMORY_STORE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            port: parse_or("PORT", 8080)?,

            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 10)?),
            store_timeout: Duration::from_secs(parse_or("STORE_TIMEOUT_SECS", 10)?),
            token_refresh_margin: Duration::from_secs(parse_or("TOKEN_REFRESH_MARGIN_SECS", 300)?),
            max_rate_limit_wait: Duration::from_secs(parse_or("MAX_RATE_LIMIT_WAIT_SECS", 30)?),

            oura_client_secret: required("OURA_CLIENT_SECRET")?,
            token_encryption_key: BASE64
                .decode(required("TOKEN_ENCRYPTION_KEY")?)
                .map_err(|_| ConfigError::Invalid("TOKEN_ENCRYPTION_KEY"))?,
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),
        })
    }
}

/// Read a required variable, trimming stray whitespace from secret bindings.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
