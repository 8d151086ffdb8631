//! User identity and credential models for storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Internal stable ID (also used as document ID)
    pub user_id: Uuid,
    /// Oura user ID (unique, one per internal ID)
    pub provider_user_id: String,
    /// Email address (if the `personal` scope was granted)
    pub email: Option<String>,
    /// When user first connected
    pub created_at: DateTime<Utc>,
    /// Last successful authorization
    pub last_active: DateTime<Utc>,
}

impl UserIdentity {
    /// A brand-new identity for an Oura user seen for the first time.
    pub fn new(provider_user_id: String, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            provider_user_id,
            email,
            created_at: now,
            last_active: now,
        }
    }
}

/// User's OAuth credentials (encrypted at rest).
///
/// Replaced wholesale on every refresh; never appended to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64), absent if Oura issued none
    pub refresh_token_encrypted: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// Granted OAuth scopes
    pub scopes: Vec<String>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
    /// Lifetime Oura granted the access token, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_secs: Option<i64>,
}

impl CredentialRecord {
    /// Safety margin for this record. Short-lived grants get at most half
    /// their lifetime, otherwise they would be stale the moment they land.
    pub fn refresh_margin(&self, configured: Duration) -> Duration {
        match self.lifetime_secs {
            Some(lifetime) => Duration::try_seconds(lifetime.max(0) / 2)
                .map_or(configured, |half| configured.min(half)),
            None => configured,
        }
    }

    /// When the access token stops being handed out.
    pub fn refresh_at(&self, configured: Duration) -> DateTime<Utc> {
        self.expires_at - self.refresh_margin(configured)
    }

    /// Whether the access token should be treated as expired at `now`,
    /// given the configured refresh safety margin.
    pub fn is_expired(&self, now: DateTime<Utc>, configured: Duration) -> bool {
        now >= self.refresh_at(configured)
    }
}
