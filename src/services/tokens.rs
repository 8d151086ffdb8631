// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token lifecycle management.
//!
//! The only component that sees plaintext Oura tokens. Callers ask for a
//! usable bearer token and get either one or a precise error: reconnect
//! required, temporarily unavailable, or a decryption failure.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::FirestoreDb;
use crate::error::{AppError, NotAuthorizedReason};
use crate::models::{CredentialRecord, UserIdentity};
use crate::services::cipher::{encrypt_tokens, user_aad, TokenCipher};
use crate::services::oauth::{OuraOAuthClient, RefreshError, TokenGrant, OURA_SCOPES};
use crate::services::oura::OuraClient;

/// Cached access token and the moment it must stop being served.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    refresh_at: DateTime<Utc>,
}

/// Shared token cache.
pub type TokenCache = Arc<DashMap<Uuid, CachedToken>>;

/// Per-user refresh locks.
pub type RefreshLocks = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

/// High-level service that owns the token lifecycle.
///
/// This service encapsulates:
/// - Credential retrieval and decryption
/// - Refresh when inside the safety margin
/// - Re-encryption and storage of refreshed tokens
/// - In-memory caching of decrypted access tokens
/// - Per-user locking so concurrent callers trigger at most one refresh
#[derive(Clone)]
pub struct TokenService {
    oauth: OuraOAuthClient,
    oura: OuraClient,
    db: FirestoreDb,
    cipher: TokenCipher,
    token_cache: TokenCache,
    refresh_locks: RefreshLocks,
    margin: Duration,
}

impl TokenService {
    pub fn new(
        oauth: OuraOAuthClient,
        oura: OuraClient,
        db: FirestoreDb,
        cipher: TokenCipher,
        refresh_margin: std::time::Duration,
    ) -> Self {
        Self {
            oauth,
            oura,
            db,
            cipher,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
            margin: Duration::seconds(refresh_margin.as_secs() as i64),
        }
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expired) access token for the given user.
    ///
    /// 1. Check the in-memory cache (no I/O)
    /// 2. Acquire the per-user lock and re-check the cache
    /// 3. Load and decrypt the stored access token
    /// 4. If it is outside the safety margin, cache and return it
    /// 5. Otherwise refresh with Oura and store the new record
    pub async fn get_valid_token(&self, user_id: Uuid) -> Result<String, AppError> {
        if let Some(token) = self.cached(user_id) {
            return Ok(token);
        }

        // Other tasks for this user wait here until the refresh completes.
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        if let Some(token) = self.cached(user_id) {
            return Ok(token);
        }

        let record = self.load_record(user_id).await?;
        let access_token = self.decrypt_access(user_id, &record)?;

        if !record.is_expired(Utc::now(), self.margin) {
            self.cache(user_id, &access_token, &record);
            return Ok(access_token);
        }

        tracing::info!(%user_id, "Access token expired, refreshing");
        self.refresh_locked(user_id, record).await
    }

    /// Refresh after Oura rejected `rejected_token`, even if it looked unexpired.
    ///
    /// If another task already replaced the rejected token, the replacement is
    /// returned without a second refresh.
    pub async fn force_refresh(
        &self,
        user_id: Uuid,
        rejected_token: &str,
    ) -> Result<String, AppError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        self.token_cache
            .remove_if(&user_id, |_, cached| cached.access_token == rejected_token);

        let record = self.load_record(user_id).await?;
        let current = self.decrypt_access(user_id, &record)?;

        if current != rejected_token && !record.is_expired(Utc::now(), self.margin) {
            self.cache(user_id, &current, &record);
            return Ok(current);
        }

        tracing::info!(%user_id, "Oura rejected access token, forcing refresh");
        self.refresh_locked(user_id, record).await
    }

    /// Refresh using the stored refresh token. Caller must hold the user's lock.
    async fn refresh_locked(
        &self,
        user_id: Uuid,
        record: CredentialRecord,
    ) -> Result<String, AppError> {
        let Some(encrypted_refresh) = record.refresh_token_encrypted.as_deref() else {
            tracing::info!(%user_id, "No refresh token stored, reconnect required");
            self.token_cache.remove(&user_id);
            return Err(AppError::NotAuthorized(
                NotAuthorizedReason::ReconnectRequired,
            ));
        };

        let refresh_token = self.cipher.decrypt(encrypted_refresh, &user_aad(user_id))?;

        match self.oauth.refresh(&refresh_token).await {
            Ok(grant) => {
                let access_token = self
                    .store_grant(user_id, grant, Some(&refresh_token), &record.scopes)
                    .await?;
                tracing::info!(%user_id, "Token refreshed and cached");
                Ok(access_token)
            }
            Err(RefreshError::Revoked) => self.handle_revoked(user_id, &record).await,
            Err(RefreshError::Transient(msg)) => {
                tracing::warn!(%user_id, error = %msg, "Token refresh failed, leaving record for retry");
                Err(AppError::TemporarilyUnavailable(msg))
            }
        }
    }

    /// Oura rejected the refresh token. Either another instance rotated it
    /// first (use the winner's tokens) or the grant is gone (delete it).
    async fn handle_revoked(
        &self,
        user_id: Uuid,
        stale: &CredentialRecord,
    ) -> Result<String, AppError> {
        if let Some(current) = self.db.get_credentials(user_id).await? {
            if current.refresh_token_encrypted != stale.refresh_token_encrypted
                && !current.is_expired(Utc::now(), self.margin)
            {
                tracing::info!(
                    %user_id,
                    "Refresh token race detected - another instance won, using their tokens"
                );
                let access_token = self.decrypt_access(user_id, &current)?;
                self.cache(user_id, &access_token, &current);
                return Ok(access_token);
            }
        }

        tracing::warn!(%user_id, "Refresh token revoked, deleting stored credentials");
        self.db.delete_credentials(user_id).await?;
        self.token_cache.remove(&user_id);
        Err(AppError::NotAuthorized(
            NotAuthorizedReason::ReconnectRequired,
        ))
    }

    /// Encrypt and persist a grant, replacing the user's record. Returns the
    /// plaintext access token.
    async fn store_grant(
        &self,
        user_id: Uuid,
        grant: TokenGrant,
        previous_refresh: Option<&str>,
        previous_scopes: &[String],
    ) -> Result<String, AppError> {
        // Oura may or may not rotate the refresh token; keep the old one if not.
        let refresh_token = grant.refresh_token.as_deref().or(previous_refresh);

        let (access_encrypted, refresh_encrypted) =
            encrypt_tokens(&self.cipher, &grant.access_token, refresh_token, user_id)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Token encryption failed: {}", e)))?;

        let now = Utc::now();
        let expires_at = Duration::try_seconds(grant.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::ProviderApi(format!(
                    "Token lifetime out of range: {}s",
                    grant.expires_in
                ))
            })?;
        let scopes = if grant.scopes.is_empty() {
            previous_scopes.to_vec()
        } else {
            grant.scopes.clone()
        };

        let record = CredentialRecord {
            access_token_encrypted: access_encrypted,
            refresh_token_encrypted: refresh_encrypted,
            expires_at,
            scopes,
            updated_at: now,
            lifetime_secs: Some(grant.expires_in),
        };

        self.db.set_credentials(user_id, &record).await?;
        self.cache(user_id, &grant.access_token, &record);
        Ok(grant.access_token)
    }

    async fn load_record(&self, user_id: Uuid) -> Result<CredentialRecord, AppError> {
        self.db
            .get_credentials(user_id)
            .await?
            .ok_or(AppError::NotAuthorized(NotAuthorizedReason::NotConnected))
    }

    fn decrypt_access(&self, user_id: Uuid, record: &CredentialRecord) -> Result<String, AppError> {
        self.cipher
            .decrypt(&record.access_token_encrypted, &user_aad(user_id))
            .map_err(|e| {
                tracing::error!(%user_id, error = %e, "Stored access token could not be decrypted");
                AppError::Decryption(e)
            })
    }

    fn cached(&self, user_id: Uuid) -> Option<String> {
        let cached = self.token_cache.get(&user_id)?;
        if Utc::now() < cached.refresh_at {
            Some(cached.access_token.clone())
        } else {
            None
        }
    }

    fn cache(&self, user_id: Uuid, access_token: &str, record: &CredentialRecord) {
        self.token_cache.insert(
            user_id,
            CachedToken {
                access_token: access_token.to_string(),
                refresh_at: record.refresh_at(self.margin),
            },
        );
    }

    fn lock_for(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ─── Connect / Disconnect ────────────────────────────────────────────────

    /// Complete the OAuth callback: exchange the code, resolve the user and
    /// store their initial credentials.
    pub async fn connect(&self, code: &str) -> Result<UserIdentity, AppError> {
        let grant = self.oauth.exchange_code(code).await?;
        let info = self.oura.personal_info(&grant.access_token).await?;

        let now = Utc::now();
        let (user, is_new) = match self.db.find_user_by_provider_id(&info.id).await? {
            Some(mut existing) => {
                existing.last_active = now;
                if info.email.is_some() {
                    existing.email = info.email;
                }
                (existing, false)
            }
            None => (UserIdentity::new(info.id, info.email), true),
        };

        self.db.upsert_user(&user).await?;

        let lock = self.lock_for(user.user_id);
        let _guard = lock.lock().await;

        let requested: Vec<String> = OURA_SCOPES.iter().map(|s| s.to_string()).collect();
        self.store_grant(user.user_id, grant, None, &requested)
            .await?;

        tracing::info!(user_id = %user.user_id, is_new, "Oura account connected");
        Ok(user)
    }

    /// Forget a user's credentials and revoke them at Oura (best effort).
    pub async fn disconnect(&self, user_id: Uuid) -> Result<(), AppError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let record = self.db.get_credentials(user_id).await?;

        // Delete first so nothing else picks the tokens up mid-revocation.
        self.db.delete_credentials(user_id).await?;
        self.token_cache.remove(&user_id);

        let Some(record) = record else {
            return Ok(());
        };

        match self.cipher.decrypt(&record.access_token_encrypted, &user_aad(user_id)) {
            Ok(access_token) => {
                if let Err(e) = self.oauth.revoke(&access_token).await {
                    tracing::warn!(%user_id, error = %e, "Oura revocation failed (credentials already deleted)");
                }
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Failed to decrypt token (skipping revocation)");
            }
        }

        tracing::info!(%user_id, "Oura account disconnected");
        Ok(())
    }
}
