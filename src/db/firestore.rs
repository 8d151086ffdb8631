// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (identity and provider ID mapping)
//! - Credentials (encrypted OAuth tokens, one record per user)
//! - Friendships (one edge per user pair)
//!
//! Every Firestore call is bounded by the configured store timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::db::collections;
use crate::db::memory::MemoryStore;
use crate::error::AppError;
use crate::models::friendship::pair_key;
use crate::models::{CredentialRecord, FriendshipEdge, UserIdentity};

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<MemoryStore>),
}

/// Database client.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
    op_timeout: Duration,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, op_timeout: Duration) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        let client = if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            Self::create_emulator_client(project_id).await?
        } else {
            let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
                AppError::Database(format!("Failed to connect to Firestore: {}", e))
            })?;
            tracing::info!(project = project_id, "Connected to Firestore");
            client
        };

        Ok(Self {
            backend: Backend::Firestore(client),
            op_timeout,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<firestore::FirestoreDb, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(client)
    }

    /// Create an in-memory database (tests and local development).
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::default())),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Short name of the storage backend, for health reporting.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Firestore(_) => "firestore",
            Backend::Memory(_) => "memory",
        }
    }

    /// Run a Firestore call under the operation timeout.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, firestore::errors::FirestoreError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| AppError::Database(format!("{}: {}", op, e))),
            Err(_) => {
                tracing::warn!(op, "Firestore operation timed out");
                Err(AppError::TemporarilyUnavailable(format!(
                    "Firestore {} timed out",
                    op
                )))
            }
        }
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by internal ID.
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<UserIdentity>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_user(user_id)),
            Backend::Firestore(client) => {
                self.bounded(
                    "get_user",
                    client
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&user_id.to_string()),
                )
                .await
            }
        }
    }

    /// Find the user linked to an Oura user ID.
    pub async fn find_user_by_provider_id(
        &self,
        provider_user_id: &str,
    ) -> Result<Option<UserIdentity>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.find_user_by_provider_id(provider_user_id)),
            Backend::Firestore(client) => {
                let users: Vec<UserIdentity> = self
                    .bounded(
                        "find_user_by_provider_id",
                        client
                            .fluent()
                            .select()
                            .from(collections::USERS)
                            .filter(|q| {
                                q.for_all([q.field("provider_user_id").eq(provider_user_id)])
                            })
                            .limit(1)
                            .obj()
                            .query(),
                    )
                    .await?;
                Ok(users.into_iter().next())
            }
        }
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &UserIdentity) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => store.upsert_user(user),
            Backend::Firestore(client) => {
                let _: () = self
                    .bounded(
                        "upsert_user",
                        client
                            .fluent()
                            .update()
                            .in_col(collections::USERS)
                            .document_id(user.user_id.to_string())
                            .object(user)
                            .execute(),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    // ─── Credential Operations ───────────────────────────────────

    /// Get encrypted credentials for a user.
    pub async fn get_credentials(
        &self,
        user_id: Uuid,
    ) -> Result<Option<CredentialRecord>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_credentials(user_id)),
            Backend::Firestore(client) => {
                self.bounded(
                    "get_credentials",
                    client
                        .fluent()
                        .select()
                        .by_id_in(collections::CREDENTIALS)
                        .obj()
                        .one(&user_id.to_string()),
                )
                .await
            }
        }
    }

    /// Store encrypted credentials for a user, replacing any existing record.
    ///
    /// Rejects records that are already expired.
    pub async fn set_credentials(
        &self,
        user_id: Uuid,
        record: &CredentialRecord,
    ) -> Result<(), AppError> {
        if record.expires_at <= Utc::now() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Refusing to store already-expired credentials for {}",
                user_id
            )));
        }

        match &self.backend {
            Backend::Memory(store) => {
                store.set_credentials(user_id, record);
                Ok(())
            }
            Backend::Firestore(client) => {
                let _: () = self
                    .bounded(
                        "set_credentials",
                        client
                            .fluent()
                            .update()
                            .in_col(collections::CREDENTIALS)
                            .document_id(user_id.to_string())
                            .object(record)
                            .execute(),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Delete credentials (disconnect or revocation). Missing records are fine.
    pub async fn delete_credentials(&self, user_id: Uuid) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store.delete_credentials(user_id);
                Ok(())
            }
            Backend::Firestore(client) => {
                self.bounded(
                    "delete_credentials",
                    client
                        .fluent()
                        .delete()
                        .from(collections::CREDENTIALS)
                        .document_id(user_id.to_string())
                        .execute(),
                )
                .await
            }
        }
    }

    // ─── Friendship Operations ───────────────────────────────────

    /// Get the edge between two users, whichever direction it was created in.
    pub async fn get_friendship(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<FriendshipEdge>, AppError> {
        let key = pair_key(a, b);
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_friendship(&key)),
            Backend::Firestore(client) => {
                self.bounded(
                    "get_friendship",
                    client
                        .fluent()
                        .select()
                        .by_id_in(collections::FRIENDSHIPS)
                        .obj()
                        .one(&key),
                )
                .await
            }
        }
    }

    /// Create or update an edge.
    pub async fn set_friendship(&self, edge: &FriendshipEdge) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store.set_friendship(edge);
                Ok(())
            }
            Backend::Firestore(client) => {
                let _: () = self
                    .bounded(
                        "set_friendship",
                        client
                            .fluent()
                            .update()
                            .in_col(collections::FRIENDSHIPS)
                            .document_id(edge.key())
                            .object(edge)
                            .execute(),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Delete the edge between two users. Missing edges are fine.
    pub async fn delete_friendship(&self, a: Uuid, b: Uuid) -> Result<(), AppError> {
        let key = pair_key(a, b);
        match &self.backend {
            Backend::Memory(store) => {
                store.delete_friendship(&key);
                Ok(())
            }
            Backend::Firestore(client) => {
                self.bounded(
                    "delete_friendship",
                    client
                        .fluent()
                        .delete()
                        .from(collections::FRIENDSHIPS)
                        .document_id(&key)
                        .execute(),
                )
                .await
            }
        }
    }

    /// All edges (pending or accepted) that involve a user.
    pub async fn list_friendships(&self, user_id: Uuid) -> Result<Vec<FriendshipEdge>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.list_friendships(user_id)),
            Backend::Firestore(client) => {
                let id = user_id.to_string();
                self.bounded(
                    "list_friendships",
                    client
                        .fluent()
                        .select()
                        .from(collections::FRIENDSHIPS)
                        .filter(|q| {
                            q.for_any([
                                q.field("requester_id").eq(id.as_str()),
                                q.field("target_id").eq(id.as_str()),
                            ])
                        })
                        .obj()
                        .query(),
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firestore::errors::FirestoreError;

    fn db_with_timeout(op_timeout: Duration) -> FirestoreDb {
        FirestoreDb {
            op_timeout,
            ..FirestoreDb::new_in_memory()
        }
    }

    #[tokio::test]
    async fn test_bounded_times_out_as_temporarily_unavailable() {
        let db = db_with_timeout(Duration::from_millis(20));
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<u32, FirestoreError>(1)
        };

        let result = db.bounded("get_user", slow).await;
        assert!(matches!(result, Err(AppError::TemporarilyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_fast_results() {
        let db = db_with_timeout(Duration::from_secs(1));
        let result = db
            .bounded("get_user", async { Ok::<u32, FirestoreError>(7) })
            .await;
        assert_eq!(result.unwrap(), 7);
    }
}
