// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process storage backend.
//!
//! Mirrors the Firestore collections with concurrent maps. Used by tests and
//! by local development when `USE_IN_MEMORY_STORE` is set.

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{CredentialRecord, FriendshipEdge, UserIdentity};

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, UserIdentity>,
    /// provider_user_id -> user_id
    provider_index: DashMap<String, Uuid>,
    credentials: DashMap<Uuid, CredentialRecord>,
    /// Keyed by `friendship::pair_key`
    friendships: DashMap<String, FriendshipEdge>,
}

impl MemoryStore {
    pub fn get_user(&self, user_id: Uuid) -> Option<UserIdentity> {
        self.users.get(&user_id).map(|u| u.clone())
    }

    pub fn find_user_by_provider_id(&self, provider_user_id: &str) -> Option<UserIdentity> {
        let user_id = *self.provider_index.get(provider_user_id)?;
        self.get_user(user_id)
    }

    pub fn upsert_user(&self, user: &UserIdentity) -> Result<(), AppError> {
        // Hold the index entry while writing so two users cannot claim one Oura ID.
        let index = self
            .provider_index
            .entry(user.provider_user_id.clone())
            .or_insert(user.user_id);
        if *index != user.user_id {
            return Err(AppError::Database(format!(
                "Oura user already linked to {}",
                *index
            )));
        }
        self.users.insert(user.user_id, user.clone());
        Ok(())
    }

    pub fn get_credentials(&self, user_id: Uuid) -> Option<CredentialRecord> {
        self.credentials.get(&user_id).map(|c| c.clone())
    }

    pub fn set_credentials(&self, user_id: Uuid, record: &CredentialRecord) {
        self.credentials.insert(user_id, record.clone());
    }

    pub fn delete_credentials(&self, user_id: Uuid) {
        self.credentials.remove(&user_id);
    }

    pub fn get_friendship(&self, key: &str) -> Option<FriendshipEdge> {
        self.friendships.get(key).map(|e| e.clone())
    }

    pub fn set_friendship(&self, edge: &FriendshipEdge) {
        self.friendships.insert(edge.key(), edge.clone());
    }

    pub fn delete_friendship(&self, key: &str) {
        self.friendships.remove(key);
    }

    pub fn list_friendships(&self, user_id: Uuid) -> Vec<FriendshipEdge> {
        self.friendships
            .iter()
            .filter(|e| e.other(user_id).is_some())
            .map(|e| e.clone())
            .collect()
    }
}
