// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Friendship registry.
//!
//! Request/accept workflow over one edge per pair:
//!
//! ```text
//! (none) --propose(a, b)--> pending(a -> b) --accept(a, b) by b--> accepted
//!                               |
//!                               +--propose(b, a)--> accepted (mutual request)
//! ```
//!
//! `remove` deletes the edge from any state.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::FriendshipEdge;

#[derive(Clone)]
pub struct FriendshipRegistry {
    db: FirestoreDb,
}

impl FriendshipRegistry {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Send a friend request from `requester` to `target`.
    ///
    /// Returns the existing edge if one is already there, or accepts the
    /// target's own pending request to `requester`.
    pub async fn propose(
        &self,
        requester: Uuid,
        target: Uuid,
    ) -> Result<FriendshipEdge, AppError> {
        reject_self(requester, target)?;

        if self.db.get_user(target).await?.is_none() {
            return Err(AppError::NotFound(format!("User {}", target)));
        }

        match self.db.get_friendship(requester, target).await? {
            Some(mut edge) if !edge.is_accepted() && edge.requester_id == target => {
                edge.accept();
                self.db.set_friendship(&edge).await?;
                tracing::info!(%requester, %target, "Mutual friend request, accepted");
                Ok(edge)
            }
            Some(edge) => Ok(edge),
            None => {
                let edge = FriendshipEdge::new(requester, target);
                self.db.set_friendship(&edge).await?;
                tracing::info!(%requester, %target, "Friend request created");
                Ok(edge)
            }
        }
    }

    /// Accept the pending request `requester -> target`. Called on behalf of `target`.
    pub async fn accept(&self, requester: Uuid, target: Uuid) -> Result<FriendshipEdge, AppError> {
        reject_self(requester, target)?;

        let mut edge = self
            .db
            .get_friendship(requester, target)
            .await?
            .filter(|e| e.requester_id == requester)
            .ok_or_else(|| {
                AppError::NotFound(format!("Friend request from {} to {}", requester, target))
            })?;

        if edge.is_accepted() {
            return Ok(edge);
        }

        edge.accept();
        self.db.set_friendship(&edge).await?;
        tracing::info!(%requester, %target, "Friend request accepted");
        Ok(edge)
    }

    /// Accepted friends of `user`, from either side of the edge.
    pub async fn list(&self, user: Uuid) -> Result<BTreeSet<Uuid>, AppError> {
        Ok(self
            .db
            .list_friendships(user)
            .await?
            .into_iter()
            .filter(FriendshipEdge::is_accepted)
            .filter_map(|edge| edge.other(user))
            .collect())
    }

    /// Requests waiting for `user` to accept.
    pub async fn pending_for(&self, user: Uuid) -> Result<Vec<FriendshipEdge>, AppError> {
        let mut pending: Vec<FriendshipEdge> = self
            .db
            .list_friendships(user)
            .await?
            .into_iter()
            .filter(|edge| !edge.is_accepted() && edge.target_id == user)
            .collect();
        pending.sort_by_key(|edge| edge.created_at);
        Ok(pending)
    }

    /// Whether `a` and `b` are accepted friends.
    pub async fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool, AppError> {
        if a == b {
            return Ok(false);
        }
        Ok(self
            .db
            .get_friendship(a, b)
            .await?
            .is_some_and(|edge| edge.is_accepted()))
    }

    /// Remove any edge between `a` and `b`. Removing nothing is not an error.
    pub async fn remove(&self, a: Uuid, b: Uuid) -> Result<(), AppError> {
        reject_self(a, b)?;
        self.db.delete_friendship(a, b).await?;
        tracing::info!(user_a = %a, user_b = %b, "Friendship removed");
        Ok(())
    }
}

fn reject_self(a: Uuid, b: Uuid) -> Result<(), AppError> {
    if a == b {
        return Err(AppError::InvalidRelation(
            "A user cannot befriend themselves".to_string(),
        ));
    }
    Ok(())
}
