// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Friendship edges between users.
//!
//! One edge per unordered pair. A request starts `pending` and becomes
//! `accepted` when the target accepts it (or proposes back).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;

/// Status of a friendship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum FriendStatus {
    /// Request sent, awaiting the target
    Pending,
    /// Both users agreed; visible from either side
    Accepted,
}

/// Stored friendship edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendshipEdge {
    /// User who sent the request
    pub requester_id: Uuid,
    /// User who received the request
    pub target_id: Uuid,
    pub status: FriendStatus,
    pub created_at: DateTime<Utc>,
    /// Set once accepted
    pub accepted_at: Option<DateTime<Utc>>,
}

impl FriendshipEdge {
    /// New pending request. Callers must reject `requester == target`.
    pub fn new(requester_id: Uuid, target_id: Uuid) -> Self {
        Self {
            requester_id,
            target_id,
            status: FriendStatus::Pending,
            created_at: Utc::now(),
            accepted_at: None,
        }
    }

    pub fn accept(&mut self) {
        self.status = FriendStatus::Accepted;
        self.accepted_at = Some(Utc::now());
    }

    pub fn is_accepted(&self) -> bool {
        self.status == FriendStatus::Accepted
    }

    /// The other side of the edge, if `user_id` is on it.
    pub fn other(&self, user_id: Uuid) -> Option<Uuid> {
        if self.requester_id == user_id {
            Some(self.target_id)
        } else if self.target_id == user_id {
            Some(self.requester_id)
        } else {
            None
        }
    }

    /// Document key shared by both directions of a pair.
    pub fn key(&self) -> String {
        pair_key(self.requester_id, self.target_id)
    }
}

/// Canonical key for the unordered pair `{a, b}`.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}_{}", lo, hi)
}
