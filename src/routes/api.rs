// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.
//!
//! Handlers only translate between HTTP and the services in `AppState`.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{ComparisonResult, DateRange, FriendStatus, FriendshipEdge, MetricType};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/connection", delete(disconnect))
        .route("/api/friends", get(list_friends))
        .route("/api/friends/pending", get(list_pending))
        .route(
            "/api/friends/{user_id}",
            post(propose_friend).delete(remove_friend),
        )
        .route("/api/friends/{user_id}/accept", post(accept_friend))
        .route("/api/compare/{friend_id}", get(compare))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: Option<String>,
    /// Whether Oura credentials are currently stored
    pub connected: bool,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .db
        .get_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;
    let connected = state.db.get_credentials(user.user_id).await?.is_some();

    Ok(Json(UserResponse {
        user_id: profile.user_id,
        email: profile.email,
        connected,
    }))
}

/// Forget the user's Oura credentials.
async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode> {
    tracing::info!(user_id = %user.user_id, "User-initiated disconnect");
    state.tokens.disconnect(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Friends ─────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FriendsResponse {
    pub friends: Vec<Uuid>,
}

/// One friendship as seen by the current user.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FriendshipResponse {
    /// The other user
    pub user_id: Uuid,
    pub status: FriendStatus,
    /// Whether the current user sent the request
    pub outgoing: bool,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl FriendshipResponse {
    fn for_viewer(edge: FriendshipEdge, viewer: Uuid) -> Self {
        let outgoing = edge.requester_id == viewer;
        Self {
            user_id: if outgoing {
                edge.target_id
            } else {
                edge.requester_id
            },
            status: edge.status,
            outgoing,
            created_at: edge.created_at,
            accepted_at: edge.accepted_at,
        }
    }
}

async fn list_friends(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<FriendsResponse>> {
    let friends = state.friends.list(user.user_id).await?;
    Ok(Json(FriendsResponse {
        friends: friends.into_iter().collect(),
    }))
}

async fn list_pending(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<FriendshipResponse>>> {
    let pending = state.friends.pending_for(user.user_id).await?;
    Ok(Json(
        pending
            .into_iter()
            .map(|edge| FriendshipResponse::for_viewer(edge, user.user_id))
            .collect(),
    ))
}

async fn propose_friend(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target): Path<Uuid>,
) -> Result<Json<FriendshipResponse>> {
    let edge = state.friends.propose(user.user_id, target).await?;
    Ok(Json(FriendshipResponse::for_viewer(edge, user.user_id)))
}

/// Accept the request that `requester` sent to the current user.
async fn accept_friend(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(requester): Path<Uuid>,
) -> Result<Json<FriendshipResponse>> {
    let edge = state.friends.accept(requester, user.user_id).await?;
    Ok(Json(FriendshipResponse::for_viewer(edge, user.user_id)))
}

async fn remove_friend(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(other): Path<Uuid>,
) -> Result<StatusCode> {
    state.friends.remove(user.user_id, other).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Comparison ──────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct CompareQuery {
    #[validate(length(min = 1, max = 32))]
    metric: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

/// Compare the current user (first side) with a friend (second side).
async fn compare(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(friend_id): Path<Uuid>,
    Query(query): Query<CompareQuery>,
) -> Result<Json<ComparisonResult>> {
    query
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let metric: MetricType = query.metric.parse()?;
    let range = DateRange::new(query.start_date, query.end_date)?;

    let result = state
        .comparison
        .compare(user.user_id, friend_id, metric, range)
        .await?;
    Ok(Json(result))
}
