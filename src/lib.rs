// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Oura-Compare: compare daily Oura scores with friends
//!
//! This crate provides the backend API for connecting Oura accounts over
//! OAuth2, keeping their tokens encrypted and fresh, and comparing sleep,
//! readiness and activity scores between friends.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use error::AppError;
use services::{
    ComparisonEngine, FriendshipRegistry, OuraClient, OuraOAuthClient, TokenCipher, TokenService,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub oauth: OuraOAuthClient,
    pub tokens: TokenService,
    pub friends: FriendshipRegistry,
    pub comparison: ComparisonEngine,
}

impl AppState {
    /// Wire up all services on top of `db`.
    ///
    /// Fails if the token encryption key is unusable, so a misconfigured
    /// instance never starts serving.
    pub fn new(config: Config, db: FirestoreDb) -> Result<Self, AppError> {
        let cipher = TokenCipher::new(&config.token_encryption_key)?;
        let oauth = OuraOAuthClient::new(&config)?;
        let oura = OuraClient::new(&config)?;

        let tokens = TokenService::new(
            oauth.clone(),
            oura.clone(),
            db.clone(),
            cipher,
            config.token_refresh_margin,
        );
        let friends = FriendshipRegistry::new(db.clone());
        let comparison = ComparisonEngine::new(
            tokens.clone(),
            oura,
            friends.clone(),
            config.max_rate_limit_wait,
        );

        Ok(Self {
            config,
            db,
            oauth,
            tokens,
            friends,
            comparison,
        })
    }
}
