// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod cipher;
pub mod comparison;
pub mod friends;
pub mod oauth;
pub mod oura;
pub mod tokens;

pub use cipher::{CipherError, TokenCipher};
pub use comparison::ComparisonEngine;
pub use friends::FriendshipRegistry;
pub use oauth::{OuraOAuthClient, RefreshError, TokenGrant};
pub use oura::{OuraClient, PersonalInfo};
pub use tokens::TokenService;
