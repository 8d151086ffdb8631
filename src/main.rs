// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Oura-Compare API Server
//!
//! Connects Oura accounts and lets friends compare their daily scores.

use oura_compare::{config::Config, db::FirestoreDb, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Oura-Compare API");

    // Initialize storage
    let db = if config.use_in_memory_store {
        tracing::warn!("Using in-memory store, all state is lost on restart");
        FirestoreDb::new_in_memory()
    } else {
        FirestoreDb::new(&config.gcp_project_id, config.store_timeout).await?
    };

    // Build shared state (validates the token encryption key)
    let state = Arc::new(AppState::new(config.clone(), db)?);
    tracing::info!("Services initialized");

    // Build router
    let app = oura_compare::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("oura_compare=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
