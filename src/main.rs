// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pairtrack API Server
//!
//! Consent-based live location sharing: users pair via share codes,
//! accept or deny follow requests, and broadcast throttled location
//! samples to the users they have granted visibility.

use pairtrack::{
    cache::ShadowCache,
    config::Config,
    services::PushLocationSource,
    store::FirestoreStore,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Pairtrack API");

    // Initialize the Firestore-backed profile store
    let store = FirestoreStore::new(
        &config.gcp_project_id,
        config.read_timeout,
        config.watch_poll_interval,
    )
    .await
    .expect("Failed to connect to Firestore");
    tracing::info!(project = %config.gcp_project_id, "Profile store initialized");

    // Local shadow cache for followed-set durability across restarts
    let shadow = ShadowCache::new_dir(&config.cache_dir);
    tracing::info!(dir = %config.cache_dir, "Shadow cache initialized");

    // Location ingest: clients push raw samples, watches throttle them
    let source = Arc::new(PushLocationSource::new());

    // Build shared state
    let state = Arc::new(AppState::build(
        config.clone(),
        Arc::new(store),
        source,
        shadow,
    ));

    // Build router
    let app = pairtrack::routes::create_router(state);

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

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pairtrack=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
