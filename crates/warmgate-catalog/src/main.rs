// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Warmgate Catalog - GraphQL server
//!
//! Serves the reference catalog from a pool of warm executors. Publishing
//! a new generation to the marker file resets every executor before it
//! answers its next request.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use warmgate_catalog::CatalogApp;
use warmgate_core::{Config, FileVersionOracle, ServerRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("warmgate_core=info".parse()?)
                .add_directive("warmgate_catalog=info".parse()?),
        )
        .init();

    info!("Starting Warmgate Catalog");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        bind_addr = %config.bind_addr,
        workers = config.worker_num,
        max_request = config.max_request,
        reset_strategy = %config.reset_strategy,
        generation_file = %config.generation_file.display(),
        "Configuration loaded"
    );

    let oracle = Arc::new(FileVersionOracle::new(config.generation_file.clone()));

    let runtime = ServerRuntime::builder()
        .config(&config)
        .application(Arc::new(CatalogApp::new()))
        .oracle(oracle)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "Warmgate Catalog initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Warmgate Catalog stopped");
    Ok(())
}
