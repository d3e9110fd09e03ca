// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! hoverfly-run - start a managed Hoverfly from the environment
//!
//! Reads `HOVERFLY_*` variables (and `.env`), starts the engine, routes this
//! process's proxy settings through it and keeps it running until Ctrl-C.

use tracing::{info, warn};

use hoverfly_supervisor::shutdown;
use hoverfly_supervisor::{Hoverfly, HoverflyConfig, HoverflyMode};

// Single-threaded: the supervisor edits the process environment.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hoverfly_supervisor=info,hoverfly=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = HoverflyConfig::from_env()?;
    let mode = HoverflyMode::from_env()?;

    info!(mode = %mode, target_kind = ?config.target(), "Starting Hoverfly");

    let mut hoverfly = Hoverfly::new(config, mode);
    hoverfly.start()?;

    info!(
        proxy_port = hoverfly.proxy_port(),
        admin_port = hoverfly.admin_port(),
        pid = hoverfly.pid(),
        "Hoverfly running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    hoverfly.close();
    shutdown::run_shutdown_hooks();

    info!("Shutdown complete");
    Ok(())
}
