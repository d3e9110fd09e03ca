// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hoverfly-supervisor.

use std::time::Duration;

use thiserror::Error;

/// Supervisor errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is invalid or contradictory.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A port required by the engine is already bound.
    #[error("Port is already in use: {port}")]
    PortInUse {
        /// The port that could not be bound.
        port: u16,
    },

    /// A named resource could not be located in any resource root.
    #[error("Resource not found with name: {0}")]
    ResourceNotFound(String),

    /// The engine did not report healthy within the allowed time.
    #[error("Hoverfly has not become healthy in {} seconds", .timeout.as_secs())]
    StartupTimeout {
        /// How long the supervisor waited.
        timeout: Duration,
    },

    /// The operation needs a running engine.
    #[error("Hoverfly is not running")]
    NotRunning,

    /// An admin API call failed.
    #[error("Admin API error: {0}")]
    AdminApi(#[from] crate::admin::AdminApiError),

    /// The engine process could not be launched.
    #[error("Could not start Hoverfly process: {0}")]
    Launch(#[from] crate::runner::RunnerError),

    /// The host OS/architecture has no bundled binary.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system identifier.
        os: String,
        /// CPU architecture identifier.
        arch: String,
    },

    /// Loading or building a TLS trust configuration failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type using the supervisor Error.
pub type Result<T> = std::result::Result<T, Error>;
