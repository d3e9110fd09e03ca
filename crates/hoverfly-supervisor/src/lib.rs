// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hoverfly Supervisor - Managed Proxy Process Lifecycle
//!
//! This crate starts, supervises and tears down a Hoverfly proxy/simulation
//! engine used as a test double. It resolves configuration, allocates ports,
//! stages the files the engine needs, launches the engine, waits for it to
//! report healthy and routes the host's outbound HTTP traffic through it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Caller                                      │
//! │               (test fixture, hoverfly-run binary)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ HoverflyConfig + HoverflyMode
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Hoverfly (supervisor)                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │  Validator  │  │    Ports    │  │  Resources  │  │   Runner    │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐                      │
//! │  │ AdminClient │  │     TLS     │  │   Network   │                      │
//! │  └─────────────┘  └─────────────┘  └─────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │ spawn + health poll              │ proxy env / default trust
//!           ▼                                  ▼
//! ┌───────────────────────────┐      ┌───────────────────────────────────┐
//! │   hoverfly binary         │      │   process-wide network settings   │
//! │   (staged in temp dir)    │      │   (HTTP_PROXY, NO_PROXY, roots)   │
//! └───────────────────────────┘      └───────────────────────────────────┘
//! ```
//!
//! # Supervisor State Machine
//!
//! ```text
//!      ┌──────┐  start   ┌──────────┐  healthy  ┌───────┐
//!      │ IDLE │─────────►│ STARTING │──────────►│ READY │
//!      └──────┘          └────┬─────┘           └───┬───┘
//!                             │ failure             │ close
//!                             ▼                     ▼
//!                       ┌─────────┐  cleanup  ┌──────────┐
//!                       │ STOPPED │◄──────────│ STOPPING │
//!                       └─────────┘           └──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use hoverfly_supervisor::{Hoverfly, HoverflyConfig, HoverflyMode};
//!
//! # fn main() -> hoverfly_supervisor::Result<()> {
//! let mut hoverfly = Hoverfly::new(HoverflyConfig::local().proxy_port(8890), HoverflyMode::Simulate);
//! hoverfly.start()?;
//! assert_eq!(hoverfly.proxy_port(), Some(8890));
//! hoverfly.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration builders and environment loading
//! - [`validator`]: Configuration resolution and validation
//! - [`mode`]: Operating modes and mode arguments
//! - [`platform`]: Host OS/architecture detection
//! - [`ports`]: Loopback port probing and free-port allocation
//! - [`resources`]: Resource lookup and the private staging directory
//! - [`runner`]: Engine process launch backends
//! - [`output`]: Engine log line decoding
//! - [`admin`]: Admin API client capability
//! - [`tls`]: Process-wide default TLS trust
//! - [`network`]: Process-wide proxy settings
//! - [`shutdown`]: Shutdown hook registry
//! - [`supervisor`]: The engine lifecycle orchestrator

#![deny(missing_docs)]

/// Admin API client capability (health, mode, journal, diff).
pub mod admin;

/// Configuration builders and environment loading.
pub mod config;

/// Error types for supervisor operations.
pub mod error;

/// Operating modes and mode arguments.
pub mod mode;

/// Process-wide proxy settings.
pub mod network;

/// Decoding and forwarding of engine output lines.
pub mod output;

/// Host OS/architecture detection for the bundled binary.
pub mod platform;

/// Loopback port probing and free-port allocation.
pub mod ports;

/// Resource lookup and private staging directory management.
pub mod resources;

/// Engine process launch backends (native, mock).
pub mod runner;

/// Shutdown hook registry.
pub mod shutdown;

/// Engine lifecycle orchestration.
pub mod supervisor;

/// Process-wide default TLS trust.
pub mod tls;

/// Configuration resolution and validation.
pub mod validator;

pub use config::HoverflyConfig;
pub use error::{Error, Result};
pub use mode::{HoverflyMode, ModeArguments};
pub use supervisor::{Hoverfly, HoverflyBuilder, SupervisorState};
pub use validator::HoverflyConfiguration;
