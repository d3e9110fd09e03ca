// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Admin API client capability.
//!
//! The supervisor only needs a handful of control-plane calls: health, mode,
//! destination and resetting per-test state. They are abstracted behind
//! [`AdminClient`] so supervisor behaviour can be tested against
//! [`MockAdminClient`] without a running engine.

pub mod http;
pub mod mock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::{HoverflyMode, ModeArguments, ModeView};

pub use http::{HttpAdminClient, HttpAdminClientBuilder};
pub use mock::{AdminCall, MockAdminClient};

/// Errors from admin API calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdminApiError {
    /// The engine answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The request never got an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Engine configuration as reported by the admin API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HoverflyInfo {
    /// Destination filter.
    pub destination: String,
    /// Current mode name.
    pub mode: String,
    /// Mode arguments.
    pub arguments: Option<ModeArguments>,
    /// Engine version.
    pub version: String,
    /// Upstream proxy address.
    pub upstream_proxy: String,
    /// Whether the engine runs as a web server.
    pub is_web_server: bool,
}

/// Control-plane calls the supervisor makes against a running engine.
pub trait AdminClient: Send + Sync {
    /// Whether the engine reports healthy. Errors count as unhealthy.
    fn health(&self) -> bool;

    /// Current mode and its arguments.
    fn get_mode(&self) -> Result<ModeView, AdminApiError>;

    /// Switch mode, optionally with arguments.
    fn set_mode(
        &self,
        mode: HoverflyMode,
        arguments: Option<&ModeArguments>,
    ) -> Result<(), AdminApiError>;

    /// Set the destination filter.
    fn set_destination(&self, destination: &str) -> Result<(), AdminApiError>;

    /// Delete the request journal.
    fn delete_journal(&self) -> Result<(), AdminApiError>;

    /// Delete recorded diffs.
    fn clean_diffs(&self) -> Result<(), AdminApiError>;

    /// Delete stateful-simulation state.
    fn delete_state(&self) -> Result<(), AdminApiError>;

    /// Engine configuration summary.
    fn get_info(&self) -> Result<HoverflyInfo, AdminApiError>;
}
