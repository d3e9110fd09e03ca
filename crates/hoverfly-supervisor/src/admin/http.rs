// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blocking HTTP implementation of [`AdminClient`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{AdminApiError, AdminClient, HoverflyInfo};
use crate::config::{DEFAULT_ADMIN_PORT, DEFAULT_HOST, HTTP, HTTPS};
use crate::error::Result;
use crate::mode::{HoverflyMode, ModeArguments, ModeView};
use crate::tls;
use crate::validator::HoverflyConfiguration;

const HEALTH_PATH: &str = "/api/health";
const MODE_PATH: &str = "/api/v2/hoverfly/mode";
const DESTINATION_PATH: &str = "/api/v2/hoverfly/destination";
const JOURNAL_PATH: &str = "/api/v2/journal";
const DIFF_PATH: &str = "/api/v2/diff";
const STATE_PATH: &str = "/api/v2/state";
const INFO_PATH: &str = "/api/v2/hoverfly";

/// Timeout of a single health check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// Admin API client over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpAdminClient {
    agent: ureq::Agent,
    base_url: String,
    auth_token: Option<String>,
}

/// Builder for [`HttpAdminClient`].
#[derive(Debug, Clone)]
pub struct HttpAdminClientBuilder {
    scheme: String,
    host: String,
    port: u16,
    auth_token: Option<String>,
    ca_cert: Option<PathBuf>,
    timeout: Duration,
}

impl Default for HttpAdminClientBuilder {
    fn default() -> Self {
        Self {
            scheme: HTTP.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_ADMIN_PORT,
            auth_token: None,
            ca_cert: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl HttpAdminClientBuilder {
    /// URL scheme (`http` or `https`).
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Admin API host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Admin API port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Bearer token sent with every request.
    pub fn auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Extra CA certificate trusted for HTTPS admin endpoints.
    pub fn ca_cert(mut self, path: Option<PathBuf>) -> Self {
        self.ca_cert = path;
        self
    }

    /// Timeout of non-health requests.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<HttpAdminClient> {
        let mut agent = ureq::AgentBuilder::new().timeout(self.timeout);
        if self.scheme == HTTPS {
            let tls_config = tls::build_client_config(self.ca_cert.as_deref())?;
            agent = agent.tls_config(Arc::new(tls_config));
        }

        Ok(HttpAdminClient {
            agent: agent.build(),
            base_url: format!("{}://{}:{}", self.scheme, self.host, self.port),
            auth_token: self.auth_token,
        })
    }
}

impl HttpAdminClient {
    /// Start building a client.
    pub fn builder() -> HttpAdminClientBuilder {
        HttpAdminClientBuilder::default()
    }

    /// Client for the engine described by a resolved configuration.
    pub fn from_configuration(config: &HoverflyConfiguration) -> Result<Self> {
        Self::builder()
            .scheme(config.scheme())
            .host(config.host())
            .port(config.admin_port())
            .auth_token(config.auth_token().map(str::to_string))
            .ca_cert(config.proxy_ca_cert().map(|p| p.to_path_buf()))
            .build()
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let request = self
            .agent
            .request(method, &format!("{}{}", self.base_url, path));
        match &self.auth_token {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }

    fn send(&self, method: &str, path: &str) -> std::result::Result<(), AdminApiError> {
        self.request(method, path).call().map_err(map_error)?;
        Ok(())
    }

    fn send_json(
        &self,
        method: &str,
        path: &str,
        body: serde_json::Value,
    ) -> std::result::Result<(), AdminApiError> {
        self.request(method, path)
            .send_json(body)
            .map_err(map_error)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, AdminApiError> {
        self.request("GET", path)
            .call()
            .map_err(map_error)?
            .into_json()
            .map_err(|e| AdminApiError::Decode(e.to_string()))
    }
}

fn map_error(error: ureq::Error) -> AdminApiError {
    match error {
        ureq::Error::Status(status, response) => AdminApiError::Status {
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => AdminApiError::Transport(transport.to_string()),
    }
}

impl AdminClient for HttpAdminClient {
    fn health(&self) -> bool {
        match self.request("GET", HEALTH_PATH).timeout(HEALTH_TIMEOUT).call() {
            Ok(response) => response.status() == 200,
            Err(e) => {
                debug!(url = %self.base_url, error = %e, "Hoverfly health check failed");
                false
            }
        }
    }

    fn get_mode(&self) -> std::result::Result<ModeView, AdminApiError> {
        self.get_json(MODE_PATH)
    }

    fn set_mode(
        &self,
        mode: HoverflyMode,
        arguments: Option<&ModeArguments>,
    ) -> std::result::Result<(), AdminApiError> {
        let view = ModeView {
            mode,
            arguments: arguments.cloned(),
        };
        let body =
            serde_json::to_value(&view).map_err(|e| AdminApiError::Decode(e.to_string()))?;
        self.send_json("PUT", MODE_PATH, body)
    }

    fn set_destination(&self, destination: &str) -> std::result::Result<(), AdminApiError> {
        self.send_json("PUT", DESTINATION_PATH, json!({ "destination": destination }))
    }

    fn delete_journal(&self) -> std::result::Result<(), AdminApiError> {
        self.send("DELETE", JOURNAL_PATH)
    }

    fn clean_diffs(&self) -> std::result::Result<(), AdminApiError> {
        self.send("DELETE", DIFF_PATH)
    }

    fn delete_state(&self) -> std::result::Result<(), AdminApiError> {
        self.send("DELETE", STATE_PATH)
    }

    fn get_info(&self) -> std::result::Result<HoverflyInfo, AdminApiError> {
        self.get_json(INFO_PATH)
    }
}
