// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-wide proxy settings.
//!
//! Most HTTP clients (reqwest, curl, ureq with `try_proxy_from_env`) pick up
//! proxies from the conventional environment variables, so routing traffic through
//! the engine means setting `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` in both
//! upper and lower case. Previous values are kept and put back on revert.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

/// Proxy variables set on apply, upper and lower case.
pub const PROXY_VARS: &[&str] = &["HTTP_PROXY", "http_proxy", "HTTPS_PROXY", "https_proxy"];

/// Exclusion variables set on apply, upper and lower case.
pub const NO_PROXY_VARS: &[&str] = &["NO_PROXY", "no_proxy"];

/// Loopback hosts that bypass the proxy unless localhost proxying is requested.
pub const DEFAULT_NON_PROXY_HOSTS: &str = "localhost,127.0.0.1,::1";

/// Applies and reverts process-wide proxy settings.
pub trait NetworkConfigurator: Send + Sync {
    /// Route outbound HTTP(S) through `host:port`.
    ///
    /// With `proxy_localhost` the exclusion list is emptied so loopback
    /// traffic goes through the proxy too.
    fn apply(&self, host: &str, port: u16, proxy_localhost: bool);

    /// Put back the settings that were in place before `apply`.
    fn revert(&self);
}

/// Configurator that edits the process environment.
#[derive(Debug, Default)]
pub struct SystemProxyConfigurator {
    saved: Mutex<Option<Vec<(&'static str, Option<String>)>>>,
}

impl SystemProxyConfigurator {
    /// Create a configurator with nothing applied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether settings are currently applied.
    pub fn is_applied(&self) -> bool {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

fn set_var(key: &str, value: &str) {
    // SAFETY: proxy settings are changed only from start/close of a supervisor,
    // which callers run on one thread at a time.
    unsafe { std::env::set_var(key, value) };
}

fn remove_var(key: &str) {
    // SAFETY: see set_var.
    unsafe { std::env::remove_var(key) };
}

impl NetworkConfigurator for SystemProxyConfigurator {
    fn apply(&self, host: &str, port: u16, proxy_localhost: bool) {
        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        if saved.is_none() {
            *saved = Some(
                PROXY_VARS
                    .iter()
                    .chain(NO_PROXY_VARS)
                    .map(|var| (*var, std::env::var(var).ok()))
                    .collect(),
            );
        }

        let proxy = format!("http://{}:{}", host, port);
        for var in PROXY_VARS {
            set_var(var, &proxy);
        }

        let non_proxy_hosts = if proxy_localhost {
            ""
        } else {
            DEFAULT_NON_PROXY_HOSTS
        };
        for var in NO_PROXY_VARS {
            set_var(var, non_proxy_hosts);
        }

        info!(
            proxy = %proxy,
            non_proxy_hosts = non_proxy_hosts,
            "Routing outbound HTTP through Hoverfly"
        );
    }

    fn revert(&self) {
        let saved = self
            .saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(saved) = saved else {
            return;
        };

        for (var, value) in saved {
            match value {
                Some(value) => set_var(var, &value),
                None => remove_var(var),
            }
        }
        debug!("Restored proxy environment");
    }
}

/// Configurator that changes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNetworkConfigurator;

impl NetworkConfigurator for NoopNetworkConfigurator {
    fn apply(&self, host: &str, port: u16, proxy_localhost: bool) {
        debug!(
            host = host,
            port = port,
            proxy_localhost = proxy_localhost,
            "Skipping proxy configuration"
        );
    }

    fn revert(&self) {}
}
