// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-wide default TLS trust.
//!
//! Rust has no runtime-global trust store that every HTTP client consults, so
//! the "default" here is a process-wide slot holding a `rustls::ClientConfig`
//! that trusts the webpki roots plus the engine's CA. Clients in the process
//! obtain it through [`default_client_config`]. Installing replaces the slot,
//! restoring puts the previous value back.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rustls::ClientConfig;
use rustls::pki_types::CertificateDer;
use tracing::{debug, info};

use crate::error::{Error, Result};

static DEFAULT_TRUST: RwLock<Option<Arc<ClientConfig>>> = RwLock::new(None);

/// Load every PEM certificate in `path`.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Client config trusting the webpki roots and, optionally, the CA in `extra_ca`.
pub fn build_client_config(extra_ca: Option<&Path>) -> Result<ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = extra_ca {
        for cert in load_certificates(path)? {
            roots
                .add(cert)
                .map_err(|e| Error::Tls(format!("invalid CA certificate: {}", e)))?;
        }
    }

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(config)
}

/// The installed default trust, if any.
pub fn installed_trust() -> Option<Arc<ClientConfig>> {
    DEFAULT_TRUST
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// The process default client config: the installed trust, or webpki roots only.
pub fn default_client_config() -> Result<Arc<ClientConfig>> {
    match installed_trust() {
        Some(config) => Ok(config),
        None => Ok(Arc::new(build_client_config(None)?)),
    }
}

fn swap_default(config: Option<Arc<ClientConfig>>) -> Option<Arc<ClientConfig>> {
    let mut slot = DEFAULT_TRUST
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, config)
}

/// Installs and restores the process default trust.
pub trait TrustInstaller: Send + Sync {
    /// Make the process default trust include the CA in `ca_cert`.
    fn install_default_trust(&self, ca_cert: &Path) -> Result<()>;

    /// Put back whatever was the default before the first install.
    fn restore(&self);
}

/// Installer backed by the process-wide trust slot.
#[derive(Debug, Default)]
pub struct DefaultTrustInstaller {
    // Outer Option: whether anything was installed; inner: the value to put back.
    previous: Mutex<Option<Option<Arc<ClientConfig>>>>,
}

impl DefaultTrustInstaller {
    /// Create an installer that has not installed anything yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustInstaller for DefaultTrustInstaller {
    fn install_default_trust(&self, ca_cert: &Path) -> Result<()> {
        let config = Arc::new(build_client_config(Some(ca_cert))?);
        let replaced = swap_default(Some(config));

        let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
        if previous.is_none() {
            *previous = Some(replaced);
        }

        info!(ca_cert = %ca_cert.display(), "Installed default TLS trust");
        Ok(())
    }

    fn restore(&self) {
        let previous = self
            .previous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            swap_default(previous);
            debug!("Restored default TLS trust");
        }
    }
}

/// Installer that changes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrustInstaller;

impl TrustInstaller for NoopTrustInstaller {
    fn install_default_trust(&self, ca_cert: &Path) -> Result<()> {
        debug!(ca_cert = %ca_cert.display(), "Skipping default TLS trust installation");
        Ok(())
    }

    fn restore(&self) {}
}
