// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test utilities for supervisor integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hoverfly_supervisor::network::NetworkConfigurator;
use hoverfly_supervisor::platform::Platform;
use hoverfly_supervisor::tls::TrustInstaller;
use tempfile::TempDir;

/// Skip test if a prerequisite is missing.
#[macro_export]
macro_rules! skip_if {
    ($cond:expr, $reason:expr) => {
        if $cond {
            eprintln!("Skipping test: {}", $reason);
            return;
        }
    };
}

/// Resource root laid out like the bundled resources:
///
/// ```text
/// binaries/hoverfly_<os>_<arch>   fake engine (sleeps)
/// ssl/ca.crt, ssl/ca.key          throwaway CA
/// middleware/middleware.py        middleware script
/// ```
pub struct ResourceFixture {
    pub root: TempDir,
}

impl ResourceFixture {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create resource root");

        let binaries = root.path().join("binaries");
        fs::create_dir_all(&binaries).unwrap();
        let platform = Platform::current().expect("unsupported test platform");
        let binary = binaries.join(platform.binary_name());
        fs::write(&binary, "#!/bin/sh\nexec sleep 30\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let ssl = root.path().join("ssl");
        fs::create_dir_all(&ssl).unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        fs::write(ssl.join("ca.crt"), certified.cert.pem()).unwrap();
        fs::write(ssl.join("ca.key"), certified.key_pair.serialize_pem()).unwrap();

        let middleware = root.path().join("middleware");
        fs::create_dir_all(&middleware).unwrap();
        fs::write(
            middleware.join("middleware.py"),
            "import sys\nprint(sys.stdin.read())\n",
        )
        .unwrap();

        Self { root }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn binary_path(&self) -> PathBuf {
        let platform = Platform::current().expect("unsupported test platform");
        self.path().join("binaries").join(platform.binary_name())
    }
}

/// Trust installer that counts calls.
#[derive(Debug, Default)]
pub struct RecordingTrustInstaller {
    pub installs: AtomicUsize,
    pub restores: AtomicUsize,
    pub last_ca: std::sync::Mutex<Option<PathBuf>>,
}

impl RecordingTrustInstaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

impl TrustInstaller for RecordingTrustInstaller {
    fn install_default_trust(&self, ca_cert: &Path) -> hoverfly_supervisor::Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        *self.last_ca.lock().unwrap() = Some(ca_cert.to_path_buf());
        Ok(())
    }

    fn restore(&self) {
        self.restores.fetch_add(1, Ordering::SeqCst);
    }
}

/// Network configurator that records apply/revert.
#[derive(Debug, Default)]
pub struct RecordingNetworkConfigurator {
    pub applied: std::sync::Mutex<Vec<(String, u16, bool)>>,
    pub reverts: AtomicUsize,
}

impl RecordingNetworkConfigurator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn applied(&self) -> Vec<(String, u16, bool)> {
        self.applied.lock().unwrap().clone()
    }

    pub fn reverts(&self) -> usize {
        self.reverts.load(Ordering::SeqCst)
    }
}

impl NetworkConfigurator for RecordingNetworkConfigurator {
    fn apply(&self, host: &str, port: u16, proxy_localhost: bool) {
        self.applied
            .lock()
            .unwrap()
            .push((host.to_string(), port, proxy_localhost));
    }

    fn revert(&self) {
        self.reverts.fetch_add(1, Ordering::SeqCst);
    }
}
