// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource lookup and the private staging directory.
//!
//! Named resources (engine binaries, certificates, middleware scripts) are
//! looked up in an ordered list of resource roots:
//!
//! 1. roots added with [`HoverflyConfig::resource_root`](crate::HoverflyConfig::resource_root)
//! 2. `HOVERFLY_RESOURCE_DIR`
//! 3. `./resources`
//!
//! Found resources are copied into a per-instance directory under the OS temp
//! root, which the engine uses as its working directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::platform::Platform;

/// Environment variable naming an extra resource root.
pub const RESOURCE_DIR_ENV: &str = "HOVERFLY_RESOURCE_DIR";

/// Directory inside a resource root holding engine binaries.
pub const BINARIES_DIR: &str = "binaries";

/// Built-in CA certificate of the engine.
pub const DEFAULT_CA_CERT: &str = "ssl/ca.crt";

/// Prefix of staging directory names.
const TEMP_DIR_PREFIX: &str = "hoverfly.";

/// Resolves resource names against an ordered list of roots.
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    roots: Vec<PathBuf>,
}

impl ResourceLocator {
    /// Build a locator from configured roots followed by the default roots.
    pub fn new(configured: Vec<PathBuf>) -> Self {
        let mut roots = configured;
        if let Ok(dir) = std::env::var(RESOURCE_DIR_ENV) {
            if !dir.trim().is_empty() {
                roots.push(PathBuf::from(dir));
            }
        }
        roots.push(PathBuf::from("resources"));
        Self { roots }
    }

    /// Roots in lookup order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Find a resource. Absolute paths that exist resolve to themselves.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }

        self.roots
            .iter()
            .map(|root| root.join(candidate))
            .find(|path| path.is_file())
    }
}

/// Owns the private staging directory of one engine instance.
///
/// The directory is created on first use and removed by [`purge`](Self::purge)
/// or when the manager is dropped.
#[derive(Debug)]
pub struct TempFileManager {
    locator: ResourceLocator,
    binary_location: Option<PathBuf>,
    dir: Option<TempDir>,
}

impl TempFileManager {
    /// Create a manager; nothing touches the filesystem until a file is staged.
    pub fn new(locator: ResourceLocator) -> Self {
        Self {
            locator,
            binary_location: None,
            dir: None,
        }
    }

    /// Directory checked for the engine binary before the resource roots.
    pub fn with_binary_location(mut self, dir: Option<PathBuf>) -> Self {
        self.binary_location = dir;
        self
    }

    /// The resource locator used for staging.
    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// Path of the staging directory, creating it if needed.
    pub fn temp_directory(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.path().to_path_buf());
        }

        let dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir()?;
        debug!(path = %dir.path().display(), "Created staging directory");
        let path = dir.path().to_path_buf();
        self.dir = Some(dir);
        Ok(path)
    }

    /// Path of the staging directory if it has been created.
    pub fn existing_directory(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Copy the engine binary for `platform` into the staging directory.
    pub fn copy_hoverfly_binary(&mut self, platform: &Platform) -> Result<PathBuf> {
        let binary_name = platform.binary_name();

        let from_location = self
            .binary_location
            .as_ref()
            .map(|dir| dir.join(&binary_name))
            .filter(|path| path.is_file());

        let source = match from_location {
            Some(path) => path,
            None => {
                let resource = format!("{}/{}", BINARIES_DIR, binary_name);
                self.locator
                    .locate(&resource)
                    .ok_or(Error::ResourceNotFound(resource))?
            }
        };

        info!(binary = %source.display(), "Selecting Hoverfly binary");
        let target = self.stage(&source, &binary_name)?;
        make_executable(&target)?;
        Ok(target)
    }

    /// Copy a named resource into the staging directory under `target_name`.
    pub fn copy_resource(&mut self, source_name: &str, target_name: &str) -> Result<PathBuf> {
        let source = self
            .locator
            .locate(source_name)
            .ok_or_else(|| Error::ResourceNotFound(source_name.to_string()))?;
        self.stage(&source, target_name)
    }

    fn stage(&mut self, source: &Path, target_name: &str) -> Result<PathBuf> {
        let target = self.temp_directory()?.join(target_name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &target)?;
        debug!(
            source = %source.display(),
            target = %target.display(),
            "Staged resource"
        );
        Ok(target)
    }

    /// Delete the staging directory and everything in it. Safe to call repeatedly.
    pub fn purge(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(path = %path.display(), "Purged staging directory"),
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Failed to delete staging directory"
            ),
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
