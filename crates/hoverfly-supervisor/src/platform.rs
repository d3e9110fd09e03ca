// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform detection for selecting the bundled engine binary.

use crate::error::{Error, Result};

/// Operating systems with a bundled binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsName {
    /// Linux
    Linux,
    /// macOS
    Osx,
    /// Windows
    Windows,
}

impl OsName {
    /// Name used in binary file names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Osx => "OSX",
            Self::Windows => "windows",
        }
    }
}

/// CPU architectures with a bundled binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchType {
    /// x86_64
    Amd64,
    /// aarch64
    Arm64,
    /// 32-bit x86
    X86,
}

impl ArchType {
    /// Name used in binary file names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::X86 => "386",
        }
    }
}

/// Host platform descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system.
    pub os: OsName,
    /// CPU architecture.
    pub arch: ArchType,
}

impl Platform {
    /// Detect the platform this process runs on.
    pub fn current() -> Result<Self> {
        Self::detect(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map OS/architecture identifiers to a platform.
    ///
    /// Accepts both Rust (`macos`, `x86_64`) and Go (`darwin`, `amd64`) spellings.
    pub fn detect(os: &str, arch: &str) -> Result<Self> {
        let unsupported = || Error::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };

        let os_name = match os.to_ascii_lowercase().as_str() {
            "linux" => OsName::Linux,
            "macos" | "darwin" | "osx" => OsName::Osx,
            "windows" => OsName::Windows,
            _ => return Err(unsupported()),
        };

        let arch_type = match arch.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => ArchType::Amd64,
            "aarch64" | "arm64" => ArchType::Arm64,
            "x86" | "i386" | "i686" | "386" => ArchType::X86,
            _ => return Err(unsupported()),
        };

        Ok(Self {
            os: os_name,
            arch: arch_type,
        })
    }

    /// File name of the engine binary for this platform.
    pub fn binary_name(&self) -> String {
        let suffix = if self.os == OsName::Windows { ".exe" } else { "" };
        format!("hoverfly_{}_{}{}", self.os.name(), self.arch.name(), suffix)
    }
}
