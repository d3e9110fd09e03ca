// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine command-line construction.

use std::path::PathBuf;

use crate::mode::HoverflyMode;
use crate::validator::HoverflyConfiguration;

/// Staged-file paths referenced on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedFiles {
    /// Staged custom CA certificate.
    pub certificate: Option<PathBuf>,
    /// Staged custom CA key.
    pub key: Option<PathBuf>,
    /// Staged middleware script.
    pub middleware_script: Option<PathBuf>,
}

/// Arguments for a local engine in `mode`.
pub fn build_args(
    config: &HoverflyConfiguration,
    mode: HoverflyMode,
    staged: &StagedFiles,
) -> Vec<String> {
    let mut args: Vec<String> = config.commands().to_vec();

    args.push("-pp".to_string());
    args.push(config.proxy_port().to_string());
    args.push("-ap".to_string());
    args.push(config.admin_port().to_string());

    if let Some(flag) = mode.command_flag() {
        args.push(flag.to_string());
    }

    if let Some(destination) = config.destination() {
        args.push("-destination".to_string());
        args.push(destination.to_string());
    }

    if let (Some(cert), Some(key)) = (&staged.certificate, &staged.key) {
        args.push("-cert".to_string());
        args.push(cert.display().to_string());
        args.push("-key".to_string());
        args.push(key.display().to_string());
    }

    if config.is_tls_verification_disabled() {
        args.push("-tls-verification=false".to_string());
    }

    if config.is_plain_http_tunneling() {
        args.push("-plain-http-tunneling".to_string());
    }

    if let (Some(middleware), Some(script)) = (config.local_middleware(), &staged.middleware_script)
    {
        args.push("-middleware".to_string());
        args.push(format!("{} {}", middleware.binary, script.display()));
    }

    if let Some(upstream) = config.upstream_proxy() {
        args.push("-upstream-proxy".to_string());
        args.push(upstream.to_string());
    }

    if config.is_webserver() {
        args.push("-webserver".to_string());
    }

    args
}
