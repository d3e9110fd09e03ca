// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration resolution and validation.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{
    AUTH_TOKEN_ENV, ConfigError, DEFAULT_ADMIN_PORT, DEFAULT_HOST, DEFAULT_HTTPS_ADMIN_PORT,
    DEFAULT_PROXY_PORT, HTTP, HTTPS, HoverflyConfig, LocalMiddleware, ProcessOutput, Target,
};
use crate::ports;
use crate::resources::ResourceLocator;

/// A validated engine configuration.
///
/// Produced by [`validate`] (or [`HoverflyConfig::build`]) and read-only from
/// then on. Ports are always concrete here.
#[derive(Debug, Clone)]
pub struct HoverflyConfiguration {
    target: Target,
    scheme: String,
    host: String,
    proxy_port: u16,
    admin_port: u16,
    proxy_localhost: bool,
    destination: Option<String>,
    capture_headers: Vec<String>,
    stateful_capture: bool,
    webserver: bool,
    ssl_certificate_path: Option<String>,
    ssl_key_path: Option<String>,
    tls_verification_disabled: bool,
    plain_http_tunneling: bool,
    local_middleware: Option<LocalMiddleware>,
    upstream_proxy: Option<String>,
    output: ProcessOutput,
    binary_location: Option<PathBuf>,
    commands: Vec<String>,
    resource_roots: Vec<PathBuf>,
    proxy_ca_cert: Option<PathBuf>,
    auth_token: Option<String>,
}

/// Validate a raw configuration and resolve defaults.
///
/// For a local target, unset ports are replaced by distinct OS-assigned free
/// ports. For a remote target the scheme is stripped from the host and the
/// well-known ports are used unless overridden.
pub fn validate(config: Option<HoverflyConfig>) -> Result<HoverflyConfiguration, ConfigError> {
    let config = config.ok_or(ConfigError::Missing)?;

    if config.ssl_certificate_path.is_some() != config.ssl_key_path.is_some() {
        return Err(ConfigError::SslPairing);
    }

    let locator = ResourceLocator::new(config.resource_roots.clone());

    let (scheme, host, proxy_port, admin_port, proxy_ca_cert, auth_token) = match config.target {
        Target::Local => {
            for port in [config.proxy_port, config.admin_port] {
                if port != 0 {
                    ports::claim_port(port);
                }
            }
            let proxy_port = allocate_if_unset(config.proxy_port)?;
            let admin_port = allocate_if_unset(config.admin_port)?;
            (
                HTTP.to_string(),
                DEFAULT_HOST.to_string(),
                proxy_port,
                admin_port,
                None,
                None,
            )
        }
        Target::Remote => {
            let scheme = if config.https_admin { HTTPS } else { HTTP };
            let admin_port = match config.admin_port {
                0 if config.https_admin => DEFAULT_HTTPS_ADMIN_PORT,
                0 => DEFAULT_ADMIN_PORT,
                port => port,
            };
            let proxy_port = match config.proxy_port {
                0 => DEFAULT_PROXY_PORT,
                port => port,
            };
            let proxy_ca_cert = config
                .proxy_ca_cert
                .as_deref()
                .map(|name| {
                    locator
                        .locate(name)
                        .ok_or_else(|| ConfigError::ResourceNotFound(name.to_string()))
                })
                .transpose()?;
            let auth_token = if config.auth_from_env {
                std::env::var(AUTH_TOKEN_ENV).ok()
            } else {
                config.auth_token.clone()
            };
            (
                scheme.to_string(),
                strip_scheme(&config.host).to_string(),
                proxy_port,
                admin_port,
                proxy_ca_cert,
                auth_token,
            )
        }
    };

    debug!(
        target_kind = ?config.target,
        host = %host,
        proxy_port = proxy_port,
        admin_port = admin_port,
        "Resolved Hoverfly configuration"
    );

    Ok(HoverflyConfiguration {
        target: config.target,
        scheme,
        host,
        proxy_port,
        admin_port,
        proxy_localhost: config.proxy_localhost,
        destination: config.destination,
        capture_headers: config.capture_headers,
        stateful_capture: config.stateful_capture,
        webserver: config.webserver,
        ssl_certificate_path: config.ssl_certificate_path,
        ssl_key_path: config.ssl_key_path,
        tls_verification_disabled: config.tls_verification_disabled,
        plain_http_tunneling: config.plain_http_tunneling,
        local_middleware: config.local_middleware,
        upstream_proxy: config.upstream_proxy,
        output: config.output,
        binary_location: config.binary_location,
        commands: config.commands,
        resource_roots: config.resource_roots,
        proxy_ca_cert,
        auth_token,
    })
}

fn allocate_if_unset(port: u16) -> Result<u16, ConfigError> {
    if port != 0 {
        return Ok(port);
    }
    ports::find_free_port().map_err(ConfigError::PortAllocation)
}

fn strip_scheme(host: &str) -> &str {
    let host = host.trim();
    host.strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host)
}

impl HoverflyConfiguration {
    /// Target kind.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Whether the engine runs elsewhere.
    pub fn is_remote_instance(&self) -> bool {
        self.target == Target::Remote
    }

    /// Admin API scheme (`http` or `https`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Engine host without scheme.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Proxy port.
    pub fn proxy_port(&self) -> u16 {
        self.proxy_port
    }

    /// Admin API port.
    pub fn admin_port(&self) -> u16 {
        self.admin_port
    }

    /// Base URL of the admin API.
    pub fn admin_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.admin_port)
    }

    /// Whether loopback traffic is proxied as well.
    pub fn proxy_localhost(&self) -> bool {
        self.proxy_localhost
    }

    /// Destination filter.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Headers kept during capture.
    pub fn capture_headers(&self) -> &[String] {
        &self.capture_headers
    }

    /// Whether capture records request sequences.
    pub fn is_stateful_capture(&self) -> bool {
        self.stateful_capture
    }

    /// Whether the engine runs as a web server.
    pub fn is_webserver(&self) -> bool {
        self.webserver
    }

    /// Custom CA certificate resource.
    pub fn ssl_certificate_path(&self) -> Option<&str> {
        self.ssl_certificate_path.as_deref()
    }

    /// Custom CA key resource.
    pub fn ssl_key_path(&self) -> Option<&str> {
        self.ssl_key_path.as_deref()
    }

    /// Whether a custom certificate/key pair replaces the built-in CA.
    pub fn has_custom_certificate(&self) -> bool {
        self.ssl_certificate_path.is_some()
    }

    /// Whether upstream TLS verification is disabled.
    pub fn is_tls_verification_disabled(&self) -> bool {
        self.tls_verification_disabled
    }

    /// Whether plain HTTP tunneling is allowed.
    pub fn is_plain_http_tunneling(&self) -> bool {
        self.plain_http_tunneling
    }

    /// Middleware run by a local engine.
    pub fn local_middleware(&self) -> Option<&LocalMiddleware> {
        self.local_middleware.as_ref()
    }

    /// Upstream proxy address.
    pub fn upstream_proxy(&self) -> Option<&str> {
        self.upstream_proxy.as_deref()
    }

    /// Where engine output goes.
    pub fn output(&self) -> &ProcessOutput {
        &self.output
    }

    /// Directory holding engine binaries.
    pub fn binary_location(&self) -> Option<&Path> {
        self.binary_location.as_deref()
    }

    /// Extra engine command-line arguments.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Configured resource roots.
    pub fn resource_roots(&self) -> &[PathBuf] {
        &self.resource_roots
    }

    /// Resolved CA certificate of a remote engine.
    pub fn proxy_ca_cert(&self) -> Option<&Path> {
        self.proxy_ca_cert.as_deref()
    }

    /// Admin API bearer token.
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_config_is_rejected() {
        let err = validate(None).unwrap_err();
        assert!(matches!(err, ConfigError::Missing));
        assert_eq!(err.to_string(), "HoverflyConfig cannot be null.");
    }

    #[test]
    fn test_local_ports_are_allocated_and_distinct() {
        let config = HoverflyConfig::local().build().unwrap();

        assert_ne!(config.proxy_port(), 0);
        assert_ne!(config.admin_port(), 0);
        assert_ne!(config.proxy_port(), config.admin_port());
        assert_eq!(config.scheme(), "http");
        assert_eq!(config.host(), "localhost");
        assert!(!config.is_remote_instance());
    }

    #[test]
    fn test_local_explicit_ports_are_kept() {
        let config = HoverflyConfig::local()
            .proxy_port(8890)
            .admin_port(8891)
            .build()
            .unwrap();

        assert_eq!(config.proxy_port(), 8890);
        assert_eq!(config.admin_port(), 8891);
        assert_eq!(config.admin_url(), "http://localhost:8891");
    }

    #[test]
    fn test_explicit_port_is_never_auto_allocated() {
        let explicit = {
            let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
            listener.local_addr().unwrap().port()
        };

        let config = HoverflyConfig::local().proxy_port(explicit).build().unwrap();

        assert_eq!(config.proxy_port(), explicit);
        assert_ne!(config.admin_port(), explicit);
        // already reserved by validation
        assert!(!ports::claim_port(explicit));
    }

    #[test]
    fn test_certificate_without_key_is_rejected() {
        let err = HoverflyConfig::local()
            .ssl_certificate_path("ssl/ca.crt")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::SslPairing));
    }

    #[test]
    fn test_key_without_certificate_is_rejected() {
        let err = HoverflyConfig::local()
            .ssl_key_path("ssl/ca.key")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::SslPairing));
    }

    #[test]
    fn test_certificate_and_key_pair_is_accepted() {
        let config = HoverflyConfig::local()
            .ssl_certificate_path("ssl/ca.crt")
            .ssl_key_path("ssl/ca.key")
            .build()
            .unwrap();
        assert!(config.has_custom_certificate());
        assert_eq!(config.ssl_key_path(), Some("ssl/ca.key"));
    }

    #[test]
    fn test_remote_defaults() {
        let config = HoverflyConfig::remote().build().unwrap();

        assert!(config.is_remote_instance());
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.scheme(), "http");
        assert_eq!(config.admin_port(), 8888);
        assert_eq!(config.proxy_port(), 8500);
        assert!(config.auth_token().is_none());
    }

    #[test]
    fn test_remote_host_scheme_is_stripped() {
        let config = HoverflyConfig::remote()
            .host("http://cloud-hoverfly.com")
            .build()
            .unwrap();
        assert_eq!(config.host(), "cloud-hoverfly.com");

        let config = HoverflyConfig::remote()
            .host("https://cloud-hoverfly.com")
            .build()
            .unwrap();
        assert_eq!(config.host(), "cloud-hoverfly.com");
    }

    #[test]
    fn test_remote_https_admin_endpoint() {
        let config = HoverflyConfig::remote()
            .with_https_admin_endpoint()
            .build()
            .unwrap();
        assert_eq!(config.scheme(), "https");
        assert_eq!(config.admin_port(), 443);
        assert!(config.proxy_ca_cert().is_none());

        let config = HoverflyConfig::remote()
            .with_https_admin_endpoint()
            .admin_port(9443)
            .build()
            .unwrap();
        assert_eq!(config.admin_port(), 9443);
    }

    #[test]
    fn test_remote_missing_ca_cert_is_rejected() {
        let err = HoverflyConfig::remote()
            .proxy_ca_cert("ssl/does-not-exist.crt")
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Resource not found with name: ssl/does-not-exist.crt"
        );
    }

    #[test]
    fn test_remote_ca_cert_is_resolved_from_resource_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ssl")).unwrap();
        std::fs::write(dir.path().join("ssl/remote.crt"), "cert").unwrap();

        let config = HoverflyConfig::remote()
            .resource_root(dir.path())
            .proxy_ca_cert("ssl/remote.crt")
            .build()
            .unwrap();

        assert_eq!(config.proxy_ca_cert(), Some(dir.path().join("ssl/remote.crt").as_path()));
    }

    #[test]
    fn test_remote_explicit_auth_token() {
        let config = HoverflyConfig::remote()
            .with_auth_header_token("some-token")
            .build()
            .unwrap();
        assert_eq!(config.auth_token(), Some("some-token"));
    }

    #[test]
    fn test_capture_options_are_carried() {
        let config = HoverflyConfig::local()
            .capture_all_headers()
            .enable_stateful_capture()
            .destination("hoverfly.io")
            .build()
            .unwrap();

        assert_eq!(config.capture_headers(), ["*".to_string()]);
        assert!(config.is_stateful_capture());
        assert_eq!(config.destination(), Some("hoverfly.io"));
    }
}
