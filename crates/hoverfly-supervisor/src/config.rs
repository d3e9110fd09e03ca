// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration builders and environment loading.
//!
//! A [`HoverflyConfig`] is the raw, caller-built description of an engine
//! instance. It is turned into an immutable
//! [`HoverflyConfiguration`](crate::validator::HoverflyConfiguration) by
//! [`HoverflyConfig::build`], which resolves ports and defaults.

use std::path::PathBuf;

use crate::validator::{self, HoverflyConfiguration};

/// Default engine host.
pub const DEFAULT_HOST: &str = "localhost";
/// Plain HTTP scheme.
pub const HTTP: &str = "http";
/// HTTPS scheme.
pub const HTTPS: &str = "https";
/// Default proxy port of a remote engine.
pub const DEFAULT_PROXY_PORT: u16 = 8500;
/// Default admin port of a remote engine.
pub const DEFAULT_ADMIN_PORT: u16 = 8888;
/// Default admin port when the admin endpoint is HTTPS.
pub const DEFAULT_HTTPS_ADMIN_PORT: u16 = 443;
/// Environment variable holding the admin API bearer token.
pub const AUTH_TOKEN_ENV: &str = "HOVERFLY_AUTH_TOKEN";
/// Logger name engine output is tagged with by default.
pub const DEFAULT_LOGGER: &str = "hoverfly";

/// Where the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Spawned and owned by the supervisor.
    Local,
    /// Already running elsewhere; only its admin API is used.
    Remote,
}

/// Middleware executed by a local engine for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMiddleware {
    /// Interpreter or executable, e.g. `python`.
    pub binary: String,
    /// Script resource passed to the binary.
    pub path: String,
}

/// Destination of the engine's stdout/stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    /// Decode and forward through `tracing` tagged with this logger name.
    Logger(String),
    /// Inherit the supervisor's stdout/stderr.
    StdOut,
}

impl Default for ProcessOutput {
    fn default() -> Self {
        Self::Logger(DEFAULT_LOGGER.to_string())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// No configuration was supplied.
    #[error("HoverflyConfig cannot be null.")]
    Missing,

    /// Only one half of the certificate/key pair was supplied.
    #[error(
        "Both SSL key and certificate files are required to override the default Hoverfly SSL. \
         Set both sslCertificatePath and sslKeyPath."
    )]
    SslPairing,

    /// A referenced resource could not be located.
    #[error("Resource not found with name: {0}")]
    ResourceNotFound(String),

    /// The OS could not provide a free port.
    #[error("Cannot find available port: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    InvalidEnvVar(&'static str, String),

    /// Unknown operating mode name.
    #[error("unknown Hoverfly mode: {0}")]
    InvalidMode(String),
}

/// Builder for an engine instance configuration.
///
/// Start from [`HoverflyConfig::local`] or [`HoverflyConfig::remote`] and chain
/// options. Options that only make sense for the other target kind are ignored
/// during validation.
#[derive(Debug, Clone)]
pub struct HoverflyConfig {
    pub(crate) target: Target,
    pub(crate) host: String,
    pub(crate) proxy_port: u16,
    pub(crate) admin_port: u16,
    pub(crate) proxy_localhost: bool,
    pub(crate) destination: Option<String>,
    pub(crate) capture_headers: Vec<String>,
    pub(crate) stateful_capture: bool,
    pub(crate) webserver: bool,
    pub(crate) ssl_certificate_path: Option<String>,
    pub(crate) ssl_key_path: Option<String>,
    pub(crate) tls_verification_disabled: bool,
    pub(crate) plain_http_tunneling: bool,
    pub(crate) local_middleware: Option<LocalMiddleware>,
    pub(crate) upstream_proxy: Option<String>,
    pub(crate) output: ProcessOutput,
    pub(crate) binary_location: Option<PathBuf>,
    pub(crate) commands: Vec<String>,
    pub(crate) resource_roots: Vec<PathBuf>,
    pub(crate) https_admin: bool,
    pub(crate) proxy_ca_cert: Option<String>,
    pub(crate) auth_from_env: bool,
    pub(crate) auth_token: Option<String>,
}

impl HoverflyConfig {
    fn new(target: Target) -> Self {
        Self {
            target,
            host: DEFAULT_HOST.to_string(),
            proxy_port: 0,
            admin_port: 0,
            proxy_localhost: false,
            destination: None,
            capture_headers: Vec::new(),
            stateful_capture: false,
            webserver: false,
            ssl_certificate_path: None,
            ssl_key_path: None,
            tls_verification_disabled: false,
            plain_http_tunneling: false,
            local_middleware: None,
            upstream_proxy: None,
            output: ProcessOutput::default(),
            binary_location: None,
            commands: Vec::new(),
            resource_roots: Vec::new(),
            https_admin: false,
            proxy_ca_cert: None,
            auth_from_env: false,
            auth_token: None,
        }
    }

    /// Configuration for an engine spawned and owned by the supervisor.
    pub fn local() -> Self {
        Self::new(Target::Local)
    }

    /// Configuration for an engine that is already running elsewhere.
    pub fn remote() -> Self {
        Self::new(Target::Remote)
    }

    /// Target kind.
    pub fn target(&self) -> Target {
        self.target
    }

    // ---- common options ----

    /// Proxy port. Zero means "pick one" (local) or the default (remote).
    pub fn proxy_port(mut self, port: u16) -> Self {
        self.proxy_port = port;
        self
    }

    /// Admin API port. Zero means "pick one" (local) or the default (remote).
    pub fn admin_port(mut self, port: u16) -> Self {
        self.admin_port = port;
        self
    }

    /// Route loopback traffic through the proxy as well.
    pub fn proxy_localhost(mut self, enabled: bool) -> Self {
        self.proxy_localhost = enabled;
        self
    }

    /// Only proxy requests whose destination matches this filter.
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Request headers to keep when capturing.
    pub fn capture_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capture_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Keep every request header when capturing.
    pub fn capture_all_headers(mut self) -> Self {
        self.capture_headers = vec!["*".to_string()];
        self
    }

    /// Record request sequences during capture.
    pub fn enable_stateful_capture(mut self) -> Self {
        self.stateful_capture = true;
        self
    }

    /// Run the engine as a web server instead of an intercepting proxy.
    pub fn as_web_server(mut self) -> Self {
        self.webserver = true;
        self
    }

    /// Add a directory searched for named resources.
    pub fn resource_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_roots.push(dir.into());
        self
    }

    // ---- local options ----

    /// Certificate resource overriding the engine's built-in CA.
    pub fn ssl_certificate_path(mut self, path: impl Into<String>) -> Self {
        self.ssl_certificate_path = Some(path.into());
        self
    }

    /// Key resource overriding the engine's built-in CA key.
    pub fn ssl_key_path(mut self, path: impl Into<String>) -> Self {
        self.ssl_key_path = Some(path.into());
        self
    }

    /// Do not verify upstream TLS certificates.
    pub fn disable_tls_verification(mut self) -> Self {
        self.tls_verification_disabled = true;
        self
    }

    /// Allow plain HTTP through CONNECT tunnels.
    pub fn plain_http_tunneling(mut self) -> Self {
        self.plain_http_tunneling = true;
        self
    }

    /// Run `binary <script>` as middleware; the script is staged before launch.
    pub fn local_middleware(mut self, binary: impl Into<String>, script: impl Into<String>) -> Self {
        self.local_middleware = Some(LocalMiddleware {
            binary: binary.into(),
            path: script.into(),
        });
        self
    }

    /// Forward outbound traffic through another proxy.
    pub fn upstream_proxy(mut self, addr: impl Into<String>) -> Self {
        self.upstream_proxy = Some(addr.into());
        self
    }

    /// Logger name engine output is forwarded under.
    pub fn logger(mut self, name: impl Into<String>) -> Self {
        self.output = ProcessOutput::Logger(name.into());
        self
    }

    /// Pass engine output straight to stdout/stderr.
    pub fn log_to_stdout(mut self) -> Self {
        self.output = ProcessOutput::StdOut;
        self
    }

    /// Directory holding engine binaries, checked before the bundled ones.
    pub fn binary_location(mut self, dir: impl Into<PathBuf>) -> Self {
        self.binary_location = Some(dir.into());
        self
    }

    /// Extra command-line arguments for the engine.
    pub fn add_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    // ---- remote options ----

    /// Remote host. A leading `http://` or `https://` is stripped.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Talk to the admin API over HTTPS.
    pub fn with_https_admin_endpoint(mut self) -> Self {
        self.https_admin = true;
        self
    }

    /// CA certificate resource of the remote engine to trust.
    pub fn proxy_ca_cert(mut self, resource: impl Into<String>) -> Self {
        self.proxy_ca_cert = Some(resource.into());
        self
    }

    /// Authenticate with the token from `HOVERFLY_AUTH_TOKEN`.
    pub fn with_auth_header(mut self) -> Self {
        self.auth_from_env = true;
        self.auth_token = None;
        self
    }

    /// Authenticate with an explicit token.
    pub fn with_auth_header_token(mut self, token: impl Into<String>) -> Self {
        self.auth_from_env = false;
        self.auth_token = Some(token.into());
        self
    }

    /// Validate and resolve into an immutable configuration.
    pub fn build(self) -> Result<HoverflyConfiguration, ConfigError> {
        validator::validate(Some(self))
    }

    /// Load a configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `HOVERFLY_REMOTE_HOST`: remote host; selects a remote target when set
    /// - `HOVERFLY_PROXY_PORT`: proxy port (default: 0, auto)
    /// - `HOVERFLY_ADMIN_PORT`: admin port (default: 0, auto)
    /// - `HOVERFLY_DESTINATION`: destination filter
    /// - `HOVERFLY_BINARY_LOCATION`: directory holding engine binaries
    /// - `HOVERFLY_RESOURCE_DIR`: extra resource root (also consulted at lookup time)
    /// - `HOVERFLY_WEBSERVER`: web-server mode (default: false)
    /// - `HOVERFLY_PROXY_LOCALHOST`: proxy loopback traffic (default: false)
    /// - `HOVERFLY_AUTH_TOKEN`: admin API bearer token (remote only)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("HOVERFLY_REMOTE_HOST") {
            Ok(host) if !host.trim().is_empty() => {
                let mut remote = Self::remote().host(host.trim());
                if std::env::var(AUTH_TOKEN_ENV).is_ok() {
                    remote = remote.with_auth_header();
                }
                remote
            }
            _ => Self::local(),
        };

        config.proxy_port = parse_env_port("HOVERFLY_PROXY_PORT")?;
        config.admin_port = parse_env_port("HOVERFLY_ADMIN_PORT")?;

        if let Ok(destination) = std::env::var("HOVERFLY_DESTINATION") {
            config = config.destination(destination);
        }
        if let Ok(dir) = std::env::var("HOVERFLY_BINARY_LOCATION") {
            config = config.binary_location(dir);
        }

        config.webserver = parse_env_bool("HOVERFLY_WEBSERVER", false);
        config.proxy_localhost = parse_env_bool("HOVERFLY_PROXY_LOCALHOST", false);

        Ok(config)
    }
}

/// Parse an env var into a bool with a sensible default.
fn parse_env_bool(var: &str, default: bool) -> bool {
    std::env::var(var)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn parse_env_port(var: &'static str) -> Result<u16, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar(var, "must be a valid port number".into())),
        Err(_) => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "HOVERFLY_REMOTE_HOST",
        "HOVERFLY_PROXY_PORT",
        "HOVERFLY_ADMIN_PORT",
        "HOVERFLY_DESTINATION",
        "HOVERFLY_BINARY_LOCATION",
        "HOVERFLY_WEBSERVER",
        "HOVERFLY_PROXY_LOCALHOST",
        AUTH_TOKEN_ENV,
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for var in VARS {
                guard.remove(var);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = HoverflyConfig::local();

        assert_eq!(config.target(), Target::Local);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.proxy_port, 0);
        assert_eq!(config.admin_port, 0);
        assert!(config.capture_headers.is_empty());
        assert_eq!(config.output, ProcessOutput::Logger("hoverfly".to_string()));
    }

    #[test]
    fn test_builder_capture_all_headers() {
        let config = HoverflyConfig::local().capture_all_headers();
        assert_eq!(config.capture_headers, vec!["*".to_string()]);
    }

    #[test]
    fn test_builder_capture_headers() {
        let config = HoverflyConfig::local().capture_headers(["Accept", "Authorization"]);
        assert_eq!(config.capture_headers, vec!["Accept", "Authorization"]);
    }

    #[test]
    fn test_builder_add_commands_accumulates() {
        let config = HoverflyConfig::local()
            .add_commands(["-db", "memory"])
            .add_commands(["-disable-cache"]);
        assert_eq!(config.commands, vec!["-db", "memory", "-disable-cache"]);
    }

    #[test]
    fn test_builder_auth_header_variants() {
        let from_env = HoverflyConfig::remote()
            .with_auth_header_token("x")
            .with_auth_header();
        assert!(from_env.auth_from_env);
        assert!(from_env.auth_token.is_none());

        let explicit = HoverflyConfig::remote().with_auth_header_token("token");
        assert!(!explicit.auth_from_env);
        assert_eq!(explicit.auth_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_builder_output_selection() {
        let config = HoverflyConfig::local().logger("my-engine");
        assert_eq!(config.output, ProcessOutput::Logger("my-engine".to_string()));

        let config = config.log_to_stdout();
        assert_eq!(config.output, ProcessOutput::StdOut);
    }

    #[test]
    fn test_ssl_pairing_message_names_both_fields() {
        let message = ConfigError::SslPairing.to_string();
        assert!(message.contains("sslCertificatePath"));
        assert!(message.contains("sslKeyPath"));
    }

    #[test]
    fn test_from_env_defaults_to_local() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = HoverflyConfig::from_env().unwrap();

        assert_eq!(config.target(), Target::Local);
        assert_eq!(config.proxy_port, 0);
        assert!(!config.webserver);
        assert!(!config.proxy_localhost);
    }

    #[test]
    fn test_from_env_remote_with_token() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("HOVERFLY_REMOTE_HOST", "https://hoverfly.example.com");
        guard.set("HOVERFLY_ADMIN_PORT", "9888");
        guard.set(AUTH_TOKEN_ENV, "secret");
        guard.set("HOVERFLY_PROXY_LOCALHOST", "yes");

        let config = HoverflyConfig::from_env().unwrap();

        assert_eq!(config.target(), Target::Remote);
        assert_eq!(config.host, "https://hoverfly.example.com");
        assert_eq!(config.admin_port, 9888);
        assert!(config.auth_from_env);
        assert!(config.proxy_localhost);
    }

    #[test]
    fn test_from_env_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("HOVERFLY_PROXY_PORT", "not-a-port");

        let err = HoverflyConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar("HOVERFLY_PROXY_PORT", _)));
    }

    #[test]
    fn test_parse_env_bool_variants() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        for value in ["1", "true", "YES", "on"] {
            guard.set("HOVERFLY_WEBSERVER", value);
            assert!(parse_env_bool("HOVERFLY_WEBSERVER", false), "{value}");
        }
        guard.set("HOVERFLY_WEBSERVER", "off");
        assert!(!parse_env_bool("HOVERFLY_WEBSERVER", true));
    }
}
