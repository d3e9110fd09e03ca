// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine lifecycle orchestration.
//!
//! [`Hoverfly`] owns one engine instance from `start()` to `close()`.
//!
//! # Start
//!
//! ```text
//! resolve config ─► check ports ─► stage files ─► launch ─► poll health
//!        ─► destination / capture mode ─► default trust ─► proxy env ─► hook ─► READY
//! ```
//!
//! Anything failing before READY triggers the same best-effort teardown as
//! `close()` and leaves the instance STOPPED.
//!
//! # Close
//!
//! ```text
//! deregister hook ─► SIGTERM + wait (SIGKILL after grace) ─► revert proxy env
//!        ─► restore trust ─► purge staging dir ─► STOPPED
//! ```
//!
//! Every close step runs regardless of earlier failures; failures are logged.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hoverfly_supervisor::{Hoverfly, HoverflyConfig, HoverflyMode};
//! use hoverfly_supervisor::admin::MockAdminClient;
//! use hoverfly_supervisor::runner::MockRunner;
//!
//! let mut hoverfly = Hoverfly::builder(HoverflyConfig::local(), HoverflyMode::Simulate)
//!     .runner(Arc::new(MockRunner::new()))
//!     .admin_client(Arc::new(MockAdminClient::healthy()))
//!     .build();
//! hoverfly.start()?;
//! hoverfly.close();
//! # Ok::<(), hoverfly_supervisor::Error>(())
//! ```

mod command;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::admin::{AdminClient, HoverflyInfo, HttpAdminClient};
use crate::config::HoverflyConfig;
use crate::error::{Error, Result};
use crate::mode::{HoverflyMode, ModeArguments};
use crate::network::{NetworkConfigurator, SystemProxyConfigurator};
use crate::platform::Platform;
use crate::ports;
use crate::resources::{DEFAULT_CA_CERT, ResourceLocator, TempFileManager};
use crate::runner::{LaunchOptions, ManagedProcess, NativeRunner, Runner, RunnerError};
use crate::shutdown::{self, HookId};
use crate::tls::{DefaultTrustInstaller, TrustInstaller};
use crate::validator::{self, HoverflyConfiguration};

pub use command::{StagedFiles, build_args};

/// Staged name of a custom CA certificate.
const STAGED_CERT: &str = "ca.crt";
/// Staged name of a custom CA key.
const STAGED_KEY: &str = "ca.key";

/// Local engines currently started by any supervisor in this process.
static LOCAL_RUNNING: AtomicUsize = AtomicUsize::new(0);

/// Lifecycle state of a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Never started.
    Idle,
    /// `start()` in progress.
    Starting,
    /// Engine healthy and global settings applied.
    Ready,
    /// Teardown in progress.
    Stopping,
    /// Torn down, or failed to start.
    Stopped,
}

/// Timing knobs of a supervisor.
#[derive(Debug, Clone, Copy)]
struct Timing {
    health_check_timeout: Duration,
    health_check_interval: Duration,
    termination_grace: Duration,
}

/// Builder for creating a [`Hoverfly`].
pub struct HoverflyBuilder {
    config: HoverflyConfig,
    mode: HoverflyMode,
    runner: Option<Arc<dyn Runner>>,
    admin_client: Option<Arc<dyn AdminClient>>,
    trust_installer: Option<Arc<dyn TrustInstaller>>,
    network_configurator: Option<Arc<dyn NetworkConfigurator>>,
    timing: Timing,
}

impl HoverflyBuilder {
    /// Create a builder with default collaborators.
    pub fn new(config: HoverflyConfig, mode: HoverflyMode) -> Self {
        Self {
            config,
            mode,
            runner: None,
            admin_client: None,
            trust_installer: None,
            network_configurator: None,
            timing: Timing {
                health_check_timeout: Duration::from_secs(10),
                health_check_interval: Duration::from_millis(100),
                termination_grace: Duration::from_secs(5),
            },
        }
    }

    /// Process launcher (default: [`NativeRunner`]).
    pub fn runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Admin API client (default: HTTP client built from the resolved configuration).
    pub fn admin_client(mut self, client: Arc<dyn AdminClient>) -> Self {
        self.admin_client = Some(client);
        self
    }

    /// Default-trust installer (default: [`DefaultTrustInstaller`]).
    pub fn trust_installer(mut self, installer: Arc<dyn TrustInstaller>) -> Self {
        self.trust_installer = Some(installer);
        self
    }

    /// Proxy configurator (default: [`SystemProxyConfigurator`]).
    pub fn network_configurator(mut self, configurator: Arc<dyn NetworkConfigurator>) -> Self {
        self.network_configurator = Some(configurator);
        self
    }

    /// Maximum time to wait for the engine to report healthy (default: 10s).
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.timing.health_check_timeout = timeout;
        self
    }

    /// Pause between health checks (default: 100ms).
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.timing.health_check_interval = interval;
        self
    }

    /// Time allowed between SIGTERM and SIGKILL on close (default: 5s).
    pub fn termination_grace(mut self, grace: Duration) -> Self {
        self.timing.termination_grace = grace;
        self
    }

    /// Build the supervisor. Nothing is resolved or started yet.
    pub fn build(self) -> Hoverfly {
        let inner = Inner {
            state: SupervisorState::Idle,
            raw_config: self.config,
            configuration: None,
            mode: self.mode,
            runner: self.runner.unwrap_or_else(|| Arc::new(NativeRunner::new())),
            admin: self.admin_client,
            trust: self
                .trust_installer
                .unwrap_or_else(|| Arc::new(DefaultTrustInstaller::new())),
            network: self
                .network_configurator
                .unwrap_or_else(|| Arc::new(SystemProxyConfigurator::new())),
            timing: self.timing,
            temp_files: None,
            process: None,
            counted_local: false,
            trust_installed: false,
            network_applied: false,
        };

        Hoverfly {
            inner: Arc::new(Mutex::new(inner)),
            hook: None,
        }
    }
}

/// Supervisor of one engine instance.
///
/// Dropping a supervisor closes it.
pub struct Hoverfly {
    inner: Arc<Mutex<Inner>>,
    hook: Option<HookId>,
}

struct Inner {
    state: SupervisorState,
    raw_config: HoverflyConfig,
    configuration: Option<HoverflyConfiguration>,
    mode: HoverflyMode,
    runner: Arc<dyn Runner>,
    admin: Option<Arc<dyn AdminClient>>,
    trust: Arc<dyn TrustInstaller>,
    network: Arc<dyn NetworkConfigurator>,
    timing: Timing,
    temp_files: Option<TempFileManager>,
    process: Option<Box<dyn ManagedProcess>>,
    counted_local: bool,
    trust_installed: bool,
    network_applied: bool,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Hoverfly {
    /// Supervisor with default collaborators.
    pub fn new(config: HoverflyConfig, mode: HoverflyMode) -> Self {
        HoverflyBuilder::new(config, mode).build()
    }

    /// Start building a supervisor with custom collaborators.
    pub fn builder(config: HoverflyConfig, mode: HoverflyMode) -> HoverflyBuilder {
        HoverflyBuilder::new(config, mode)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Start the engine and wait until it is healthy.
    ///
    /// Starting an instance that is already READY logs a warning and returns.
    /// On failure everything acquired so far is released and the instance is
    /// STOPPED.
    pub fn start(&mut self) -> Result<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut inner = lock(&self.inner);

        if inner.state == SupervisorState::Ready {
            warn!("Hoverfly is already running");
            return Ok(());
        }

        inner.state = SupervisorState::Starting;
        if let Err(e) = inner.start() {
            error!(error = %e, "Failed to start Hoverfly");
            inner.teardown();
            return Err(e);
        }

        self.hook = Some(shutdown::register(move || {
            if let Some(inner) = weak.upgrade() {
                info!("Shutdown hook stopping Hoverfly");
                lock(&inner).teardown();
            }
        }));

        inner.state = SupervisorState::Ready;
        info!(
            proxy_port = inner.configuration.as_ref().map(|c| c.proxy_port()),
            admin_port = inner.configuration.as_ref().map(|c| c.admin_port()),
            mode = %inner.mode,
            "Hoverfly is ready"
        );
        Ok(())
    }

    /// Stop the engine and undo every global change. Never fails.
    ///
    /// A no-op on an instance that was never started or is already stopped.
    pub fn close(&mut self) {
        if let Some(hook) = self.hook.take() {
            shutdown::deregister(hook);
        }
        self.lock().teardown();
    }

    /// Resolve (once) and return the validated configuration.
    pub fn resolve_configuration(&self) -> Result<HoverflyConfiguration> {
        Ok(self.lock().resolve()?.clone())
    }

    /// The validated configuration, if resolved.
    pub fn configuration(&self) -> Option<HoverflyConfiguration> {
        self.lock().configuration.clone()
    }

    /// Resolved proxy port.
    pub fn proxy_port(&self) -> Option<u16> {
        self.lock().configuration.as_ref().map(|c| c.proxy_port())
    }

    /// Resolved admin port.
    pub fn admin_port(&self) -> Option<u16> {
        self.lock().configuration.as_ref().map(|c| c.admin_port())
    }

    /// Resolved admin scheme.
    pub fn scheme(&self) -> Option<String> {
        self.lock()
            .configuration
            .as_ref()
            .map(|c| c.scheme().to_string())
    }

    /// Resolved engine host.
    pub fn host(&self) -> Option<String> {
        self.lock()
            .configuration
            .as_ref()
            .map(|c| c.host().to_string())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        self.lock().state
    }

    /// Mode the engine was last put in.
    pub fn mode(&self) -> HoverflyMode {
        self.lock().mode
    }

    /// Staging directory, while one exists.
    pub fn temp_directory(&self) -> Option<PathBuf> {
        self.lock()
            .temp_files
            .as_ref()
            .and_then(|t| t.existing_directory().map(Path::to_path_buf))
    }

    /// OS pid of a running local engine.
    pub fn pid(&self) -> Option<u32> {
        self.lock().process.as_ref().and_then(|p| p.pid())
    }

    /// Registered shutdown hook, while one is registered.
    pub fn shutdown_hook(&self) -> Option<HookId> {
        self.hook.filter(|id| shutdown::is_registered(*id))
    }

    /// Switch the engine mode without arguments.
    pub fn set_mode(&mut self, mode: HoverflyMode) -> Result<()> {
        self.change_mode(mode, None)
    }

    /// Switch the engine mode with explicit arguments.
    pub fn set_mode_with_arguments(
        &mut self,
        mode: HoverflyMode,
        arguments: &ModeArguments,
    ) -> Result<()> {
        self.change_mode(mode, Some(arguments.clone()))
    }

    /// Switch the engine mode, sending the configured capture arguments.
    pub fn reset_mode(&mut self, mode: HoverflyMode) -> Result<()> {
        let arguments = {
            let inner = self.lock();
            let config = inner.configuration.as_ref().ok_or(Error::NotRunning)?;
            capture_arguments(config)
        };
        self.change_mode(mode, Some(arguments))
    }

    fn change_mode(&mut self, mode: HoverflyMode, arguments: Option<ModeArguments>) -> Result<()> {
        let mut inner = self.lock();
        let admin = inner.ready_admin()?;
        admin.set_mode(mode, arguments.as_ref())?;
        inner.mode = mode;
        info!(mode = %mode, "Hoverfly mode changed");
        Ok(())
    }

    /// Mode reported by the engine.
    pub fn get_mode(&self) -> Result<HoverflyMode> {
        let admin = self.lock().ready_admin()?;
        Ok(admin.get_mode()?.mode)
    }

    /// Engine configuration summary.
    pub fn get_hoverfly_info(&self) -> Result<HoverflyInfo> {
        let admin = self.lock().ready_admin()?;
        Ok(admin.get_info()?)
    }

    /// Delete the request journal. Failures are logged, not returned.
    ///
    /// Skipped unless the instance is READY; the same holds for
    /// [`reset_diffs`](Self::reset_diffs) and [`reset_state`](Self::reset_state).
    pub fn reset_journal(&self) {
        if let Some(admin) = self.ready_admin_for("journal") {
            reset_journal(admin.as_ref());
        }
    }

    /// Delete recorded diffs. Failures are logged, not returned.
    pub fn reset_diffs(&self) {
        let Some(admin) = self.ready_admin_for("diffs") else {
            return;
        };
        if let Err(e) = admin.clean_diffs() {
            warn!(error = %e, "Failed to reset diffs");
        }
    }

    /// Delete stateful-simulation state. Failures are logged, not returned.
    pub fn reset_state(&self) {
        let Some(admin) = self.ready_admin_for("state") else {
            return;
        };
        if let Err(e) = admin.delete_state() {
            warn!(error = %e, "Failed to reset state");
        }
    }

    fn ready_admin_for(&self, reset: &str) -> Option<Arc<dyn AdminClient>> {
        match self.lock().ready_admin() {
            Ok(admin) => Some(admin),
            Err(_) => {
                debug!(reset = reset, "Hoverfly is not running, skipping reset");
                None
            }
        }
    }
}

impl Drop for Hoverfly {
    fn drop(&mut self) {
        self.close();
    }
}

fn capture_arguments(config: &HoverflyConfiguration) -> ModeArguments {
    ModeArguments::new(config.capture_headers().to_vec(), config.is_stateful_capture())
}

fn reset_journal(admin: &dyn AdminClient) {
    if let Err(e) = admin.delete_journal() {
        warn!(error = %e, "Failed to reset journal");
    }
}

impl Inner {
    fn resolve(&mut self) -> Result<&HoverflyConfiguration> {
        if self.configuration.is_none() {
            let configuration = validator::validate(Some(self.raw_config.clone()))?;
            self.configuration = Some(configuration);
        }
        self.configuration.as_ref().ok_or(Error::NotRunning)
    }

    fn ready_admin(&self) -> Result<Arc<dyn AdminClient>> {
        if self.state != SupervisorState::Ready {
            return Err(Error::NotRunning);
        }
        self.admin.clone().ok_or(Error::NotRunning)
    }

    fn start(&mut self) -> Result<()> {
        let config = self.resolve()?.clone();

        let admin = match &self.admin {
            Some(admin) => Arc::clone(admin),
            None => {
                let client: Arc<dyn AdminClient> =
                    Arc::new(HttpAdminClient::from_configuration(&config)?);
                self.admin = Some(Arc::clone(&client));
                client
            }
        };

        let trust_ca = if config.is_remote_instance() {
            info!(url = %config.admin_url(), "Using remote Hoverfly");
            reset_journal(admin.as_ref());
            config.proxy_ca_cert().map(Path::to_path_buf)
        } else {
            self.start_local_process(&config)?
        };

        self.wait_for_healthy(admin.as_ref())?;

        if config.is_remote_instance()
            && let Some(destination) = config.destination()
        {
            admin.set_destination(destination)?;
        }

        if self.mode == HoverflyMode::Capture {
            admin.set_mode(HoverflyMode::Capture, Some(&capture_arguments(&config)))?;
        }

        if let Some(ca_cert) = trust_ca {
            self.trust.install_default_trust(&ca_cert)?;
            self.trust_installed = true;
        }

        if config.is_webserver() {
            debug!("Web server mode, leaving proxy settings untouched");
        } else {
            self.network
                .apply(config.host(), config.proxy_port(), config.proxy_localhost());
            self.network_applied = true;
        }

        Ok(())
    }

    /// Launch a local engine. Returns the CA to trust once it is healthy.
    fn start_local_process(&mut self, config: &HoverflyConfiguration) -> Result<Option<PathBuf>> {
        if LOCAL_RUNNING.load(Ordering::SeqCst) > 0 {
            warn!("Local Hoverfly is already running");
        }

        ports::check_port_available(config.proxy_port())?;
        ports::check_port_available(config.admin_port())?;

        let platform = Platform::current()?;
        let locator = ResourceLocator::new(config.resource_roots().to_vec());
        let temp_files = self.temp_files.insert(
            TempFileManager::new(locator)
                .with_binary_location(config.binary_location().map(Path::to_path_buf)),
        );

        let binary = temp_files.copy_hoverfly_binary(&platform)?;

        let mut staged = StagedFiles::default();
        if let (Some(cert), Some(key)) = (config.ssl_certificate_path(), config.ssl_key_path()) {
            staged.certificate = Some(temp_files.copy_resource(cert, STAGED_CERT)?);
            staged.key = Some(temp_files.copy_resource(key, STAGED_KEY)?);
        }

        if let Some(middleware) = config.local_middleware() {
            let file_name = Path::new(&middleware.path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::ResourceNotFound(middleware.path.clone()))?;
            staged.middleware_script = Some(temp_files.copy_resource(&middleware.path, &file_name)?);
        }

        let trust_ca = if config.has_custom_certificate() {
            debug!("Custom certificate supplied, default trust is left to the caller");
            None
        } else {
            let ca = temp_files
                .locator()
                .locate(DEFAULT_CA_CERT)
                .ok_or_else(|| Error::ResourceNotFound(DEFAULT_CA_CERT.to_string()))?;
            Some(ca)
        };

        let options = LaunchOptions {
            binary,
            args: build_args(config, self.mode, &staged),
            working_dir: temp_files.temp_directory()?,
            output: config.output().clone(),
        };

        let process = self.runner.launch(&options)?;
        info!(
            runner = self.runner.runner_type(),
            pid = process.pid(),
            "Hoverfly process started"
        );
        self.process = Some(process);
        LOCAL_RUNNING.fetch_add(1, Ordering::SeqCst);
        self.counted_local = true;

        Ok(trust_ca)
    }

    fn wait_for_healthy(&mut self, admin: &dyn AdminClient) -> Result<()> {
        let timeout = self.timing.health_check_timeout;
        let started = Instant::now();

        loop {
            if admin.health() {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Hoverfly is healthy");
                return Ok(());
            }

            if let Some(process) = self.process.as_mut()
                && !process.is_running()
            {
                return Err(RunnerError::StartFailed(
                    "process exited before becoming healthy".to_string(),
                )
                .into());
            }

            if started.elapsed() >= timeout {
                return Err(Error::StartupTimeout { timeout });
            }
            std::thread::sleep(self.timing.health_check_interval);
        }
    }

    /// Best-effort release of everything `start` acquired.
    fn teardown(&mut self) {
        if matches!(
            self.state,
            SupervisorState::Idle | SupervisorState::Stopped
        ) {
            return;
        }
        self.state = SupervisorState::Stopping;

        if let Some(process) = self.process.take() {
            self.stop_process(process);
        }
        if self.counted_local {
            LOCAL_RUNNING.fetch_sub(1, Ordering::SeqCst);
            self.counted_local = false;
        }

        if self.network_applied {
            self.network.revert();
            self.network_applied = false;
        }
        if self.trust_installed {
            self.trust.restore();
            self.trust_installed = false;
        }

        if let Some(mut temp_files) = self.temp_files.take() {
            temp_files.purge();
        }

        self.state = SupervisorState::Stopped;
        info!("Hoverfly stopped");
    }

    fn stop_process(&self, mut process: Box<dyn ManagedProcess>) {
        let pid = process.pid();

        if let Err(e) = process.terminate() {
            warn!(pid = pid, error = %e, "Failed to terminate Hoverfly process");
        }

        match process.wait_timeout(self.timing.termination_grace) {
            Ok(true) => {
                debug!(pid = pid, "Hoverfly process exited");
                return;
            }
            Ok(false) => warn!(
                pid = pid,
                grace_ms = self.timing.termination_grace.as_millis() as u64,
                "Hoverfly did not exit in time, killing"
            ),
            Err(e) => warn!(pid = pid, error = %e, "Failed waiting for Hoverfly process"),
        }

        if let Err(e) = process.kill() {
            warn!(pid = pid, error = %e, "Failed to kill Hoverfly process");
        }
        if let Err(e) = process.wait() {
            warn!(pid = pid, error = %e, "Failed to reap Hoverfly process");
        }
    }
}
