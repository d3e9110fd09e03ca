// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock runner for testing.
//!
//! A runner that records launches and hands out fake processes without
//! spawning anything. Optionally the fake processes hold the proxy and admin
//! ports like a real engine does.

use std::net::{Ipv4Addr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::traits::*;

/// Observable state of a fake process.
#[derive(Debug, Default)]
pub struct MockProcessState {
    running: AtomicBool,
    terminated: AtomicBool,
    killed: AtomicBool,
    reaped: AtomicBool,
    binary_present_at_exit: Mutex<Option<bool>>,
}

impl MockProcessState {
    /// Whether the fake process is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether `terminate` was called.
    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Whether `kill` was called.
    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Whether the process was waited on after exiting.
    pub fn was_reaped(&self) -> bool {
        self.reaped.load(Ordering::SeqCst)
    }

    /// Whether the launched binary still existed on disk when the process was reaped.
    pub fn binary_present_at_exit(&self) -> Option<bool> {
        *self
            .binary_present_at_exit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate the process exiting on its own.
    pub fn exit(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Mock runner for testing.
#[derive(Debug, Default)]
pub struct MockRunner {
    launches: Mutex<Vec<LaunchOptions>>,
    processes: Mutex<Vec<Arc<MockProcessState>>>,
    /// If true, every launch fails.
    pub fail_by_default: bool,
    /// If true, processes ignore `terminate` and only exit on `kill`.
    pub ignore_terminate: bool,
    /// If true, processes listen on the `-pp`/`-ap` ports until they exit.
    pub bind_ports: bool,
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock runner whose launches fail.
    pub fn failing() -> Self {
        Self {
            fail_by_default: true,
            ..Self::default()
        }
    }

    /// Create a mock runner whose processes ignore SIGTERM.
    pub fn stubborn() -> Self {
        Self {
            ignore_terminate: true,
            ..Self::default()
        }
    }

    /// Create a mock runner whose processes bind their proxy and admin ports.
    pub fn binding_ports() -> Self {
        Self {
            bind_ports: true,
            ..Self::default()
        }
    }

    /// All launch requests so far.
    pub fn launches(&self) -> Vec<LaunchOptions> {
        self.launches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of launch requests so far.
    pub fn launch_count(&self) -> usize {
        self.launches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// State of every process handed out, in launch order.
    pub fn processes(&self) -> Vec<Arc<MockProcessState>> {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Runner for MockRunner {
    fn runner_type(&self) -> &'static str {
        "mock"
    }

    fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn ManagedProcess>> {
        self.launches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options.clone());

        if self.fail_by_default {
            return Err(RunnerError::StartFailed("Mock failure".to_string()));
        }

        let listeners = if self.bind_ports {
            bind_engine_ports(&options.args)?
        } else {
            Vec::new()
        };

        let state = Arc::new(MockProcessState::default());
        state.running.store(true, Ordering::SeqCst);
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&state));

        let pid = 40_000 + self.launch_count() as u32;
        Ok(Box::new(MockProcess {
            pid,
            options: options.clone(),
            ignore_terminate: self.ignore_terminate,
            state,
            listeners,
        }))
    }
}

fn bind_engine_ports(args: &[String]) -> Result<Vec<TcpListener>> {
    args.windows(2)
        .filter(|pair| pair[0] == "-pp" || pair[0] == "-ap")
        .map(|pair| {
            let port: u16 = pair[1]
                .parse()
                .map_err(|_| RunnerError::StartFailed(format!("bad port {}", pair[1])))?;
            TcpListener::bind((Ipv4Addr::LOCALHOST, port))
                .map_err(|e| RunnerError::StartFailed(format!("bind {}: {}", port, e)))
        })
        .collect()
}

/// Fake process handed out by [`MockRunner`].
#[derive(Debug)]
pub struct MockProcess {
    pid: u32,
    options: LaunchOptions,
    ignore_terminate: bool,
    state: Arc<MockProcessState>,
    listeners: Vec<TcpListener>,
}

impl MockProcess {
    fn stop(&mut self) {
        self.state.running.store(false, Ordering::SeqCst);
        self.listeners.clear();
    }

    fn reap(&self) {
        if !self.state.reaped.swap(true, Ordering::SeqCst) {
            let present = self.options.binary.exists();
            *self
                .state
                .binary_present_at_exit
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(present);
        }
    }
}

impl ManagedProcess for MockProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_running(&mut self) -> bool {
        self.state.is_running()
    }

    fn terminate(&mut self) -> Result<()> {
        self.state.terminated.store(true, Ordering::SeqCst);
        if !self.ignore_terminate {
            self.stop();
        }
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.state.killed.store(true, Ordering::SeqCst);
        self.stop();
        Ok(())
    }

    fn wait_timeout(&mut self, _timeout: Duration) -> Result<bool> {
        if self.state.is_running() {
            return Ok(false);
        }
        self.reap();
        Ok(true)
    }

    fn wait(&mut self) -> Result<()> {
        // A fake process that is still running would block forever.
        self.stop();
        self.reap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessOutput;
    use std::path::PathBuf;

    fn options() -> LaunchOptions {
        LaunchOptions {
            binary: PathBuf::from("/nonexistent/hoverfly"),
            args: vec![],
            working_dir: PathBuf::from("/tmp"),
            output: ProcessOutput::StdOut,
        }
    }

    #[test]
    fn test_mock_records_launches() {
        let runner = MockRunner::new();
        let mut process = runner.launch(&options()).unwrap();

        assert_eq!(runner.runner_type(), "mock");
        assert_eq!(runner.launch_count(), 1);
        assert!(process.is_running());

        process.terminate().unwrap();
        assert!(process.wait_timeout(Duration::from_secs(1)).unwrap());

        let state = &runner.processes()[0];
        assert!(state.was_terminated());
        assert!(state.was_reaped());
        assert_eq!(state.binary_present_at_exit(), Some(false));
    }

    #[test]
    fn test_mock_failing() {
        let runner = MockRunner::failing();
        assert!(runner.launch(&options()).is_err());
        assert_eq!(runner.launch_count(), 1);
        assert!(runner.processes().is_empty());
    }

    #[test]
    fn test_mock_stubborn_needs_kill() {
        let runner = MockRunner::stubborn();
        let mut process = runner.launch(&options()).unwrap();

        process.terminate().unwrap();
        assert!(!process.wait_timeout(Duration::from_millis(10)).unwrap());

        process.kill().unwrap();
        process.wait().unwrap();
        assert!(runner.processes()[0].was_killed());
    }

    #[test]
    fn test_binding_ports_holds_them_until_exit() {
        let port = crate::ports::find_free_port().unwrap();
        let runner = MockRunner::binding_ports();
        let mut options = options();
        options.args = vec!["-ap".to_string(), port.to_string()];

        let mut process = runner.launch(&options).unwrap();
        assert!(crate::ports::check_port_available(port).is_err());
        assert!(runner.launch(&options).is_err());

        process.terminate().unwrap();
        assert!(crate::ports::check_port_available(port).is_ok());
    }
}
