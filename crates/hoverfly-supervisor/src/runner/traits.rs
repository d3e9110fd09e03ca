// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner trait definitions.
//!
//! Defines the abstract interface for launching the engine process.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ProcessOutput;

/// Errors from runner operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    /// Binary executable was not found.
    #[error("Binary not found: {0}")]
    BinaryNotFound(String),

    /// Process failed to start.
    #[error("Process start failed: {0}")]
    StartFailed(String),

    /// Delivering a signal to the process failed.
    #[error("Signal delivery failed: {0}")]
    Signal(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Options for launching the engine.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Staged engine binary.
    pub binary: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Working directory of the process (the staging directory).
    pub working_dir: PathBuf,
    /// Where stdout/stderr go.
    pub output: ProcessOutput,
}

/// A launched engine process.
///
/// Owned by exactly one supervisor; never shared between threads concurrently.
pub trait ManagedProcess: Send + fmt::Debug {
    /// OS process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Whether the process has not exited yet.
    fn is_running(&mut self) -> bool;

    /// Ask the process to exit (SIGTERM on unix).
    fn terminate(&mut self) -> Result<()>;

    /// Force the process to exit.
    fn kill(&mut self) -> Result<()>;

    /// Wait up to `timeout` for exit. Returns `true` if the process exited.
    fn wait_timeout(&mut self, timeout: Duration) -> Result<bool>;

    /// Wait for exit without a bound and reap the process.
    fn wait(&mut self) -> Result<()>;
}

/// Trait for engine runners.
///
/// Runners only spawn processes; ports, staging and health are handled by
/// the supervisor.
pub trait Runner: Send + Sync {
    /// Runner type identifier (e.g., "native", "mock")
    fn runner_type(&self) -> &'static str;

    /// Spawn the engine and return a handle to it.
    fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn ManagedProcess>>;
}
