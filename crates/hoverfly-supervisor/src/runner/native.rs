// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Native runner - spawns the engine as a child process.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::traits::*;
use crate::config::ProcessOutput;
use crate::output;

/// Poll interval while waiting for the process to exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runner that spawns the engine binary directly.
#[derive(Debug, Default)]
pub struct NativeRunner;

impl NativeRunner {
    /// Create a new native runner.
    pub fn new() -> Self {
        Self
    }
}

impl Runner for NativeRunner {
    fn runner_type(&self) -> &'static str {
        "native"
    }

    fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn ManagedProcess>> {
        if !options.binary.is_file() {
            return Err(RunnerError::BinaryNotFound(
                options.binary.display().to_string(),
            ));
        }

        let mut command = Command::new(&options.binary);
        command
            .args(&options.args)
            .current_dir(&options.working_dir)
            .stdin(Stdio::null());

        match &options.output {
            ProcessOutput::Logger(_) => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            ProcessOutput::StdOut => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        info!(
            binary = %options.binary.display(),
            args = ?options.args,
            "Executing binary"
        );

        let mut child = command.spawn().map_err(|e| {
            RunnerError::StartFailed(format!("{}: {}", options.binary.display(), e))
        })?;

        // Pumps are detached: a descendant holding the pipes must not
        // hold up termination.
        if let ProcessOutput::Logger(logger) = &options.output {
            if let Some(stdout) = child.stdout.take() {
                output::pump(stdout, logger.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                output::pump(stderr, logger.clone());
            }
        }

        debug!(pid = child.id(), "Spawned Hoverfly process");

        Ok(Box::new(NativeProcess { child }))
    }
}

/// A child process spawned by [`NativeRunner`].
#[derive(Debug)]
pub struct NativeProcess {
    child: Child,
}

impl ManagedProcess for NativeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> Result<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if !self.is_running() {
            return Ok(());
        }

        let pid = self.child.id() as i32;
        match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {
                debug!(pid = pid, "Sent SIGTERM to process");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                debug!(pid = pid, "Process already dead (ESRCH)");
                Ok(())
            }
            Err(e) => Err(RunnerError::Signal(format!("SIGTERM to {}: {}", pid, e))),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<()> {
        self.kill()
    }

    fn kill(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.child.kill()?;
        debug!(pid = self.child.id(), "Killed process");
        Ok(())
    }

    fn wait_timeout(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.child.try_wait()?.is_some() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    fn wait(&mut self) -> Result<()> {
        let status = self.child.wait()?;
        debug!(pid = self.child.id(), status = %status, "Process exited");
        Ok(())
    }
}

impl Drop for NativeProcess {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
