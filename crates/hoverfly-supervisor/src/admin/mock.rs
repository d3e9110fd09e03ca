// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock admin client for testing.
//!
//! Scripted health responses, an in-memory mode and a call log.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{AdminApiError, AdminClient, HoverflyInfo};
use crate::mode::{HoverflyMode, ModeArguments, ModeView};

/// A recorded admin API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    /// `health`
    Health,
    /// `get_mode`
    GetMode,
    /// `set_mode`
    SetMode(HoverflyMode, Option<ModeArguments>),
    /// `set_destination`
    SetDestination(String),
    /// `delete_journal`
    DeleteJournal,
    /// `clean_diffs`
    CleanDiffs,
    /// `delete_state`
    DeleteState,
    /// `get_info`
    GetInfo,
}

/// Mock admin client for testing.
#[derive(Debug)]
pub struct MockAdminClient {
    calls: Mutex<Vec<AdminCall>>,
    mode: Mutex<ModeView>,
    destination: Mutex<String>,
    healthy: AtomicBool,
    unhealthy_polls: AtomicUsize,
    /// If true, `delete_journal` fails.
    pub fail_journal: bool,
    /// If true, `clean_diffs` fails.
    pub fail_diffs: bool,
    /// If true, `set_mode` fails.
    pub fail_mode: bool,
}

impl Default for MockAdminClient {
    fn default() -> Self {
        Self::healthy()
    }
}

impl MockAdminClient {
    /// An engine that is healthy on the first poll.
    pub fn healthy() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            mode: Mutex::new(ModeView {
                mode: HoverflyMode::Simulate,
                arguments: None,
            }),
            destination: Mutex::new(".".to_string()),
            healthy: AtomicBool::new(true),
            unhealthy_polls: AtomicUsize::new(0),
            fail_journal: false,
            fail_diffs: false,
            fail_mode: false,
        }
    }

    /// An engine that never becomes healthy.
    pub fn unhealthy() -> Self {
        let client = Self::healthy();
        client.healthy.store(false, Ordering::SeqCst);
        client
    }

    /// An engine that reports unhealthy for the first `polls` health checks.
    pub fn healthy_after(polls: usize) -> Self {
        let client = Self::healthy();
        client.unhealthy_polls.store(polls, Ordering::SeqCst);
        client
    }

    /// Journal and diff resets fail.
    pub fn with_failing_resets(mut self) -> Self {
        self.fail_journal = true;
        self.fail_diffs = true;
        self
    }

    /// Mode changes fail.
    pub fn with_failing_mode(mut self) -> Self {
        self.fail_mode = true;
        self
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<AdminCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of health checks so far.
    pub fn health_checks(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == AdminCall::Health)
            .count()
    }

    fn record(&self, call: AdminCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn failure(operation: &str) -> AdminApiError {
        AdminApiError::Status {
            status: 500,
            body: format!("mock {} failure", operation),
        }
    }
}

impl AdminClient for MockAdminClient {
    fn health(&self) -> bool {
        self.record(AdminCall::Health);
        if !self.healthy.load(Ordering::SeqCst) {
            return false;
        }
        self.unhealthy_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    fn get_mode(&self) -> Result<ModeView, AdminApiError> {
        self.record(AdminCall::GetMode);
        Ok(self
            .mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set_mode(
        &self,
        mode: HoverflyMode,
        arguments: Option<&ModeArguments>,
    ) -> Result<(), AdminApiError> {
        self.record(AdminCall::SetMode(mode, arguments.cloned()));
        if self.fail_mode {
            return Err(Self::failure("mode"));
        }
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = ModeView {
            mode,
            arguments: arguments.cloned(),
        };
        Ok(())
    }

    fn set_destination(&self, destination: &str) -> Result<(), AdminApiError> {
        self.record(AdminCall::SetDestination(destination.to_string()));
        *self
            .destination
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = destination.to_string();
        Ok(())
    }

    fn delete_journal(&self) -> Result<(), AdminApiError> {
        self.record(AdminCall::DeleteJournal);
        if self.fail_journal {
            return Err(Self::failure("journal"));
        }
        Ok(())
    }

    fn clean_diffs(&self) -> Result<(), AdminApiError> {
        self.record(AdminCall::CleanDiffs);
        if self.fail_diffs {
            return Err(Self::failure("diff"));
        }
        Ok(())
    }

    fn delete_state(&self) -> Result<(), AdminApiError> {
        self.record(AdminCall::DeleteState);
        Ok(())
    }

    fn get_info(&self) -> Result<HoverflyInfo, AdminApiError> {
        self.record(AdminCall::GetInfo);
        let mode = self
            .mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(HoverflyInfo {
            destination: self
                .destination
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            mode: mode.mode.to_string(),
            arguments: mode.arguments,
            version: "mock".to_string(),
            ..HoverflyInfo::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_after() {
        let client = MockAdminClient::healthy_after(2);
        assert!(!client.health());
        assert!(!client.health());
        assert!(client.health());
        assert!(client.health());
        assert_eq!(client.health_checks(), 4);
    }

    #[test]
    fn test_unhealthy_never_recovers() {
        let client = MockAdminClient::unhealthy();
        for _ in 0..5 {
            assert!(!client.health());
        }
    }

    #[test]
    fn test_mode_round_trip_and_call_log() {
        let client = MockAdminClient::healthy();
        let args = ModeArguments::new(vec!["*".to_string()], false);

        client.set_mode(HoverflyMode::Capture, Some(&args)).unwrap();
        let view = client.get_mode().unwrap();

        assert_eq!(view.mode, HoverflyMode::Capture);
        assert_eq!(view.arguments, Some(args.clone()));
        assert_eq!(
            client.calls(),
            vec![
                AdminCall::SetMode(HoverflyMode::Capture, Some(args)),
                AdminCall::GetMode
            ]
        );
    }

    #[test]
    fn test_failing_resets() {
        let client = MockAdminClient::healthy().with_failing_resets();
        assert!(client.delete_journal().is_err());
        assert!(client.clean_diffs().is_err());
        assert!(client.delete_state().is_ok());
    }
}
