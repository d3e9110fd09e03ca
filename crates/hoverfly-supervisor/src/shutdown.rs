// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shutdown hook registry.
//!
//! Rust runs no finalizers at process exit, so hooks are collected in a
//! process-wide registry and executed by whoever owns process shutdown
//! (a signal handler, the end of `main`) via [`run_shutdown_hooks`].
//! A hook runs at most once: running drains the registry, and a supervisor
//! deregisters its hook before closing explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

type Hook = Box<dyn FnOnce() + Send>;

static HOOKS: Mutex<Vec<(HookId, Hook)>> = Mutex::new(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Register `hook` to run on [`run_shutdown_hooks`].
pub fn register<F>(hook: F) -> HookId
where
    F: FnOnce() + Send + 'static,
{
    let id = HookId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    HOOKS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((id, Box::new(hook)));
    debug!(hook = id.0, "Registered shutdown hook");
    id
}

/// Remove a hook without running it. Returns `false` if it was not registered.
pub fn deregister(id: HookId) -> bool {
    let mut hooks = HOOKS.lock().unwrap_or_else(PoisonError::into_inner);
    let before = hooks.len();
    hooks.retain(|(hook_id, _)| *hook_id != id);
    let removed = hooks.len() != before;
    if removed {
        debug!(hook = id.0, "Deregistered shutdown hook");
    }
    removed
}

/// Whether `id` is still registered.
pub fn is_registered(id: HookId) -> bool {
    HOOKS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .any(|(hook_id, _)| *hook_id == id)
}

/// Run and remove every registered hook, most recent first.
///
/// Hooks run outside the registry lock, so a hook may itself deregister.
pub fn run_shutdown_hooks() -> usize {
    let hooks: Vec<(HookId, Hook)> = {
        let mut registry = HOOKS.lock().unwrap_or_else(PoisonError::into_inner);
        registry.drain(..).rev().collect()
    };

    let count = hooks.len();
    if count > 0 {
        info!(count = count, "Running shutdown hooks");
    }
    for (_, hook) in hooks {
        hook();
    }
    count
}
