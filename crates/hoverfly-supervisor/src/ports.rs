// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Loopback port probing and free-port allocation.
//!
//! Both operations are inherently racy: a port that is free when checked may be
//! taken before the engine binds it. A late bind failure surfaces as a launch
//! or health-check failure.

use std::collections::BTreeSet;
use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::{Error, Result};

/// Ports handed out by [`find_free_port`] during this process lifetime.
static CLAIMED_PORTS: Mutex<BTreeSet<u16>> = Mutex::new(BTreeSet::new());

/// Number of OS allocations tried before giving up on finding an unclaimed port.
const MAX_ALLOCATION_ATTEMPTS: usize = 64;

/// Fail with [`Error::PortInUse`] if `port` cannot be bound on loopback.
pub fn check_port_available(port: u16) -> Result<()> {
    match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) => {
            debug!(port = port, error = %e, "Port bind check failed");
            Err(Error::PortInUse { port })
        }
    }
}

/// Reserve an explicitly configured port so [`find_free_port`] never returns it.
///
/// Returns `false` if the port was already reserved.
pub fn claim_port(port: u16) -> bool {
    CLAIMED_PORTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(port)
}

/// Ask the OS for a free loopback port that no other instance in this process
/// has been given.
pub fn find_free_port() -> io::Result<u16> {
    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
            listener.local_addr()?.port()
        };

        let mut claimed = CLAIMED_PORTS.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.insert(port) {
            debug!(port = port, "Allocated free port");
            return Ok(port);
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        "no unclaimed port available",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_available() {
        let port = find_free_port().unwrap();
        assert_ne!(port, 0);
        assert!(check_port_available(port).is_ok());
    }

    #[test]
    fn test_bound_port_is_reported_in_use() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let err = check_port_available(port).unwrap_err();
        assert!(matches!(err, Error::PortInUse { port: p } if p == port));
        assert_eq!(err.to_string(), format!("Port is already in use: {port}"));
    }

    #[test]
    fn test_free_ports_are_never_reused() {
        let ports: Vec<u16> = (0..16).map(|_| find_free_port().unwrap()).collect();
        let unique: BTreeSet<u16> = ports.iter().copied().collect();
        assert_eq!(unique.len(), ports.len());
    }

    #[test]
    fn test_claimed_port_is_not_allocated() {
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(claim_port(port));
        assert!(!claim_port(port));

        for _ in 0..32 {
            assert_ne!(find_free_port().unwrap(), port);
        }
    }
}
