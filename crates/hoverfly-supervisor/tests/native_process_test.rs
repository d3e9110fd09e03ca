// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supervisor tests that spawn real processes.
//!
//! The engine binary is a shell script standing in for Hoverfly; health is
//! answered by the mock admin client.

#![cfg(unix)]

mod common;

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{RecordingNetworkConfigurator, RecordingTrustInstaller, ResourceFixture};
use hoverfly_supervisor::admin::MockAdminClient;
use hoverfly_supervisor::runner::NativeRunner;
use hoverfly_supervisor::{Error, Hoverfly, HoverflyConfig, HoverflyMode, SupervisorState};
use serial_test::serial;

fn hoverfly(config: HoverflyConfig, admin: MockAdminClient) -> Hoverfly {
    Hoverfly::builder(config, HoverflyMode::Simulate)
        .runner(Arc::new(NativeRunner::new()))
        .admin_client(Arc::new(admin))
        .trust_installer(RecordingTrustInstaller::new())
        .network_configurator(RecordingNetworkConfigurator::new())
        .health_check_timeout(Duration::from_secs(2))
        .health_check_interval(Duration::from_millis(20))
        .termination_grace(Duration::from_secs(2))
        .build()
}

fn process_exists(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[test]
#[serial]
fn test_native_start_and_close() {
    let fixture = ResourceFixture::new();
    let config = HoverflyConfig::local().resource_root(fixture.path());
    let mut hoverfly = hoverfly(config, MockAdminClient::healthy());

    hoverfly.start().unwrap();

    let pid = hoverfly.pid().expect("running engine has a pid");
    let temp_dir = hoverfly.temp_directory().unwrap();
    assert!(process_exists(pid));
    assert!(temp_dir.is_dir());

    hoverfly.close();

    assert_eq!(hoverfly.state(), SupervisorState::Stopped);
    assert!(!process_exists(pid));
    assert!(!temp_dir.exists());
}

#[test]
#[serial]
fn test_native_stdout_output() {
    let fixture = ResourceFixture::new();
    let config = HoverflyConfig::local()
        .resource_root(fixture.path())
        .log_to_stdout();
    let mut hoverfly = hoverfly(config, MockAdminClient::healthy());

    hoverfly.start().unwrap();
    let pid = hoverfly.pid().unwrap();
    hoverfly.close();

    assert!(!process_exists(pid));
}

#[test]
#[serial]
fn test_engine_exiting_before_healthy_fails_fast() {
    let fixture = ResourceFixture::new();
    fs::write(
        fixture.binary_path(),
        "#!/bin/sh\necho '{\"level\":\"fatal\",\"msg\":\"bind failed\"}'\nexit 3\n",
    )
    .unwrap();

    let config = HoverflyConfig::local().resource_root(fixture.path());
    let mut hoverfly = hoverfly(config, MockAdminClient::unhealthy());

    let err = hoverfly.start().unwrap_err();

    assert!(matches!(err, Error::Launch(_)), "unexpected error: {err}");
    assert_eq!(hoverfly.state(), SupervisorState::Stopped);
    assert!(hoverfly.temp_directory().is_none());
    assert!(hoverfly.pid().is_none());
}

#[test]
#[serial]
fn test_process_ignoring_sigterm_is_killed() {
    let fixture = ResourceFixture::new();
    fs::write(
        fixture.binary_path(),
        "#!/bin/sh\ntrap '' TERM\nwhile true; do sleep 1; done\n",
    )
    .unwrap();

    let config = HoverflyConfig::local().resource_root(fixture.path());
    let mut hoverfly = Hoverfly::builder(config, HoverflyMode::Simulate)
        .runner(Arc::new(NativeRunner::new()))
        .admin_client(Arc::new(MockAdminClient::healthy()))
        .trust_installer(RecordingTrustInstaller::new())
        .network_configurator(RecordingNetworkConfigurator::new())
        .termination_grace(Duration::from_millis(300))
        .build();

    hoverfly.start().unwrap();
    let pid = hoverfly.pid().unwrap();

    hoverfly.close();

    assert!(!process_exists(pid));
    assert_eq!(hoverfly.state(), SupervisorState::Stopped);
}

#[test]
#[serial]
fn test_close_is_bounded_when_descendant_holds_output() {
    let fixture = ResourceFixture::new();
    fs::write(fixture.binary_path(), "#!/bin/sh\nsleep 6 &\nwait\n").unwrap();

    let config = HoverflyConfig::local().resource_root(fixture.path());
    let mut hoverfly = Hoverfly::builder(config, HoverflyMode::Simulate)
        .runner(Arc::new(NativeRunner::new()))
        .admin_client(Arc::new(MockAdminClient::healthy()))
        .trust_installer(RecordingTrustInstaller::new())
        .network_configurator(RecordingNetworkConfigurator::new())
        .termination_grace(Duration::from_millis(300))
        .build();

    hoverfly.start().unwrap();
    let pid = hoverfly.pid().unwrap();

    let started = Instant::now();
    hoverfly.close();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(3), "close took {elapsed:?}");
    assert!(!process_exists(pid));
    assert_eq!(hoverfly.state(), SupervisorState::Stopped);
}
