// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::config::TcpConfig;
use crate::modbus::mock::{MockEngine, MockHandle};
use crate::network::SharedNetworkStatus;
use crate::registers::{RegisterArea, RegisterLayout};
use crate::transport::{RtuAdapter, TcpAdapter};

struct Harness {
    manager: ModbusManager,
    rtu: MockHandle,
    tcp: MockHandle,
    network: SharedNetworkStatus,
}

fn test_config() -> ManagerConfig {
    ManagerConfig {
        settle_delay_ms: 10,
        retry_backoff_ms: 200,
        ..ManagerConfig::default()
    }
}

fn builder(network_up: bool) -> (ManagerBuilder, MockHandle, MockHandle, SharedNetworkStatus) {
    let network = if network_up {
        SharedNetworkStatus::new(true, Some("192.168.1.20".to_string()))
    } else {
        SharedNetworkStatus::new(false, None)
    };
    let store = RegisterStore::new(RegisterLayout::default());
    let (rtu_engine, rtu) = MockEngine::new();
    let (tcp_engine, tcp) = MockEngine::new();
    let rtu_adapter = RtuAdapter::new(Box::new(rtu_engine), store.layout());
    let tcp_config = TcpConfig {
        retry_delay_ms: 10,
        ..TcpConfig::default()
    };
    let tcp_adapter = TcpAdapter::new(
        Box::new(tcp_engine),
        Arc::new(network.clone()),
        &tcp_config,
        store.layout(),
    );
    let builder = ModbusManager::builder(
        store,
        Box::new(rtu_adapter),
        Box::new(tcp_adapter),
        Arc::new(network.clone()),
    )
    .config(test_config());
    (builder, rtu, tcp, network)
}

fn harness(initial: Transport, network_up: bool) -> Harness {
    let (builder, rtu, tcp, network) = builder(network_up);
    Harness {
        manager: builder.initial_mode(initial).build(),
        rtu,
        tcp,
        network,
    }
}

/// Harness already past initialization and running `initial`.
async fn running(initial: Transport, network_up: bool) -> Harness {
    let h = harness(initial, network_up);
    h.manager.tick().await;
    h.manager.tick().await;
    h
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_initializes_then_starts_rtu() {
    let h = harness(Transport::Rtu, false);
    assert_eq!(h.manager.get_state(), ManagerState::Initializing);

    assert_eq!(h.manager.tick().await, ManagerState::Idle);
    assert!(!h.rtu.is_running());

    assert_eq!(h.manager.tick().await, ManagerState::RunningRtu);
    assert!(h.rtu.is_running());
    assert!(!h.tcp.is_running());
    assert_eq!(h.manager.get_mode(), Transport::Rtu);
}

#[tokio::test(start_paused = true)]
async fn test_without_saved_mode_nothing_starts() {
    let (builder, rtu, tcp, _network) = builder(true);
    let manager = builder.build();
    assert_eq!(manager.desired_mode(), Transport::Disabled);

    manager.tick().await;
    assert_eq!(manager.tick().await, ManagerState::Idle);
    assert_eq!(rtu.start_calls() + tcp.start_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tcp_without_network_keeps_rtu_running() {
    let h = running(Transport::Rtu, false).await;

    h.manager.switch_mode(Transport::Tcp).unwrap();
    assert_eq!(h.manager.tick().await, ManagerState::Error);

    let status = h.manager.get_status();
    assert_eq!(status.mode, Transport::Rtu);
    assert_eq!(status.last_error.as_deref(), Some("network_unavailable"));
    assert!(status.last_error_at.is_some());
    assert!(h.rtu.is_running());
    assert_eq!(h.tcp.start_calls(), 0);
    assert_eq!(h.rtu.stop_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_register_values_survive_round_trip_switch() {
    let h = harness(Transport::Rtu, true);
    h.manager
        .store()
        .write(RegisterArea::Holding, 0, &[42])
        .unwrap();
    h.manager.tick().await;
    h.manager.tick().await;

    // A master writes through the RTU bank
    let rtu_bank = h.rtu.registers().unwrap();
    assert_eq!(rtu_bank.read(RegisterArea::Holding, 0, 1).unwrap(), vec![42]);
    rtu_bank.write(RegisterArea::Holding, 1, &[7]).unwrap();

    h.manager.switch_mode(Transport::Tcp).unwrap();
    assert_eq!(h.manager.tick().await, ManagerState::RunningTcp);
    assert!(!h.rtu.is_running());
    let tcp_bank = h.tcp.registers().unwrap();
    assert_eq!(
        tcp_bank.read(RegisterArea::Holding, 0, 2).unwrap(),
        vec![42, 7]
    );
    tcp_bank.write(RegisterArea::Holding, 2, &[99]).unwrap();

    h.manager.switch_mode(Transport::Rtu).unwrap();
    assert_eq!(h.manager.tick().await, ManagerState::RunningRtu);
    assert!(!h.tcp.is_running());
    assert_eq!(
        h.manager.store().read(RegisterArea::Holding, 0, 3).unwrap(),
        vec![42, 7, 99]
    );
    assert_eq!(
        rtu_bank.read(RegisterArea::Holding, 0, 3).unwrap(),
        vec![42, 7, 99]
    );
}

#[tokio::test(start_paused = true)]
async fn test_recovery_stops_after_max_retries() {
    let h = harness(Transport::Rtu, false);
    h.rtu.fail_next_starts(100);
    h.manager.tick().await;

    assert_eq!(h.manager.tick().await, ManagerState::Error);
    assert_eq!(h.manager.get_status().error_count, 1);

    // Still inside the backoff window
    assert_eq!(h.manager.tick().await, ManagerState::Error);
    assert_eq!(h.rtu.start_calls(), 1);

    for expected in 2..=3 {
        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(h.manager.tick().await, ManagerState::Idle);
        assert_eq!(h.manager.tick().await, ManagerState::Error);
        assert_eq!(h.manager.get_status().error_count, expected);
    }

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(h.manager.tick().await, ManagerState::Error);
    assert_eq!(h.manager.tick().await, ManagerState::Error);
    assert_eq!(h.rtu.start_calls(), 3);

    // An explicit request re-arms the supervisor
    h.rtu.fail_next_starts(0);
    h.manager.switch_mode(Transport::Rtu).unwrap();
    assert_eq!(h.manager.tick().await, ManagerState::RunningRtu);
    assert_eq!(h.manager.get_status().error_count, 0);
    assert_eq!(h.manager.get_status().last_error, None);
}

#[tokio::test(start_paused = true)]
async fn test_failed_tcp_start_recovers_on_rtu() {
    let h = running(Transport::Rtu, true).await;
    h.tcp.fail_next_starts(3);

    h.manager.switch_mode(Transport::Tcp).unwrap();
    assert_eq!(h.manager.tick().await, ManagerState::Error);
    let status = h.manager.get_status();
    assert_eq!(status.mode, Transport::Disabled);
    assert_eq!(status.last_error.as_deref(), Some("transition_failed"));
    assert_eq!(h.tcp.start_calls(), 3);
    assert!(!h.rtu.is_running());

    tokio::time::advance(Duration::from_millis(200)).await;
    h.manager.tick().await;
    assert_eq!(h.manager.tick().await, ManagerState::RunningRtu);
    assert_eq!(h.manager.desired_mode(), Transport::Rtu);
}

#[tokio::test(start_paused = true)]
async fn test_auto_falls_back_and_upgrades() {
    let h = running(Transport::Auto, true).await;
    assert_eq!(h.manager.get_state(), ManagerState::RunningTcp);

    h.network.set_disconnected();
    assert_eq!(h.manager.tick().await, ManagerState::RunningTcp);
    assert!(!h.manager.get_status().wifi_available);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(h.manager.tick().await, ManagerState::RunningRtu);
    assert!(!h.tcp.is_running());
    assert!(h.rtu.is_running());
    assert_eq!(h.manager.desired_mode(), Transport::Auto);

    h.network.set_connected("192.168.1.21");
    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(h.manager.tick().await, ManagerState::RunningTcp);
    assert!(!h.rtu.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_auto_without_network_starts_rtu() {
    let h = running(Transport::Auto, false).await;
    assert_eq!(h.manager.get_state(), ManagerState::RunningRtu);
    assert_eq!(h.tcp.start_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_stops_both_transports() {
    let h = running(Transport::Tcp, true).await;

    h.manager.switch_mode(Transport::Disabled).unwrap();
    assert_eq!(h.manager.tick().await, ManagerState::Idle);
    assert_eq!(h.manager.get_mode(), Transport::Disabled);
    assert!(!h.rtu.is_running());
    assert!(!h.tcp.is_running());
    assert_eq!(h.manager.get_status().uptime_seconds, 0);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_overrides_transition_in_flight() {
    let h = harness(Transport::Rtu, false);
    h.rtu.set_start_delay(Duration::from_secs(1));
    h.manager.tick().await;

    let worker = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.tick().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.manager.get_state(), ManagerState::Switching);
    assert_eq!(
        h.manager.force_sync().await,
        Err(ManagerError::TransitionInProgress)
    );

    h.manager.emergency_stop().await.unwrap();
    worker.await.unwrap();

    assert_eq!(h.manager.get_state(), ManagerState::Idle);
    assert_eq!(h.manager.get_mode(), Transport::Disabled);
    assert_eq!(h.manager.desired_mode(), Transport::Disabled);
    assert!(!h.rtu.is_running());
    assert!(!h.tcp.is_running());

    // Nothing restarts afterwards
    assert_eq!(h.manager.tick().await, ManagerState::Idle);
    assert_eq!(h.rtu.start_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_sync_needs_a_running_transport() {
    let h = harness(Transport::Disabled, false);
    assert_eq!(h.manager.force_sync().await, Err(ManagerError::NotInitialized));

    h.manager.tick().await;
    assert_eq!(h.manager.force_sync().await, Err(ManagerError::NotRunning));
    assert_eq!(
        h.manager.force_critical_sync().await,
        Err(ManagerError::NotRunning)
    );

    h.manager.switch_mode(Transport::Rtu).unwrap();
    h.manager.tick().await;
    h.rtu
        .registers()
        .unwrap()
        .write(RegisterArea::Holding, 1000, &[5])
        .unwrap();
    let report = h.manager.force_critical_sync().await.unwrap();
    assert_eq!(report.copied, 1);
    assert_eq!(
        h.manager.store().read(RegisterArea::Holding, 1000, 1).unwrap(),
        vec![5]
    );
    assert_eq!(h.manager.get_status().sync_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_sync_mirrors_to_standby() {
    let h = running(Transport::Rtu, false).await;
    h.rtu
        .registers()
        .unwrap()
        .write(RegisterArea::Holding, 3, &[9])
        .unwrap();

    tokio::time::advance(Duration::from_secs(1)).await;
    h.manager.tick().await;

    assert_eq!(
        h.manager.store().read(RegisterArea::Holding, 3, 1).unwrap(),
        vec![9]
    );
    let status = h.manager.get_status();
    assert_eq!(status.sync_count, 1);
    assert_eq!(status.sync_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_mode_change_callback_sees_each_transition() {
    let h = harness(Transport::Rtu, true);
    let seen = Arc::new(Mutex::new(Vec::new()));
    h.manager.set_mode_change_callback({
        let seen = seen.clone();
        move |old, new| seen.lock().unwrap().push((old, new))
    });

    h.manager.tick().await;
    h.manager.tick().await;
    h.manager.switch_mode(Transport::Tcp).unwrap();
    h.manager.tick().await;
    h.manager.emergency_stop().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (Transport::Disabled, Transport::Rtu),
            (Transport::Rtu, Transport::Tcp),
            (Transport::Tcp, Transport::Disabled),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_desired_mode_is_saved_and_restored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modbus_mode.json");

    let (builder, _rtu, _tcp, _network) = self::builder(true);
    let manager = builder
        .persistence(Arc::new(JsonModeFile::new(&path)))
        .build();
    // Missing file falls back to RTU
    assert_eq!(manager.desired_mode(), Transport::Rtu);

    manager.tick().await;
    manager.tick().await;
    manager.switch_mode(Transport::Tcp).unwrap();
    assert_eq!(manager.tick().await, ManagerState::RunningTcp);
    assert_eq!(JsonModeFile::new(&path).read_desired_mode(), Transport::Tcp);

    let (builder, _rtu, _tcp, _network) = self::builder(true);
    let restored = builder
        .persistence(Arc::new(JsonModeFile::new(&path)))
        .build();
    assert_eq!(restored.desired_mode(), Transport::Tcp);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_engine_stop_is_an_error() {
    let h = running(Transport::Rtu, false).await;
    h.rtu.record_messages(4);
    h.manager.tick().await;
    assert_eq!(h.manager.get_status().rtu_message_count, 4);

    h.rtu.crash();
    assert_eq!(h.manager.tick().await, ManagerState::Error);
    assert_eq!(h.manager.get_mode(), Transport::Disabled);

    tokio::time::advance(Duration::from_millis(200)).await;
    h.manager.tick().await;
    assert_eq!(h.manager.tick().await, ManagerState::RunningRtu);
    assert_eq!(h.rtu.start_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_streak_ends_when_transport_resumes() {
    let h = running(Transport::Rtu, false).await;
    h.manager.switch_mode(Transport::Tcp).unwrap();
    assert_eq!(h.manager.tick().await, ManagerState::Error);
    assert_eq!(h.manager.get_status().error_count, 1);

    tokio::time::advance(Duration::from_millis(200)).await;
    h.manager.tick().await;
    assert_eq!(h.manager.tick().await, ManagerState::RunningRtu);
    let status = h.manager.get_status();
    assert_eq!(status.error_count, 0);
    assert_eq!(status.last_error, None);
    assert_eq!(status.last_error_at, None);
    assert_eq!(h.rtu.start_calls(), 1);

    // A later unrelated failure starts a fresh streak
    h.rtu.crash();
    assert_eq!(h.manager.tick().await, ManagerState::Error);
    assert_eq!(h.manager.get_status().error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_reports_tcp_listener() {
    let h = running(Transport::Tcp, true).await;
    let status = h.manager.get_status();
    assert_eq!(status.tcp_listen_port, Some(1502));
    assert!(status.is_running);
    assert!(status.wifi_available);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_stops_transports_on_exit() {
    let h = harness(Transport::Rtu, false);
    let flag = Arc::new(AtomicBool::new(true));
    let worker = tokio::spawn({
        let manager = h.manager.clone();
        let flag = flag.clone();
        async move { manager.run(flag).await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.rtu.is_running());

    flag.store(false, Ordering::SeqCst);
    worker.await.unwrap();
    assert!(!h.rtu.is_running());
    assert_eq!(h.manager.get_state(), ManagerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_switch_mode_str_rejects_unknown_names() {
    let h = harness(Transport::Disabled, false);
    assert!(matches!(
        h.manager.switch_mode_str("serial"),
        Err(ManagerError::InvalidArgument(_))
    ));
    h.manager.switch_mode_str(" TCP ").unwrap();
    assert_eq!(h.manager.desired_mode(), Transport::Tcp);
}

#[tokio::test(start_paused = true)]
async fn test_reconfigure_validates_before_applying() {
    let h = harness(Transport::Disabled, false);
    let bad = ManagerConfig {
        sync_interval_ms: 0,
        ..test_config()
    };
    assert!(matches!(
        h.manager.reconfigure(bad).await,
        Err(ManagerError::InvalidArgument(_))
    ));

    let out_of_map = ManagerConfig {
        critical_ranges: vec![crate::registers::RegisterRange::new(
            RegisterArea::Holding,
            3990,
            32,
        )],
        ..test_config()
    };
    assert!(h.manager.reconfigure(out_of_map).await.is_err());

    let good = ManagerConfig {
        sync_interval_ms: 250,
        ..test_config()
    };
    h.manager.reconfigure(good).await.unwrap();
}
