// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Supervisor state and control fields

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use super::ManagerError;
use crate::config::ManagerConfig;
use crate::transport::{ConnectionInfo, Transport};

/// State of the mode supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// Constructed, waiting for the first supervisor tick
    Initializing,
    /// No transport running
    Idle,
    RunningRtu,
    RunningTcp,
    /// A transition is being carried out
    Switching,
    /// The last transition failed; recovery may be pending
    Error,
}

impl ManagerState {
    /// Steady state matching a running transport.
    pub fn running(transport: Transport) -> Self {
        match transport {
            Transport::Rtu => ManagerState::RunningRtu,
            Transport::Tcp => ManagerState::RunningTcp,
            Transport::Disabled | Transport::Auto => ManagerState::Idle,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, ManagerState::RunningRtu | ManagerState::RunningTcp)
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Initializing => "initializing",
            ManagerState::Idle => "idle",
            ManagerState::RunningRtu => "running_rtu",
            ManagerState::RunningTcp => "running_tcp",
            ManagerState::Switching => "switching",
            ManagerState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Traffic figures cached by the worker for status queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ConnectionCache {
    pub rtu_message_count: u64,
    pub tcp_connection_count: usize,
    pub tcp_listen_port: Option<u16>,
}

impl ConnectionCache {
    pub fn update(&mut self, info: ConnectionInfo) {
        match info {
            ConnectionInfo::Rtu { message_count } => self.rtu_message_count = message_count,
            ConnectionInfo::Tcp {
                active_connections,
                listen_port,
            } => {
                self.tcp_connection_count = active_connections;
                self.tcp_listen_port = listen_port;
            }
        }
    }
}

/// Every field the supervisor, the status reporter and the public handle
/// share. Guarded by a single mutex that is never held across an `.await`.
#[derive(Debug)]
pub(crate) struct ControlBlock {
    pub config: ManagerConfig,
    pub state: ManagerState,
    pub current_mode: Transport,
    pub desired_mode: Transport,
    /// An explicit `switch_mode` is waiting for the worker
    pub switch_requested: bool,
    /// Consecutive failed transitions
    pub error_count: u32,
    pub last_error: Option<ManagerError>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub failed_at: Option<Instant>,
    pub uptime_start: Option<Instant>,
    pub last_sync: Option<Instant>,
    pub last_wifi_check: Option<Instant>,
    pub wifi_available: bool,
    /// Bumped by an emergency stop so in-flight transitions discard their result
    pub epoch: u64,
    pub sync_count: u64,
    pub sync_failures: u64,
    pub connections: ConnectionCache,
}

impl ControlBlock {
    pub fn new(config: ManagerConfig, desired_mode: Transport) -> Self {
        Self {
            config,
            state: ManagerState::Initializing,
            current_mode: Transport::Disabled,
            desired_mode,
            switch_requested: false,
            error_count: 0,
            last_error: None,
            last_error_at: None,
            failed_at: None,
            uptime_start: None,
            last_sync: None,
            last_wifi_check: None,
            wifi_available: false,
            epoch: 0,
            sync_count: 0,
            sync_failures: 0,
            connections: ConnectionCache::default(),
        }
    }

    /// Record a failed transition.
    pub fn record_failure(&mut self, current_mode: Transport, error: ManagerError) {
        self.current_mode = current_mode;
        self.state = ManagerState::Error;
        self.error_count += 1;
        self.last_error = Some(error);
        self.last_error_at = Some(Utc::now());
        self.failed_at = Some(Instant::now());
        if !current_mode.is_active() {
            self.uptime_start = None;
        }
    }

    /// Record a completed transition to `mode`.
    pub fn record_success(&mut self, mode: Transport) {
        let now = Instant::now();
        self.current_mode = mode;
        self.state = ManagerState::running(mode);
        self.uptime_start = mode.is_active().then_some(now);
        self.error_count = 0;
        self.last_error = None;
        self.last_error_at = None;
        self.failed_at = None;
        self.last_sync = Some(now);
        self.last_wifi_check = Some(now);
    }

    /// Return to the running state of a transport that survived a failure.
    ///
    /// The failure streak ends here, so the error fields clear as on a
    /// completed transition. Uptime keeps counting from the original start.
    pub fn record_resume(&mut self, now: Instant) {
        self.state = ManagerState::running(self.current_mode);
        if self.current_mode.is_active() && self.uptime_start.is_none() {
            self.uptime_start = Some(now);
        }
        self.error_count = 0;
        self.last_error = None;
        self.last_error_at = None;
        self.failed_at = None;
        self.last_sync = Some(now);
        self.last_wifi_check = Some(now);
    }

    pub fn uptime_seconds(&self) -> u64 {
        match self.uptime_start {
            Some(start) if self.state.is_running() => start.elapsed().as_secs(),
            _ => 0,
        }
    }
}
