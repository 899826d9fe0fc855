// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Status reporting
//!
//! [`ManagerStatus`] is a read-only projection of the control block. It is
//! computed under the control lock only, never waits for the adapters, and
//! serializes to JSON with camelCase keys:
//!
//! ```json
//! {
//!   "mode": "tcp",
//!   "desiredMode": "auto",
//!   "state": "running_tcp",
//!   "isRunning": true,
//!   "wifiAvailable": true,
//!   "uptimeSeconds": 42,
//!   "rtuMessageCount": 0,
//!   "tcpConnectionCount": 1,
//!   "tcpListenPort": 502,
//!   "lastError": null,
//!   "lastErrorDescription": null,
//!   "lastErrorAt": null,
//!   "errorCount": 0,
//!   "syncCount": 12,
//!   "syncFailures": 0
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::{ControlBlock, ManagerState};
use crate::transport::Transport;

/// Snapshot of the manager for external consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    /// Transport currently active (`disabled` when none)
    pub mode: Transport,
    pub desired_mode: Transport,
    pub state: ManagerState,
    pub is_running: bool,
    pub wifi_available: bool,
    /// Seconds since the last successful transition, 0 when not running
    pub uptime_seconds: u64,
    pub rtu_message_count: u64,
    pub tcp_connection_count: usize,
    pub tcp_listen_port: Option<u16>,
    pub last_error: Option<String>,
    pub last_error_description: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Consecutive failed transitions
    pub error_count: u32,
    pub sync_count: u64,
    pub sync_failures: u64,
}

impl ManagerStatus {
    pub(crate) fn from_control(control: &ControlBlock) -> Self {
        Self {
            mode: control.current_mode,
            desired_mode: control.desired_mode,
            state: control.state,
            is_running: control.state.is_running(),
            wifi_available: control.wifi_available,
            uptime_seconds: control.uptime_seconds(),
            rtu_message_count: control.connections.rtu_message_count,
            tcp_connection_count: control.connections.tcp_connection_count,
            tcp_listen_port: control.connections.tcp_listen_port,
            last_error: control.last_error.as_ref().map(|e| e.code().to_string()),
            last_error_description: control.last_error.as_ref().map(|e| e.to_string()),
            last_error_at: control.last_error_at,
            error_count: control.error_count,
            sync_count: control.sync_count,
            sync_failures: control.sync_failures,
        }
    }
}
