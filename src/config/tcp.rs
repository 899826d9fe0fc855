// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server configuration
//!
//! This module defines the structures for configuring the Modbus TCP
//! transport of the dual-transport manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP transport.
///
/// # Fields
///
/// * `address` - Network address the server binds to (default: 0.0.0.0)
/// * `port` - TCP port number for the Modbus server (default: 502)
/// * `start_attempts` - Engine start attempts before giving up (default: 3)
/// * `retry_delay_ms` - Pause between start attempts (default: 1000)
///
/// # Example
///
/// ```
/// use rust_dual_modbus::config::TcpConfig;
///
/// let tcp_config = TcpConfig {
///     port: 5020,
///     address: "127.0.0.1".to_string(),
///     ..TcpConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// The network address the Modbus server will bind to.
    ///
    /// Can be an IPv4/IPv6 address or a hostname.
    /// Use "0.0.0.0" to bind to all IPv4 interfaces.
    pub address: String,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Default value is 502, which is the standard Modbus TCP port.
    pub port: u16,

    pub start_attempts: u32,

    pub retry_delay_ms: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 502,
            start_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl TcpConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
