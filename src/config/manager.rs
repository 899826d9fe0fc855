// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mode supervisor configuration
//!
//! Timing and policy parameters of the dual-transport manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registers::{RegisterArea, RegisterRange};

/// Configuration for the mode supervisor.
///
/// # Example
///
/// ```
/// use rust_dual_modbus::config::ManagerConfig;
///
/// let config = ManagerConfig {
///     sync_interval_ms: 250,
///     auto_fallback_enabled: false,
///     ..ManagerConfig::default()
/// };
/// assert_eq!(config.max_retry_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Period of the register synchronization cycle while a transport runs.
    pub sync_interval_ms: u64,

    /// Period of the network availability check under the `auto` policy.
    pub wifi_check_interval_ms: u64,

    /// Fall back from TCP to RTU when the network is lost under `auto`.
    pub auto_fallback_enabled: bool,

    /// Run the periodic synchronization cycle.
    pub register_sync_enabled: bool,

    /// Consecutive transition failures tolerated before automatic recovery stops.
    pub max_retry_attempts: u32,

    /// Period of the supervisor worker loop.
    pub poll_interval_ms: u64,

    /// Pause between stopping a transport and starting the next one.
    pub settle_delay_ms: u64,

    /// Delay after a failure before the supervisor retries on RTU.
    pub retry_backoff_ms: u64,

    /// Longest wait for the adapter lock on an out-of-band synchronization.
    pub lock_timeout_ms: u64,

    /// Save the desired mode after every successful transition.
    pub persist_mode_changes: bool,

    /// Ranges copied by the critical-only synchronization pass.
    pub critical_ranges: Vec<RegisterRange>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 1000,
            wifi_check_interval_ms: 5000,
            auto_fallback_enabled: true,
            register_sync_enabled: true,
            max_retry_attempts: 3,
            poll_interval_ms: 100,
            settle_delay_ms: 500,
            retry_backoff_ms: 5000,
            lock_timeout_ms: 1000,
            persist_mode_changes: true,
            critical_ranges: vec![RegisterRange::new(RegisterArea::Holding, 1000, 16)],
        }
    }
}

impl ManagerConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn wifi_check_interval(&self) -> Duration {
        Duration::from_millis(self.wifi_check_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
