// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Network status and mode persistence configuration

use serde::{Deserialize, Serialize};

/// Initial network state used when no WiFi collaborator feeds the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Report the network as connected from start-up.
    pub assume_available: bool,

    /// Address reported alongside the connected state.
    pub address: Option<String>,
}

/// Where the desired transport is saved between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// JSON file holding the `modbus_mode` key.
    pub mode_file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode_file: "modbus_mode.json".to_string(),
        }
    }
}
