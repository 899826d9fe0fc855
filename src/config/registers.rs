// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register map configuration

use serde::{Deserialize, Serialize};

use crate::registers::{RegisterBlock, RegisterLayout, RegisterSnapshot};

/// Layout of the register map and values loaded at start-up.
///
/// ```yaml
/// registers:
///   layout:
///     holding: { start: 0, size: 4000 }
///   initial_values:
///     - area: holding
///       start: 1000
///       values: [1, 2, 3]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistersConfig {
    pub layout: RegisterLayout,
    pub initial_values: Vec<RegisterBlock>,
}

impl RegistersConfig {
    /// Initial values as a snapshot ready to be loaded into the store.
    pub fn initial_snapshot(&self) -> RegisterSnapshot {
        self.initial_values.iter().cloned().collect()
    }
}
