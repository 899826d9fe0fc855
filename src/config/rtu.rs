// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus RTU serial line configuration

use serde::{Deserialize, Serialize};

/// Settings of the serial line used by the RTU transport.
///
/// # Fields
///
/// * `device` - Path of the serial device (default: `/dev/ttyUSB0`)
/// * `baud_rate` - Line speed in bits per second (default: 9600)
/// * `data_bits` - 5 to 8 (default: 8)
/// * `parity` - `none`, `even` or `odd` (default: `none`)
/// * `stop_bits` - 1 or 2 (default: 1)
/// * `slave_id` - Modbus unit identifier, 1 to 247 (default: 1)
/// * `timeout_ms` - Serial read timeout (default: 1000)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtuConfig {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: String,
    pub stop_bits: u8,
    pub slave_id: u8,
    pub timeout_ms: u64,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            parity: "none".to_string(),
            stop_bits: 1,
            slave_id: 1,
            timeout_ms: 1000,
        }
    }
}
