// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::Config;
use crate::registers::RegisterArea;

/// Baud rates accepted for the RTU serial line
const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./rust_dual_modbus --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Intervals**: the poll, sync and network check intervals are non-zero
/// - **Retries**: the TCP transport makes at least one start attempt
/// - **TCP listener**: the port is within 1-65534 and the address is an IP address or special value
/// - **Serial line**: the baud rate is a standard rate and the slave id is within 1-247
/// - **Layout**: every area of the register layout fits the 16-bit address space
/// - **Critical ranges** and **initial values** lie inside the layout
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let manager = &config.manager;
    if manager.poll_interval_ms == 0 {
        anyhow::bail!("manager.poll_interval_ms must be greater than zero");
    }
    if manager.sync_interval_ms == 0 {
        anyhow::bail!("manager.sync_interval_ms must be greater than zero");
    }
    if manager.wifi_check_interval_ms == 0 {
        anyhow::bail!("manager.wifi_check_interval_ms must be greater than zero");
    }

    if config.tcp.start_attempts == 0 {
        anyhow::bail!("tcp.start_attempts must be at least 1");
    }
    if config.tcp.port < 1 || config.tcp.port > 65534 {
        anyhow::bail!("Invalid port number: {}", config.tcp.port);
    }
    if !is_valid_ip_address(&config.tcp.address) {
        // Hostnames are resolved at bind time
        warn!(
            "Potentially invalid address format: {}",
            config.tcp.address
        );
    }

    if !SUPPORTED_BAUD_RATES.contains(&config.rtu.baud_rate) {
        anyhow::bail!("Unsupported baud rate: {}", config.rtu.baud_rate);
    }
    if !(1..=247).contains(&config.rtu.slave_id) {
        anyhow::bail!("Invalid Modbus slave id: {}", config.rtu.slave_id);
    }
    if config.rtu.device.is_empty() {
        anyhow::bail!("rtu.device must not be empty");
    }

    let layout = &config.registers.layout;
    for area in RegisterArea::ALL {
        let spec = layout.spec(area);
        if spec.end() > u32::from(u16::MAX) + 1 {
            anyhow::bail!(
                "The {} area ({} registers from {}) exceeds the Modbus address space",
                area,
                spec.size,
                spec.start
            );
        }
    }

    for range in &manager.critical_ranges {
        if !range.fits(layout) {
            anyhow::bail!(
                "Critical range of {} {} register(s) at {} is outside the register layout",
                range.count,
                range.area,
                range.start
            );
        }
    }

    for block in &config.registers.initial_values {
        if !layout
            .spec(block.area)
            .contains(block.start, block.values.len())
        {
            anyhow::bail!(
                "Initial values for {} {} register(s) at {} are outside the register layout",
                block.values.len(),
                block.area,
                block.start
            );
        }
    }

    Ok(())
}
