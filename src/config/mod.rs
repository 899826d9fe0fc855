// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the dual-transport Modbus slave
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! The configuration is organized as a nested structure with sections:
//! - `mode`: Optional transport forced at start-up, overriding the saved mode
//! - `manager`: Timing and policy of the mode supervisor
//! - `rtu`: Serial line settings for the RTU transport
//! - `tcp`: Listener settings for the TCP transport
//! - `registers`: Register layout and initial values
//! - `network`: Initial network state when no WiFi collaborator is present
//! - `persistence`: File where the desired mode is saved
//!
//! ## Usage
//!
//! ```no_run
//! use rust_dual_modbus::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     None,                           // Mode
//!     Some(5020),                     // TCP port
//!     Some("0.0.0.0".to_string()),    // TCP address
//!     Some("/dev/ttyS1".to_string()), // Serial device
//!     Some(19200),                    // Baud rate
//!     Some(true),                     // Network available
//! );
//!
//! println!("TCP port: {}", config.tcp.port);
//! ```

pub mod manager;
pub mod network;
pub mod registers;
pub mod rtu;
pub mod tcp;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::transport::Transport;

pub use manager::ManagerConfig;
pub use network::{NetworkConfig, PersistenceConfig};
pub use registers::RegistersConfig;
pub use rtu::RtuConfig;
pub use tcp::TcpConfig;
pub use utils::{is_valid_ip_address, output_config_schema};

/// Root configuration structure.
///
/// # Structure
///
/// The configuration is designed to be deserialized from and serialized to YAML
/// using the serde framework. The structure is validated against a JSON schema
/// to ensure all fields have valid values.
///
/// # Default Values
///
/// Each section uses default values when not explicitly specified in the configuration
/// file, allowing for minimal configuration when custom settings are not required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Transport requested at start-up.
    ///
    /// When absent, the mode saved by the previous run is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Transport>,

    /// Mode supervisor settings.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Serial line of the RTU transport.
    #[serde(default)]
    pub rtu: RtuConfig,

    /// Listener of the TCP transport.
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Register layout and initial values of the canonical map.
    #[serde(default)]
    pub registers: RegistersConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file that fails
    /// schema or rule validation is rejected, and a sample file with default
    /// values is written next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values explicitly provided override the existing configuration.
    ///
    /// # Parameters
    ///
    /// * `mode` - Transport to request at start-up
    /// * `tcp_port` - TCP port for the Modbus TCP server
    /// * `tcp_address` - Network address for the Modbus TCP server to bind to
    /// * `serial_device` - Serial device of the RTU transport
    /// * `baud_rate` - Line speed of the RTU transport
    /// * `network_available` - Initial network state
    pub fn apply_args(
        &mut self,
        mode: Option<Transport>,
        tcp_port: Option<u16>,
        tcp_address: Option<String>,
        serial_device: Option<String>,
        baud_rate: Option<u32>,
        network_available: Option<bool>,
    ) {
        if let Some(mode) = mode {
            debug!("Overriding mode from command line: {}", mode);
            self.mode = Some(mode);
        }
        if let Some(port) = tcp_port {
            debug!("Overriding Modbus TCP port from command line: {}", port);
            self.tcp.port = port;
        }
        if let Some(address) = tcp_address {
            debug!("Overriding Modbus TCP address from command line: {}", address);
            self.tcp.address = address;
        }
        if let Some(device) = serial_device {
            debug!("Overriding serial device from command line: {}", device);
            self.rtu.device = device;
        }
        if let Some(baud_rate) = baud_rate {
            debug!("Overriding baud rate from command line: {}", baud_rate);
            self.rtu.baud_rate = baud_rate;
        }
        if let Some(available) = network_available {
            debug!("Overriding network availability from command line: {}", available);
            self.network.assume_available = available;
        }
    }
}
