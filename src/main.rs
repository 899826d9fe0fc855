// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the dual-transport Modbus slave
use anyhow::Result;
use clap::Parser;
use log::{error, info};
use rust_dual_modbus::config::{self, Config};
use rust_dual_modbus::daemon::launch_daemon::Daemon;
use rust_dual_modbus::Transport;
use std::path::PathBuf;

/// Modbus slave switching between RTU and TCP at runtime
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Validate the configuration file and exit
    #[arg(long)]
    validate_config: bool,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Transport to run: disabled, rtu, tcp or auto (overrides the saved mode)
    #[arg(short, long)]
    mode: Option<Transport>,

    /// Modbus TCP port
    #[arg(long)]
    tcp_port: Option<u16>,

    /// Modbus TCP bind address
    #[arg(long)]
    tcp_address: Option<String>,

    /// Serial device of the RTU transport
    #[arg(long)]
    serial_device: Option<String>,

    /// Baud rate of the RTU transport
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Whether the network is up at start-up
    #[arg(long)]
    network_available: Option<bool>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else if args.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if args.show_config_schema {
        config::output_config_schema()?;
        return Ok(());
    }

    let mut config = Config::from_file(&args.config)?;
    if args.validate_config {
        println!("Configuration {} is valid", args.config.display());
        return Ok(());
    }

    config.apply_args(
        args.mode,
        args.tcp_port,
        args.tcp_address,
        args.serial_device,
        args.baud_rate,
        args.network_available,
    );

    info!(
        "Dual-transport Modbus slave {} starting",
        env!("CARGO_PKG_VERSION")
    );
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
    }

    info!("Shutdown requested");
    daemon.shutdown();
    daemon.join().await?;
    info!("Stopped");
    Ok(())
}
