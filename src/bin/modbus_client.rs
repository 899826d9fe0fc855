// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use clap::Parser;
use rust_dual_modbus::RegisterArea;
use tokio::time::Duration;
use tokio_modbus::prelude::*;

/// Modbus master for checking a dual-transport slave over TCP or RTU
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address (TCP)
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port (TCP)
    #[clap(long, default_value = "502")]
    port: u16,

    /// Serial device; when set, RTU is used instead of TCP
    #[clap(long)]
    serial: Option<String>,

    /// Baud rate of the serial device
    #[clap(long, default_value = "9600")]
    baud_rate: u32,

    /// Slave id
    #[clap(long, default_value = "1")]
    slave: u8,

    /// Register area: holding, input, coil or discrete
    #[clap(long, default_value = "holding")]
    area: String,

    /// Starting address
    #[clap(long, default_value = "0")]
    start: u16,

    /// Number of registers to read
    #[clap(long, default_value = "8")]
    quantity: u16,

    /// Values to write at the starting address before reading back
    #[clap(long, value_delimiter = ',')]
    write: Vec<u16>,
}

fn parse_area(name: &str) -> Result<RegisterArea> {
    match name.to_ascii_lowercase().as_str() {
        "holding" => Ok(RegisterArea::Holding),
        "input" => Ok(RegisterArea::Input),
        "coil" | "coils" => Ok(RegisterArea::Coil),
        "discrete" => Ok(RegisterArea::Discrete),
        other => anyhow::bail!("unknown register area: {}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    let area = parse_area(&args.area)?;
    let slave = Slave(args.slave);

    let mut ctx = match &args.serial {
        Some(device) => {
            println!("Opening {} at {} baud", device, args.baud_rate);
            let builder = tokio_serial::new(device, args.baud_rate);
            let serial = tokio_serial::SerialStream::open(&builder)
                .with_context(|| format!("Failed to open {}", device))?;
            rtu::attach_slave(serial, slave)
        }
        None => {
            let socket_addr = format!("{}:{}", args.address, args.port)
                .parse::<std::net::SocketAddr>()
                .with_context(|| format!("Invalid server address {}", args.address))?;
            println!("Connecting to Modbus server at {}", socket_addr);
            tcp::connect_slave(socket_addr, slave).await?
        }
    };

    if !args.write.is_empty() {
        println!("Writing {:?} at {} {}", args.write, area, args.start);
        match area {
            RegisterArea::Holding => {
                ctx.write_multiple_registers(args.start, &args.write).await??
            }
            RegisterArea::Coil => {
                let bits: Vec<bool> = args.write.iter().map(|v| *v != 0).collect();
                ctx.write_multiple_coils(args.start, &bits).await??
            }
            RegisterArea::Input | RegisterArea::Discrete => {
                anyhow::bail!("{} registers are read-only for a master", area)
            }
        }
    }

    println!(
        "Reading {} {} register(s) starting at address {}",
        args.quantity, area, args.start
    );
    let values: Vec<u16> = tokio::time::timeout(Duration::from_secs(2), async {
        let values = match area {
            RegisterArea::Holding => {
                ctx.read_holding_registers(args.start, args.quantity)
                    .await??
            }
            RegisterArea::Input => ctx.read_input_registers(args.start, args.quantity).await??,
            RegisterArea::Coil => ctx
                .read_coils(args.start, args.quantity)
                .await??
                .into_iter()
                .map(u16::from)
                .collect(),
            RegisterArea::Discrete => ctx
                .read_discrete_inputs(args.start, args.quantity)
                .await??
                .into_iter()
                .map(u16::from)
                .collect(),
        };
        Ok::<_, anyhow::Error>(values)
    })
    .await
    .context("Request timed out")??;

    for (i, value) in values.iter().enumerate() {
        println!("{} {}: {}", area, usize::from(args.start) + i, value);
    }

    Ok(())
}
