// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the Modbus TCP server engine
//!
//! These tests start a real engine on a free local port and talk to it with
//! the tokio-modbus TCP client.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time;
use tokio_modbus::prelude::*;
use tokio_modbus::ExceptionCode;

use rust_dual_modbus::modbus::{LocalRegisters, ModbusEngine, TcpServerEngine};
use rust_dual_modbus::registers::{AreaSpec, RegisterArea, RegisterLayout};

fn small_layout() -> RegisterLayout {
    RegisterLayout {
        holding: AreaSpec::new(0, 100),
        input: AreaSpec::new(0, 10),
        coil: AreaSpec::new(0, 16),
        discrete: AreaSpec::new(0, 16),
    }
}

/// Start an engine on 127.0.0.1 with an OS-assigned port
async fn start_test_engine(
    registers: LocalRegisters,
) -> Result<(TcpServerEngine, SocketAddr), Box<dyn std::error::Error>> {
    let mut engine = TcpServerEngine::new("127.0.0.1", 0);
    engine.start(registers).await?;
    let port = engine.local_port().ok_or("engine did not report its port")?;
    let socket_addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Test engine started on: {}", socket_addr);
    Ok((engine, socket_addr))
}

#[tokio::test]
async fn test_read_holding_registers() -> Result<(), Box<dyn std::error::Error>> {
    let registers = LocalRegisters::new(small_layout());
    registers.write(RegisterArea::Holding, 0, &[10, 20, 30, 40])?;
    let (mut engine, socket_addr) = start_test_engine(registers).await?;

    let mut ctx = tcp::connect(socket_addr).await?;
    let data = ctx.read_holding_registers(0, 4).await??;
    assert_eq!(data, vec![10, 20, 30, 40]);

    ctx.disconnect().await?;
    engine.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_master_writes_reach_the_local_bank() -> Result<(), Box<dyn std::error::Error>> {
    let registers = LocalRegisters::new(small_layout());
    let (mut engine, socket_addr) = start_test_engine(registers.clone()).await?;

    let mut ctx = tcp::connect(socket_addr).await?;
    ctx.write_single_register(2, 999).await??;
    ctx.write_multiple_registers(10, &[101, 202, 303]).await??;
    ctx.write_single_coil(3, true).await??;

    assert_eq!(registers.read(RegisterArea::Holding, 2, 1)?, vec![999]);
    assert_eq!(
        registers.read(RegisterArea::Holding, 10, 3)?,
        vec![101, 202, 303]
    );
    assert_eq!(registers.read_bits(RegisterArea::Coil, 3, 1)?, vec![true]);
    assert_eq!(ctx.read_coils(2, 2).await??, vec![false, true]);

    ctx.disconnect().await?;
    engine.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_input_registers_and_discrete_inputs() -> Result<(), Box<dyn std::error::Error>> {
    let registers = LocalRegisters::new(small_layout());
    registers.write(RegisterArea::Input, 0, &[1234, 5678])?;
    registers.write_bits(RegisterArea::Discrete, 0, &[true, false, true])?;
    let (mut engine, socket_addr) = start_test_engine(registers).await?;

    let mut ctx = tcp::connect(socket_addr).await?;
    assert_eq!(ctx.read_input_registers(0, 2).await??, vec![1234, 5678]);
    assert_eq!(
        ctx.read_discrete_inputs(0, 3).await??,
        vec![true, false, true]
    );

    ctx.disconnect().await?;
    engine.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_register_address() -> Result<(), Box<dyn std::error::Error>> {
    let (mut engine, socket_addr) = start_test_engine(LocalRegisters::new(small_layout())).await?;

    let mut ctx = tcp::connect(socket_addr).await?;
    let result = ctx.read_input_registers(8, 5).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    let result = ctx.write_single_register(100, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    ctx.disconnect().await?;
    engine.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_multiple_clients_share_the_bank() -> Result<(), Box<dyn std::error::Error>> {
    let (mut engine, socket_addr) = start_test_engine(LocalRegisters::new(small_layout())).await?;

    let mut client1 = tcp::connect(socket_addr).await?;
    let mut client2 = tcp::connect(socket_addr).await?;

    client1.write_single_register(5, 888).await??;
    let data = client2.read_holding_registers(5, 1).await??;
    assert_eq!(data, vec![888]);

    // Each served request bumps the message counter
    assert!(engine.counters().messages() >= 2);
    assert!(engine.counters().total_connections() >= 2);

    client1.disconnect().await?;
    client2.disconnect().await?;
    engine.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_stop_closes_listener_and_clients() -> Result<(), Box<dyn std::error::Error>> {
    let (mut engine, socket_addr) = start_test_engine(LocalRegisters::new(small_layout())).await?;

    let mut ctx = tcp::connect(socket_addr).await?;
    ctx.read_holding_registers(0, 1).await??;

    engine.stop().await?;
    assert!(!engine.is_running());
    assert_eq!(engine.local_port(), None);

    // The open connection no longer gets answers
    let after_stop = time::timeout(Duration::from_secs(2), ctx.read_holding_registers(0, 1)).await;
    assert!(!matches!(after_stop, Ok(Ok(Ok(_)))));

    // And nobody listens on the port any more
    let reconnect = time::timeout(Duration::from_secs(2), tcp::connect(socket_addr)).await;
    assert!(!matches!(reconnect, Ok(Ok(_))));
    Ok(())
}

#[tokio::test]
async fn test_restart_binds_again() -> Result<(), Box<dyn std::error::Error>> {
    let registers = LocalRegisters::new(small_layout());
    let mut engine = TcpServerEngine::new("127.0.0.1", 0);

    engine.start(registers.clone()).await?;
    assert!(engine.is_running());
    engine.stop().await?;

    engine.start(registers).await?;
    let port = engine.local_port().ok_or("engine did not report its port")?;
    let mut ctx = tcp::connect(SocketAddr::from(([127, 0, 0, 1], port))).await?;
    assert_eq!(ctx.read_holding_registers(0, 2).await??, vec![0, 0]);

    ctx.disconnect().await?;
    engine.stop().await?;
    Ok(())
}
