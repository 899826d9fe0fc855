// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus protocol engines
//!
//! This module provides the Modbus slave protocol stacks used by the transport
//! adapters: a TCP server and an RTU server on a serial line. Both answer
//! requests from a transport-local register bank through the same
//! [`LocalRegisterService`].
//!
//! ## Key Components
//!
//! - [`ModbusEngine`]: start/stop abstraction over one protocol stack
//! - [`TcpServerEngine`]: Modbus TCP server
//! - [`RtuServerEngine`]: Modbus RTU server
//! - [`LocalRegisterService`]: request dispatcher shared by both engines
//!
//! ## Usage
//!
//! ```no_run
//! use rust_dual_modbus::modbus::{LocalRegisters, ModbusEngine, TcpServerEngine};
//!
//! # async fn example() -> std::io::Result<()> {
//! let mut engine = TcpServerEngine::new("127.0.0.1", 5020);
//! engine.start(LocalRegisters::default()).await?;
//! engine.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Register Areas
//!
//! - Holding registers: read/write 16-bit words (function codes 0x03, 0x06, 0x10, 0x17)
//! - Input registers: read-only 16-bit words (function code 0x04)
//! - Coils: read/write bits (function codes 0x01, 0x05, 0x0F)
//! - Discrete inputs: read-only bits (function code 0x02)
//!
//! Addresses outside the configured layout are answered with
//! `IllegalDataAddress`.

pub mod engine;
#[cfg(test)]
pub(crate) mod mock;
pub mod rtu_server;
pub mod service;
pub mod tcp_server;

pub use engine::{ConnectionGuard, EngineCounters, LocalRegisters, ModbusEngine};
pub use rtu_server::RtuServerEngine;
pub use service::{AddressedService, LocalRegisterService};
pub use tcp_server::TcpServerEngine;
