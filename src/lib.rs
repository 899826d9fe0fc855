// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust dual-transport Modbus slave
//!
//! This library exposes a single Modbus slave register map over two mutually
//! exclusive transports, Modbus RTU on a serial line and Modbus TCP on the
//! network, and switches between them at runtime without losing register state.
//!
//! ## Key Components
//!
//! - [`registers::RegisterStore`]: the canonical register map
//! - [`modbus`]: protocol engines built on `tokio-modbus`
//! - [`transport`]: RTU and TCP adapters wrapping the engines
//! - [`sync::SyncEngine`]: register synchronization between adapters and the store
//! - [`manager::ModbusManager`]: the mode supervisor and its public handle
//! - [`daemon::launch_daemon::Daemon`]: background task bring-up

pub mod config;
pub mod daemon;
pub mod manager;
pub mod modbus;
pub mod network;
pub mod registers;
pub mod sync;
pub mod transport;

pub use manager::{ManagerError, ManagerState, ManagerStatus, ModbusManager};
pub use registers::{RegisterArea, RegisterStore};
pub use transport::Transport;
