// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Protocol engine abstraction
//!
//! A [`ModbusEngine`] is one running instance of the Modbus protocol stack on
//! a physical medium. It serves the transport-local register bank handed to
//! [`ModbusEngine::start`] and keeps traffic counters in [`EngineCounters`].

use std::io;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;

use crate::registers::RegisterStore;

/// Register bank owned by a single transport adapter.
///
/// It has the same type as the canonical map but is always a separate
/// instance; values reach the canonical map only through synchronization.
pub type LocalRegisters = RegisterStore;

#[derive(Debug, Default)]
struct CountersInner {
    messages: AtomicU64,
    active_connections: AtomicUsize,
    total_connections: AtomicU64,
}

/// Traffic counters shared between an engine and the connections it serves.
#[derive(Debug, Clone, Default)]
pub struct EngineCounters {
    inner: Arc<CountersInner>,
}

impl EngineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests handled since creation
    pub fn messages(&self) -> u64 {
        self.inner.messages.load(Ordering::Relaxed)
    }

    /// Number of clients currently connected
    pub fn active_connections(&self) -> usize {
        self.inner.active_connections.load(Ordering::Relaxed)
    }

    /// Number of clients accepted since creation
    pub fn total_connections(&self) -> u64 {
        self.inner.total_connections.load(Ordering::Relaxed)
    }

    pub(crate) fn record_message(&self) {
        self.inner.messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Register a new connection; it is counted as active until the guard drops.
    pub fn open_connection(&self) -> ConnectionGuard {
        self.inner.active_connections.fetch_add(1, Ordering::Relaxed);
        self.inner.total_connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            counters: self.clone(),
        }
    }
}

/// Keeps a connection counted as active for as long as it lives.
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: EngineCounters,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters
            .inner
            .active_connections
            .fetch_sub(1, Ordering::Relaxed);
    }
}

/// A Modbus protocol stack bound to one medium.
#[async_trait]
pub trait ModbusEngine: Send + Sync {
    /// Acquire the medium and begin serving `registers`.
    ///
    /// The engine must be stopped when this is called.
    async fn start(&mut self, registers: LocalRegisters) -> io::Result<()>;

    /// Stop serving and release the medium.
    ///
    /// When this returns, sockets, serial handles and spawned tasks are gone.
    async fn stop(&mut self) -> io::Result<()>;

    fn is_running(&self) -> bool;

    fn counters(&self) -> EngineCounters;

    /// Port actually bound, for network engines.
    fn local_port(&self) -> Option<u16> {
        None
    }
}
