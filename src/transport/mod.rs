// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transport adapters
//!
//! A transport adapter wraps one [`ModbusEngine`](crate::modbus::ModbusEngine)
//! together with its transport-local register bank. Adapters know nothing of
//! the canonical register map: the synchronization engine moves values in
//! and out of them through [`TransportAdapter::pull_from_engine`] and
//! [`TransportAdapter::push_to_engine`].
//!
//! ## Key Components
//!
//! - [`Transport`]: the transport selector, including the `Auto` policy
//! - [`TransportAdapter`]: lifecycle and register mirroring contract
//! - [`RtuAdapter`]: serial line transport
//! - [`TcpAdapter`]: network transport, gated on network availability

pub mod rtu;
pub mod tcp;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modbus::LocalRegisters;
use crate::registers::RegisterSnapshot;

pub use rtu::RtuAdapter;
pub use tcp::TcpAdapter;

/// Transport selector.
///
/// `Auto` is a policy, never an active transport: the supervisor resolves it
/// to `Tcp` when the network is available and to `Rtu` otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Disabled,
    Rtu,
    Tcp,
    Auto,
}

/// A mode name or code that does not map to any [`Transport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown transport mode: {0}")]
pub struct InvalidTransport(pub String);

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Disabled => "disabled",
            Transport::Rtu => "rtu",
            Transport::Tcp => "tcp",
            Transport::Auto => "auto",
        }
    }

    /// Whether this is a concrete running transport.
    pub fn is_active(self) -> bool {
        matches!(self, Transport::Rtu | Transport::Tcp)
    }

    /// Whether running on `current` fulfils a request for `self`.
    pub fn is_satisfied_by(self, current: Transport) -> bool {
        match self {
            Transport::Auto => current.is_active(),
            desired => desired == current,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = InvalidTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(Transport::Disabled),
            "rtu" => Ok(Transport::Rtu),
            "tcp" => Ok(Transport::Tcp),
            "auto" => Ok(Transport::Auto),
            _ => Err(InvalidTransport(s.to_string())),
        }
    }
}

impl TryFrom<u16> for Transport {
    type Error = InvalidTransport;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Transport::Disabled),
            1 => Ok(Transport::Rtu),
            2 => Ok(Transport::Tcp),
            3 => Ok(Transport::Auto),
            other => Err(InvalidTransport(other.to_string())),
        }
    }
}

impl From<Transport> for u16 {
    fn from(transport: Transport) -> Self {
        match transport {
            Transport::Disabled => 0,
            Transport::Rtu => 1,
            Transport::Tcp => 2,
            Transport::Auto => 3,
        }
    }
}

/// Errors raised by transport adapters
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("network is not available")]
    NetworkUnavailable,

    #[error("transport failed to start after {attempts} attempt(s): {reason}")]
    StartFailed { attempts: u32, reason: String },

    #[error("transport failed to stop: {0}")]
    StopFailed(String),

    #[error("{failed} register(s) could not be written to the transport")]
    PartialWrite { failed: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result of a successful [`TransportAdapter::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Traffic figures reported by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "transport", rename_all = "camelCase")]
pub enum ConnectionInfo {
    #[serde(rename_all = "camelCase")]
    Rtu { message_count: u64 },
    #[serde(rename_all = "camelCase")]
    Tcp {
        active_connections: usize,
        listen_port: Option<u16>,
    },
}

/// Lifecycle and register mirroring contract of a transport.
///
/// Only the supervisor worker calls `start` and `stop`; the adapter lock it
/// holds serializes them.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// The concrete transport this adapter drives.
    fn transport(&self) -> Transport;

    /// Start the engine.
    ///
    /// Calling this while running returns [`StartOutcome::AlreadyRunning`]
    /// without touching the engine.
    async fn start(&mut self) -> Result<StartOutcome, TransportError>;

    /// Stop the engine and release its resources before returning.
    ///
    /// Stopping a stopped adapter is a no-op.
    async fn stop(&mut self) -> Result<(), TransportError>;

    fn is_running(&self) -> bool;

    /// Copy of the transport-local register bank.
    fn pull_from_engine(&self) -> RegisterSnapshot;

    /// Store `snapshot` into the transport-local bank, best effort.
    ///
    /// Every register that fits the local layout is applied. The ones that do
    /// not are reported as [`TransportError::PartialWrite`].
    fn push_to_engine(&self, snapshot: &RegisterSnapshot) -> Result<(), TransportError>;

    fn connection_info(&self) -> ConnectionInfo;
}

/// Apply `snapshot` to a local bank, reporting rejected registers.
pub(crate) fn push_snapshot(
    registers: &LocalRegisters,
    snapshot: &RegisterSnapshot,
) -> Result<(), TransportError> {
    let outcome = registers.apply(snapshot);
    if outcome.failed > 0 {
        Err(TransportError::PartialWrite {
            failed: outcome.failed,
        })
    } else {
        Ok(())
    }
}
