// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use thiserror::Error;

use crate::registers::RegisterError;
use crate::sync::SyncError;
use crate::transport::{InvalidTransport, Transport, TransportError};

/// Errors reported by the [`ModbusManager`](super::ModbusManager)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("network is not available")]
    NetworkUnavailable,

    #[error("transition from {from} to {to} failed: {reason}")]
    TransitionFailed {
        from: Transport,
        to: Transport,
        reason: String,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("manager is not initialized")]
    NotInitialized,

    #[error("no transport is running")]
    NotRunning,

    #[error("a transport transition is in progress")]
    TransitionInProgress,

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error("mode persistence failed: {0}")]
    Persistence(String),
}

impl ManagerError {
    /// Stable identifier reported as `lastError` in the status.
    pub fn code(&self) -> &'static str {
        match self {
            ManagerError::InvalidArgument(_) => "invalid_argument",
            ManagerError::NetworkUnavailable => "network_unavailable",
            ManagerError::TransitionFailed { .. } => "transition_failed",
            ManagerError::Timeout(_) => "timeout",
            ManagerError::NotInitialized => "not_initialized",
            ManagerError::NotRunning => "not_running",
            ManagerError::TransitionInProgress => "transition_in_progress",
            ManagerError::Sync(_) => "sync_failed",
            ManagerError::Register(_) => "register_error",
            ManagerError::Persistence(_) => "persistence_failed",
        }
    }

    /// Error recorded when a transition step fails.
    pub(crate) fn from_transport(from: Transport, to: Transport, error: TransportError) -> Self {
        match error {
            TransportError::NetworkUnavailable => ManagerError::NetworkUnavailable,
            other => ManagerError::TransitionFailed {
                from,
                to,
                reason: other.to_string(),
            },
        }
    }
}

impl From<InvalidTransport> for ManagerError {
    fn from(error: InvalidTransport) -> Self {
        ManagerError::InvalidArgument(error.to_string())
    }
}
