// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! RTU transport adapter

use async_trait::async_trait;
use log::{debug, info};

use super::{
    push_snapshot, ConnectionInfo, StartOutcome, Transport, TransportAdapter, TransportError,
};
use crate::config::RtuConfig;
use crate::modbus::{LocalRegisters, ModbusEngine, RtuServerEngine};
use crate::registers::{RegisterLayout, RegisterSnapshot};

/// Modbus RTU transport.
///
/// The serial line is local hardware, so `start` makes a single attempt.
pub struct RtuAdapter {
    engine: Box<dyn ModbusEngine>,
    registers: LocalRegisters,
}

impl RtuAdapter {
    pub fn new(engine: Box<dyn ModbusEngine>, layout: RegisterLayout) -> Self {
        Self {
            engine,
            registers: LocalRegisters::new(layout),
        }
    }

    /// Adapter driving a serial [`RtuServerEngine`].
    pub fn from_config(config: &RtuConfig, layout: RegisterLayout) -> Self {
        Self::new(Box::new(RtuServerEngine::new(config.clone())), layout)
    }

    pub fn local_registers(&self) -> &LocalRegisters {
        &self.registers
    }
}

#[async_trait]
impl TransportAdapter for RtuAdapter {
    fn transport(&self) -> Transport {
        Transport::Rtu
    }

    async fn start(&mut self) -> Result<StartOutcome, TransportError> {
        if self.engine.is_running() {
            debug!("RTU transport already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.engine
            .start(self.registers.clone())
            .await
            .map_err(|e| TransportError::StartFailed {
                attempts: 1,
                reason: e.to_string(),
            })?;
        info!("RTU transport started");
        Ok(StartOutcome::Started)
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        if !self.engine.is_running() {
            return Ok(());
        }
        self.engine
            .stop()
            .await
            .map_err(|e| TransportError::StopFailed(e.to_string()))?;
        info!("RTU transport stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    fn pull_from_engine(&self) -> RegisterSnapshot {
        self.registers.snapshot()
    }

    fn push_to_engine(&self, snapshot: &RegisterSnapshot) -> Result<(), TransportError> {
        push_snapshot(&self.registers, snapshot)
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::Rtu {
            message_count: self.engine.counters().messages(),
        }
    }
}
