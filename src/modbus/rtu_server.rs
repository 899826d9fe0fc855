// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus RTU server engine on a serial line

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio_modbus::server::rtu::Server;
use tokio_serial::{DataBits, Parity, SerialPortBuilder, SerialStream, StopBits};

use crate::config::RtuConfig;
use crate::modbus::engine::{EngineCounters, LocalRegisters, ModbusEngine};
use crate::modbus::service::{AddressedService, LocalRegisterService};

/// Modbus RTU server owning a serial device while running.
///
/// Stopping aborts the serving task, which drops the `SerialStream` and frees
/// the device for whoever opens it next.
pub struct RtuServerEngine {
    config: RtuConfig,
    counters: EngineCounters,
    server_task: Option<JoinHandle<()>>,
}

impl RtuServerEngine {
    pub fn new(config: RtuConfig) -> Self {
        Self {
            config,
            counters: EngineCounters::new(),
            server_task: None,
        }
    }

    fn port_builder(&self) -> SerialPortBuilder {
        let parity = match self.config.parity.to_ascii_lowercase().as_str() {
            "even" => Parity::Even,
            "odd" => Parity::Odd,
            _ => Parity::None,
        };
        let data_bits = match self.config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let stop_bits = if self.config.stop_bits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        };

        tokio_serial::new(&self.config.device, self.config.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(self.config.timeout_ms))
    }
}

#[async_trait]
impl ModbusEngine for RtuServerEngine {
    async fn start(&mut self, registers: LocalRegisters) -> io::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        info!(
            "Starting Modbus RTU server on {} at {} baud (slave {})",
            self.config.device, self.config.baud_rate, self.config.slave_id
        );
        let serial = SerialStream::open(&self.port_builder())?;
        let server = Server::new(serial);
        let service = AddressedService::new(
            self.config.slave_id,
            LocalRegisterService::new(registers, self.counters.clone()),
        );
        let device = self.config.device.clone();

        let server_task = tokio::spawn(async move {
            if let Err(e) = server.serve_forever(service).await {
                error!("Modbus RTU server on {} failed: {}", device, e);
            }
        });

        self.server_task = Some(server_task);
        Ok(())
    }

    async fn stop(&mut self) -> io::Result<()> {
        if let Some(task) = self.server_task.take() {
            info!("Shutting down Modbus RTU server on {}", self.config.device);
            task.abort();
            match task.await {
                Ok(()) => debug!("Modbus RTU server task ended"),
                Err(e) if e.is_cancelled() => debug!("Modbus RTU server task cancelled"),
                Err(e) => warn!("Modbus RTU server task failed: {}", e),
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.server_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn counters(&self) -> EngineCounters {
        self.counters.clone()
    }
}
