// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! TCP transport adapter

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::{
    push_snapshot, ConnectionInfo, StartOutcome, Transport, TransportAdapter, TransportError,
};
use crate::config::TcpConfig;
use crate::modbus::{LocalRegisters, ModbusEngine, TcpServerEngine};
use crate::network::NetworkStatus;
use crate::registers::{RegisterLayout, RegisterSnapshot};

/// Modbus TCP transport.
///
/// Refuses to start unless the network reports a connection with an
/// assigned address, then retries the engine start a bounded number of times.
pub struct TcpAdapter {
    engine: Box<dyn ModbusEngine>,
    registers: LocalRegisters,
    network: Arc<dyn NetworkStatus>,
    start_attempts: u32,
    retry_delay: Duration,
}

impl TcpAdapter {
    pub fn new(
        engine: Box<dyn ModbusEngine>,
        network: Arc<dyn NetworkStatus>,
        config: &TcpConfig,
        layout: RegisterLayout,
    ) -> Self {
        Self {
            engine,
            registers: LocalRegisters::new(layout),
            network,
            start_attempts: config.start_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    /// Adapter driving a [`TcpServerEngine`] bound as configured.
    pub fn from_config(
        config: &TcpConfig,
        network: Arc<dyn NetworkStatus>,
        layout: RegisterLayout,
    ) -> Self {
        Self::new(
            Box::new(TcpServerEngine::from_config(config)),
            network,
            config,
            layout,
        )
    }

    pub fn local_registers(&self) -> &LocalRegisters {
        &self.registers
    }
}

#[async_trait]
impl TransportAdapter for TcpAdapter {
    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    async fn start(&mut self) -> Result<StartOutcome, TransportError> {
        if self.engine.is_running() {
            debug!("TCP transport already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        if !self.network.is_connected() {
            warn!("Refusing to start the TCP transport: network unavailable");
            return Err(TransportError::NetworkUnavailable);
        }

        let mut reason = String::new();
        for attempt in 1..=self.start_attempts {
            match self.engine.start(self.registers.clone()).await {
                Ok(()) => {
                    info!("TCP transport started (attempt {})", attempt);
                    return Ok(StartOutcome::Started);
                }
                Err(e) => {
                    warn!(
                        "TCP transport start attempt {}/{} failed: {}",
                        attempt, self.start_attempts, e
                    );
                    reason = e.to_string();
                    if attempt < self.start_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(TransportError::StartFailed {
            attempts: self.start_attempts,
            reason,
        })
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        if !self.engine.is_running() {
            return Ok(());
        }
        self.engine
            .stop()
            .await
            .map_err(|e| TransportError::StopFailed(e.to_string()))?;
        info!("TCP transport stopped");
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
        ConnectionInfo::Tcp {
            active_connections: self.engine.counters().active_connections(),
            listen_port: self.engine.local_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::mock::{MockEngine, MockHandle};
    use crate::network::SharedNetworkStatus;

    fn adapter(network: &SharedNetworkStatus) -> (TcpAdapter, MockHandle) {
        let (engine, handle) = MockEngine::new();
        let adapter = TcpAdapter::new(
            Box::new(engine),
            Arc::new(network.clone()),
            &TcpConfig::default(),
            RegisterLayout::default(),
        );
        (adapter, handle)
    }

    #[tokio::test]
    async fn test_refuses_to_start_without_network() {
        let network = SharedNetworkStatus::new(false, None);
        let (mut adapter, handle) = adapter(&network);

        assert!(matches!(
            adapter.start().await,
            Err(TransportError::NetworkUnavailable)
        ));
        assert_eq!(handle.start_calls(), 0);
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    async fn test_refuses_to_start_without_address() {
        let network = SharedNetworkStatus::new(true, Some(String::new()));
        let (mut adapter, _) = adapter(&network);
        assert!(matches!(
            adapter.start().await,
            Err(TransportError::NetworkUnavailable)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_retries_with_backoff() {
        let network = SharedNetworkStatus::new(true, Some("10.0.0.5".to_string()));
        let (mut adapter, handle) = adapter(&network);
        handle.fail_next_starts(2);

        let started_at = tokio::time::Instant::now();
        assert_eq!(adapter.start().await.unwrap(), StartOutcome::Started);
        assert_eq!(handle.start_calls(), 3);
        assert!(started_at.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_gives_up_after_three_attempts() {
        let network = SharedNetworkStatus::new(true, Some("10.0.0.5".to_string()));
        let (mut adapter, handle) = adapter(&network);
        handle.fail_next_starts(5);

        match adapter.start().await {
            Err(TransportError::StartFailed { attempts, reason }) => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("mock start failure"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(handle.start_calls(), 3);
    }

    #[tokio::test]
    async fn test_start_twice_reports_already_running() {
        let network = SharedNetworkStatus::new(true, Some("10.0.0.5".to_string()));
        let (mut adapter, handle) = adapter(&network);
        assert_eq!(adapter.start().await.unwrap(), StartOutcome::Started);
        assert_eq!(adapter.start().await.unwrap(), StartOutcome::AlreadyRunning);
        assert_eq!(handle.start_calls(), 1);
        assert_eq!(
            adapter.connection_info(),
            ConnectionInfo::Tcp {
                active_connections: 0,
                listen_port: Some(1502)
            }
        );
    }
}
