// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::manager::{JsonModeFile, ModbusManager};
use crate::network::SharedNetworkStatus;
use crate::registers::RegisterStore;
use crate::transport::{RtuAdapter, TcpAdapter};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Represents the daemon running the dual-transport manager
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    manager: Option<ModbusManager>,
    network: Option<SharedNetworkStatus>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            manager: None,
            network: None,
        }
    }

    /// Build the manager from configuration and start its worker
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let store = RegisterStore::new(config.registers.layout);
        let seeded = store.apply(&config.registers.initial_snapshot());
        if seeded.failed > 0 {
            anyhow::bail!(
                "{} initial register value(s) are outside the register layout",
                seeded.failed
            );
        }
        debug!("Loaded {} initial register value(s)", seeded.applied);

        let network = SharedNetworkStatus::from_config(&config.network, &config.tcp.address);
        let shared_network: Arc<SharedNetworkStatus> = Arc::new(network.clone());
        let rtu = RtuAdapter::from_config(&config.rtu, store.layout());
        let tcp = TcpAdapter::from_config(&config.tcp, shared_network.clone(), store.layout());

        let mut builder =
            ModbusManager::builder(store, Box::new(rtu), Box::new(tcp), shared_network)
                .config(config.manager.clone())
                .persistence(Arc::new(JsonModeFile::new(&config.persistence.mode_file)));
        if let Some(mode) = config.mode {
            builder = builder.initial_mode(mode);
        }
        let manager = builder.build();

        manager.set_mode_change_callback(|old, new| {
            info!("Modbus transport changed: {} -> {}", old, new);
        });

        self.start_manager(manager.clone())?;
        self.start_heartbeat(manager.clone())?;

        self.manager = Some(manager);
        self.network = Some(network);
        Ok(())
    }

    /// Start the supervisor worker of the manager
    fn start_manager(&mut self, manager: ModbusManager) -> Result<()> {
        info!("Starting Modbus manager worker");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            manager.run(running).await;
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start a heartbeat task that logs the manager status periodically
    fn start_heartbeat(&mut self, manager: ModbusManager) -> Result<()> {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let mut last_beat = time::Instant::now();
            while running.load(Ordering::SeqCst) {
                if last_beat.elapsed() >= HEARTBEAT_INTERVAL {
                    let status = serde_json::to_string(&manager.get_status())
                        .context("Failed to serialize manager status")?;
                    debug!("Daemon heartbeat: {}", status);
                    last_beat = time::Instant::now();
                }
                // Short sleeps so shutdown is not held up by the heartbeat
                time::sleep(Duration::from_secs(1)).await;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// The manager, once launched
    pub fn manager(&self) -> Option<&ModbusManager> {
        self.manager.as_ref()
    }

    /// Network state fed to the manager, for a WiFi monitor to update
    pub fn network(&self) -> Option<&SharedNetworkStatus> {
        self.network.as_ref()
    }

    /// Stop all running tasks
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {}", e),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout"),
            }
        }
        Ok(())
    }
}
