// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dual-transport manager
//!
//! The [`ModbusManager`] owns the canonical register map, the two transport
//! adapters and the synchronization engine. Its supervisor worker reconciles
//! the desired transport with the running one; callers only ever queue
//! requests and read status.
//!
//! ## Locking
//!
//! - The control fields sit behind one `std::sync::Mutex`, held for field
//!   reads and writes only, never across an `.await`.
//! - The adapters and the synchronization engine sit behind a
//!   `tokio::sync::Mutex`, held by the worker across transport start/stop.
//!   [`ModbusManager::switch_mode`] and [`ModbusManager::get_status`] never
//!   touch it.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::{atomic::AtomicBool, Arc};
//! use rust_dual_modbus::config::{ManagerConfig, RtuConfig, TcpConfig};
//! use rust_dual_modbus::network::SharedNetworkStatus;
//! use rust_dual_modbus::registers::RegisterStore;
//! use rust_dual_modbus::transport::{RtuAdapter, TcpAdapter, Transport};
//! use rust_dual_modbus::ModbusManager;
//!
//! # async fn example() -> Result<(), rust_dual_modbus::ManagerError> {
//! let store = RegisterStore::default();
//! let network = Arc::new(SharedNetworkStatus::new(true, Some("10.0.0.7".into())));
//! let rtu = RtuAdapter::from_config(&RtuConfig::default(), store.layout());
//! let tcp = TcpAdapter::from_config(&TcpConfig::default(), network.clone(), store.layout());
//!
//! let manager = ModbusManager::builder(store, Box::new(rtu), Box::new(tcp), network)
//!     .config(ManagerConfig::default())
//!     .initial_mode(Transport::Auto)
//!     .build();
//!
//! let running = Arc::new(AtomicBool::new(true));
//! tokio::spawn({
//!     let manager = manager.clone();
//!     async move { manager.run(running).await }
//! });
//!
//! manager.switch_mode(Transport::Rtu)?;
//! println!("{}", serde_json::to_string(&manager.get_status()).unwrap());
//! # Ok(())
//! # }
//! ```

mod error;
pub mod persistence;
mod state;
mod status;
mod supervisor;
#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

pub use error::ManagerError;
pub use persistence::{JsonModeFile, ModePersistence};
pub use state::ManagerState;
pub use status::ManagerStatus;

use crate::config::ManagerConfig;
use crate::network::NetworkStatus;
use crate::registers::RegisterStore;
use crate::sync::{SyncEngine, SyncError, SyncReport};
use crate::transport::{Transport, TransportAdapter};
use state::ControlBlock;

/// Callback notified with `(old, new)` after every completed transition.
pub type ModeChangeCallback = Arc<dyn Fn(Transport, Transport) + Send + Sync>;

/// Adapters and the synchronization engine, locked together.
pub(crate) struct Adapters {
    rtu: Box<dyn TransportAdapter>,
    tcp: Box<dyn TransportAdapter>,
    sync: SyncEngine,
}

impl Adapters {
    fn get(&self, transport: Transport) -> Option<&dyn TransportAdapter> {
        match transport {
            Transport::Rtu => Some(&*self.rtu),
            Transport::Tcp => Some(&*self.tcp),
            Transport::Disabled | Transport::Auto => None,
        }
    }

    fn get_mut(&mut self, transport: Transport) -> Option<&mut Box<dyn TransportAdapter>> {
        match transport {
            Transport::Rtu => Some(&mut self.rtu),
            Transport::Tcp => Some(&mut self.tcp),
            Transport::Disabled | Transport::Auto => None,
        }
    }

    /// Copy what a master wrote on `transport` into the canonical map.
    fn save_from(&mut self, transport: Transport) -> Result<SyncReport, SyncError> {
        let Adapters { rtu, tcp, sync } = self;
        match transport {
            Transport::Rtu => sync.sync_to_canonical(&**rtu),
            Transport::Tcp => sync.sync_to_canonical(&**tcp),
            Transport::Disabled | Transport::Auto => Ok(SyncReport::default()),
        }
    }

    /// Copy the canonical map onto `transport`.
    fn seed(&mut self, transport: Transport) -> Result<SyncReport, SyncError> {
        let Adapters { rtu, tcp, sync } = self;
        match transport {
            Transport::Rtu => sync.sync_from_canonical(&**rtu),
            Transport::Tcp => sync.sync_from_canonical(&**tcp),
            Transport::Disabled | Transport::Auto => Ok(SyncReport::default()),
        }
    }

    /// Periodic two-way pass with `active` as the write authority.
    fn sync_cycle(&mut self, active: Transport) -> Result<SyncReport, SyncError> {
        let Adapters { rtu, tcp, sync } = self;
        let (active, standby) = match active {
            Transport::Tcp => (&**tcp, &**rtu),
            _ => (&**rtu, &**tcp),
        };
        sync.sync_cycle(active, standby)
    }

    fn sync_critical(&mut self, active: Transport) -> Result<SyncReport, SyncError> {
        let Adapters { rtu, tcp, sync } = self;
        let adapter = match active {
            Transport::Tcp => &**tcp,
            _ => &**rtu,
        };
        sync.sync_critical(adapter)
    }

    /// Stop both adapters; failures are logged and the other one is still stopped.
    async fn stop_all(&mut self) {
        for adapter in [&mut self.rtu, &mut self.tcp] {
            if let Err(e) = adapter.stop().await {
                error!("Failed to stop the {} transport: {}", adapter.transport(), e);
            }
        }
    }
}

struct Inner {
    control: Mutex<ControlBlock>,
    adapters: tokio::sync::Mutex<Adapters>,
    store: RegisterStore,
    network: Arc<dyn NetworkStatus>,
    persistence: Option<Arc<dyn ModePersistence>>,
    callback: Mutex<Option<ModeChangeCallback>>,
}

/// Handle on a dual-transport manager.
///
/// Clones share the same manager. Every instance is independent: nothing is
/// global, so tests can run several side by side.
#[derive(Clone)]
pub struct ModbusManager {
    inner: Arc<Inner>,
}

/// Builder for [`ModbusManager`].
pub struct ManagerBuilder {
    config: ManagerConfig,
    store: RegisterStore,
    rtu: Box<dyn TransportAdapter>,
    tcp: Box<dyn TransportAdapter>,
    network: Arc<dyn NetworkStatus>,
    persistence: Option<Arc<dyn ModePersistence>>,
    initial_mode: Option<Transport>,
}

impl ManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Where the desired mode is read at start-up and saved after transitions.
    pub fn persistence(mut self, persistence: Arc<dyn ModePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Desired mode at start-up, taking precedence over the saved one.
    pub fn initial_mode(mut self, mode: Transport) -> Self {
        self.initial_mode = Some(mode);
        self
    }

    /// Build the manager.
    ///
    /// Without an explicit initial mode the saved one is used, and without
    /// persistence the manager starts with `Disabled`.
    pub fn build(self) -> ModbusManager {
        let desired = self
            .initial_mode
            .or_else(|| self.persistence.as_ref().map(|p| p.read_desired_mode()))
            .unwrap_or(Transport::Disabled);
        info!("Modbus manager created, desired mode {}", desired);

        let sync = SyncEngine::new(self.store.clone(), self.config.critical_ranges.clone());
        ModbusManager {
            inner: Arc::new(Inner {
                control: Mutex::new(ControlBlock::new(self.config, desired)),
                adapters: tokio::sync::Mutex::new(Adapters {
                    rtu: self.rtu,
                    tcp: self.tcp,
                    sync,
                }),
                store: self.store,
                network: self.network,
                persistence: self.persistence,
                callback: Mutex::new(None),
            }),
        }
    }
}

impl ModbusManager {
    /// Start building a manager over `store` and the two adapters.
    pub fn builder(
        store: RegisterStore,
        rtu: Box<dyn TransportAdapter>,
        tcp: Box<dyn TransportAdapter>,
        network: Arc<dyn NetworkStatus>,
    ) -> ManagerBuilder {
        ManagerBuilder {
            config: ManagerConfig::default(),
            store,
            rtu,
            tcp,
            network,
            persistence: None,
            initial_mode: None,
        }
    }

    fn control(&self) -> MutexGuard<'_, ControlBlock> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The canonical register map.
    pub fn store(&self) -> &RegisterStore {
        &self.inner.store
    }

    /// Queue a change of the desired transport.
    ///
    /// Returns at once; the worker carries the transition out on its next
    /// tick. An explicit request also clears the error count, re-arming
    /// automatic recovery after retries were exhausted.
    pub fn switch_mode(&self, mode: Transport) -> Result<(), ManagerError> {
        let mut control = self.control();
        info!(
            "Modbus mode change requested: {} (current {})",
            mode, control.current_mode
        );
        control.desired_mode = mode;
        control.switch_requested = true;
        Ok(())
    }

    /// [`switch_mode`](Self::switch_mode) with a mode name such as `"tcp"`.
    pub fn switch_mode_str(&self, mode: &str) -> Result<(), ManagerError> {
        let mode: Transport = mode.parse()?;
        self.switch_mode(mode)
    }

    /// The transport currently running, `Disabled` when none.
    pub fn get_mode(&self) -> Transport {
        self.control().current_mode
    }

    pub fn desired_mode(&self) -> Transport {
        self.control().desired_mode
    }

    pub fn get_state(&self) -> ManagerState {
        self.control().state
    }

    pub fn get_status(&self) -> ManagerStatus {
        ManagerStatus::from_control(&self.control())
    }

    /// Whether a transport is running.
    pub fn is_running(&self) -> bool {
        self.control().state.is_running()
    }

    /// Register the mode-change callback, replacing any previous one.
    pub fn set_mode_change_callback<F>(&self, callback: F)
    where
        F: Fn(Transport, Transport) + Send + Sync + 'static,
    {
        *self
            .inner
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    fn notify_mode_change(&self, old: Transport, new: Transport) {
        let callback = self
            .inner
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(old, new);
        }
    }

    /// Transport a manual synchronization may run on.
    fn sync_target(&self) -> Result<Transport, ManagerError> {
        let control = self.control();
        match control.state {
            ManagerState::Initializing => Err(ManagerError::NotInitialized),
            ManagerState::Switching => Err(ManagerError::TransitionInProgress),
            ManagerState::RunningRtu | ManagerState::RunningTcp => Ok(control.current_mode),
            ManagerState::Idle | ManagerState::Error => Err(ManagerError::NotRunning),
        }
    }

    async fn lock_adapters_for_sync(
        &self,
    ) -> Result<(Transport, tokio::sync::MutexGuard<'_, Adapters>), ManagerError> {
        self.sync_target()?;
        let timeout = self.control().config.lock_timeout();
        let adapters = tokio::time::timeout(timeout, self.inner.adapters.lock())
            .await
            .map_err(|_| {
                ManagerError::Timeout(format!(
                    "adapter lock not acquired within {} ms",
                    timeout.as_millis()
                ))
            })?;
        // The state may have moved while waiting for the lock
        let target = self.sync_target()?;
        Ok((target, adapters))
    }

    fn record_sync(&self, result: &Result<SyncReport, SyncError>) {
        let mut control = self.control();
        control.sync_count += 1;
        if result.is_err() {
            control.sync_failures += 1;
        }
    }

    /// Run a full synchronization cycle now, outside the periodic schedule.
    pub async fn force_sync(&self) -> Result<SyncReport, ManagerError> {
        let (target, mut adapters) = self.lock_adapters_for_sync().await?;
        debug!("Forced synchronization on {}", target);
        let result = adapters.sync_cycle(target);
        drop(adapters);
        self.record_sync(&result);
        result.map_err(|e| {
            warn!("Forced synchronization incomplete: {}", e);
            ManagerError::from(e)
        })
    }

    /// Synchronize the critical ranges only.
    pub async fn force_critical_sync(&self) -> Result<SyncReport, ManagerError> {
        let (target, mut adapters) = self.lock_adapters_for_sync().await?;
        let result = adapters.sync_critical(target);
        drop(adapters);
        self.record_sync(&result);
        result.map_err(ManagerError::from)
    }

    /// Stop both transports at once and force `Disabled`/`Idle`.
    ///
    /// The normal transition sequence is bypassed. A transition in flight
    /// when this is called discards its result and stops what it started.
    pub async fn emergency_stop(&self) -> Result<(), ManagerError> {
        let previous = {
            let mut control = self.control();
            warn!(
                "Emergency stop: halting Modbus transports (state {}, mode {})",
                control.state, control.current_mode
            );
            control.epoch += 1;
            control.desired_mode = Transport::Disabled;
            control.switch_requested = false;
            control.state = ManagerState::Idle;
            control.uptime_start = None;
            std::mem::replace(&mut control.current_mode, Transport::Disabled)
        };

        self.inner.adapters.lock().await.stop_all().await;
        info!("Emergency stop complete, all Modbus transports stopped");

        if previous != Transport::Disabled {
            self.notify_mode_change(previous, Transport::Disabled);
        }
        Ok(())
    }

    /// Replace the supervisor configuration.
    pub async fn reconfigure(&self, config: ManagerConfig) -> Result<(), ManagerError> {
        if config.poll_interval_ms == 0
            || config.sync_interval_ms == 0
            || config.wifi_check_interval_ms == 0
        {
            return Err(ManagerError::InvalidArgument(
                "intervals must be greater than zero".to_string(),
            ));
        }
        let layout = self.inner.store.layout();
        if let Some(range) = config.critical_ranges.iter().find(|r| !r.fits(&layout)) {
            return Err(ManagerError::InvalidArgument(format!(
                "critical range of {} {} register(s) at {} is outside the register map",
                range.count, range.area, range.start
            )));
        }

        self.inner
            .adapters
            .lock()
            .await
            .sync
            .set_critical_ranges(config.critical_ranges.clone());
        self.control().config = config;
        info!("Modbus manager reconfigured");
        Ok(())
    }

    pub(crate) fn network(&self) -> &dyn NetworkStatus {
        self.inner.network.as_ref()
    }

    /// Save `mode` on the blocking pool so file I/O stays off the worker.
    pub(crate) async fn persist_desired_mode(&self, mode: Transport) {
        let Some(persistence) = self.inner.persistence.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || persistence.save_desired_mode(mode)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to save the Modbus mode: {}", e),
            Err(e) => warn!("Modbus mode save task failed: {}", e),
        }
    }
}
