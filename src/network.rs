// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Network availability signal
//!
//! The manager does not manage WiFi itself. It consumes a [`NetworkStatus`]
//! provided by the connection manager and only starts the TCP transport when
//! that status reports a connection with an assigned address.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use log::info;

use crate::config::NetworkConfig;

/// Connection state published by the network layer.
pub trait NetworkStatus: Send + Sync {
    fn is_network_available(&self) -> bool;

    /// Address assigned to the station, if any.
    fn network_address(&self) -> Option<String>;

    /// Connected and holding a non-empty address.
    fn is_connected(&self) -> bool {
        self.is_network_available()
            && self
                .network_address()
                .is_some_and(|address| !address.trim().is_empty())
    }
}

#[derive(Debug, Default)]
struct SharedState {
    available: AtomicBool,
    address: Mutex<Option<String>>,
}

/// In-process network status that a connection manager updates.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct SharedNetworkStatus {
    state: Arc<SharedState>,
}

impl SharedNetworkStatus {
    pub fn new(available: bool, address: Option<String>) -> Self {
        Self {
            state: Arc::new(SharedState {
                available: AtomicBool::new(available),
                address: Mutex::new(address),
            }),
        }
    }

    /// Seed the status from configuration.
    ///
    /// Without an explicit address, `fallback_address` is reported.
    pub fn from_config(config: &NetworkConfig, fallback_address: &str) -> Self {
        let address = config
            .address
            .clone()
            .unwrap_or_else(|| fallback_address.to_string());
        Self::new(config.assume_available, Some(address))
    }

    /// Record a connection with an assigned address.
    pub fn set_connected(&self, address: impl Into<String>) {
        let address = address.into();
        info!("Network connected with address {}", address);
        *self.address_slot() = Some(address);
        self.state.available.store(true, Ordering::SeqCst);
    }

    /// Record a lost connection.
    pub fn set_disconnected(&self) {
        info!("Network disconnected");
        self.state.available.store(false, Ordering::SeqCst);
        *self.address_slot() = None;
    }

    /// Flip availability, keeping the current address.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    fn address_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.state
            .address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl NetworkStatus for SharedNetworkStatus {
    fn is_network_available(&self) -> bool {
        self.state.available.load(Ordering::SeqCst)
    }

    fn network_address(&self) -> Option<String> {
        self.address_slot().clone()
    }
}
