// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mode supervisor worker
//!
//! Each [`ModbusManager::tick`] plans one step under the control lock, then
//! carries it out with the lock released:
//!
//! | State | Step |
//! |-------|------|
//! | `Initializing` | move to `Idle` |
//! | `Idle` | transition when the desired mode is not satisfied |
//! | `RunningRtu` / `RunningTcp` | transition on a mode or `auto` network change, else sync |
//! | `Error` | after the backoff, and while retries remain, retry on RTU |
//!
//! A transition stops the outgoing transport after copying its registers into
//! the canonical map, waits for the settle delay, starts the target and seeds
//! it from the canonical map.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, error, info, warn};
use tokio::time::{self, Instant};

use super::state::ControlBlock;
use super::{ManagerError, ManagerState, ModbusManager};
use crate::transport::Transport;

/// Work decided by the planning half of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Nothing,
    Transition { desired: Transport, epoch: u64 },
    Sync { active: Transport },
}

impl ModbusManager {
    /// Run one supervisor step and return the resulting state.
    pub async fn tick(&self) -> ManagerState {
        let step = {
            let wifi_available = self.network().is_connected();
            let mut control = self.control();
            control.wifi_available = wifi_available;
            plan(&mut control, wifi_available, Instant::now())
        };

        match step {
            Step::Nothing => {}
            Step::Transition { desired, epoch } => self.transition(desired, epoch).await,
            Step::Sync { active } => self.periodic_sync(active).await,
        }

        self.check_active_transport();
        self.get_state()
    }

    /// Worker loop: tick every poll interval until `running` is cleared, then
    /// stop both transports.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        info!("Modbus manager worker started");
        while running.load(Ordering::SeqCst) {
            self.tick().await;
            let poll_interval = self.control().config.poll_interval();
            time::sleep(poll_interval).await;
        }
        self.shutdown().await;
        info!("Modbus manager worker stopped");
    }

    /// Stop both transports and return to `Idle`, keeping the desired mode.
    pub async fn shutdown(&self) {
        {
            let mut control = self.control();
            control.epoch += 1;
            control.state = ManagerState::Idle;
            control.current_mode = Transport::Disabled;
            control.uptime_start = None;
        }
        self.inner.adapters.lock().await.stop_all().await;
    }

    async fn transition(&self, desired: Transport, epoch: u64) {
        let (from, settle_delay, persist) = {
            let mut control = self.control();
            if control.epoch != epoch {
                return;
            }
            control.state = ManagerState::Switching;
            (
                control.current_mode,
                control.config.settle_delay(),
                control.config.persist_mode_changes,
            )
        };

        let network_up = self.network().is_connected();
        let target = match desired {
            Transport::Auto if network_up => Transport::Tcp,
            Transport::Auto => Transport::Rtu,
            other => other,
        };
        info!(
            "Switching Modbus transport from {} to {} (desired {})",
            from, target, desired
        );

        // Checked before anything is stopped so the running transport survives
        if target == Transport::Tcp && !network_up {
            warn!("Cannot switch to TCP: network unavailable");
            self.fail(epoch, from, ManagerError::NetworkUnavailable);
            return;
        }

        let mut adapters = self.inner.adapters.lock().await;
        let mut stopped_outgoing = false;
        if target != from {
            if adapters.get(from).is_some_and(|a| a.is_running()) {
                if let Err(e) = adapters.save_from(from) {
                    warn!("Registers of the {} transport not fully saved: {}", from, e);
                }
            }
            if let Some(outgoing) = adapters.get_mut(from) {
                if let Err(e) = outgoing.stop().await {
                    drop(adapters);
                    self.fail(epoch, from, ManagerError::from_transport(from, target, e));
                    return;
                }
                stopped_outgoing = true;
            }

            if stopped_outgoing && target != Transport::Disabled {
                // Release the adapters while the medium settles
                drop(adapters);
                time::sleep(settle_delay).await;
                adapters = self.inner.adapters.lock().await;
            }
        }

        if self.control().epoch != epoch {
            debug!("Transition to {} superseded by an emergency stop", target);
            return;
        }

        if let Some(adapter) = adapters.get_mut(target) {
            if let Err(e) = adapter.start().await {
                drop(adapters);
                let current = if stopped_outgoing { Transport::Disabled } else { from };
                self.fail(epoch, current, ManagerError::from_transport(from, target, e));
                return;
            }

            if self.control().epoch != epoch {
                warn!(
                    "Emergency stop during the transition, stopping the {} transport",
                    target
                );
                if let Err(e) = adapter.stop().await {
                    error!("Failed to stop the {} transport: {}", target, e);
                }
                return;
            }

            if let Err(e) = adapters.seed(target) {
                warn!("The {} transport was not fully seeded: {}", target, e);
            }
        }
        drop(adapters);

        let committed_desired = {
            let mut control = self.control();
            if control.epoch != epoch {
                None
            } else {
                control.record_success(target);
                Some(control.desired_mode)
            }
        };

        let Some(desired_now) = committed_desired else {
            return;
        };
        info!("Modbus transport switched from {} to {}", from, target);
        if from != target {
            self.notify_mode_change(from, target);
        }
        if persist {
            self.persist_desired_mode(desired_now).await;
        }
    }

    fn fail(&self, epoch: u64, current: Transport, failure: ManagerError) {
        let mut control = self.control();
        if control.epoch != epoch {
            return;
        }
        error!("Modbus transport transition failed: {}", failure);
        control.record_failure(current, failure);
        warn!(
            "Modbus manager in error state ({}/{} consecutive failures)",
            control.error_count, control.config.max_retry_attempts
        );
    }

    async fn periodic_sync(&self, active: Transport) {
        // The worker is the only regular user of the adapters; a held lock
        // means a manual sync or an emergency stop is running right now
        let Ok(mut adapters) = self.inner.adapters.try_lock() else {
            debug!("Adapters busy, skipping this synchronization cycle");
            return;
        };
        if self.get_state() != ManagerState::running(active) {
            return;
        }
        let result = adapters.sync_cycle(active);
        drop(adapters);

        if let Err(e) = &result {
            warn!("Periodic synchronization incomplete: {}", e);
        }
        self.record_sync(&result);
        self.control().last_sync = Some(Instant::now());
    }

    /// Refresh the cached counters and detect a transport that died on its own.
    fn check_active_transport(&self) {
        let Ok(adapters) = self.inner.adapters.try_lock() else {
            return;
        };
        let rtu = adapters.get(Transport::Rtu).map(|a| (a.connection_info(), a.is_running()));
        let tcp = adapters.get(Transport::Tcp).map(|a| (a.connection_info(), a.is_running()));
        drop(adapters);

        let mut control = self.control();
        for (info, _) in rtu.iter().chain(tcp.iter()) {
            control.connections.update(*info);
        }

        let active = control.current_mode;
        let alive = match active {
            Transport::Rtu => rtu.map(|(_, running)| running),
            Transport::Tcp => tcp.map(|(_, running)| running),
            Transport::Disabled | Transport::Auto => None,
        };
        if control.state.is_running() && alive == Some(false) {
            error!("The {} transport stopped unexpectedly", active);
            control.record_failure(
                Transport::Disabled,
                ManagerError::TransitionFailed {
                    from: active,
                    to: active,
                    reason: "transport stopped unexpectedly".to_string(),
                },
            );
        }
    }
}

/// Decide the next step. Runs under the control lock, so it never waits.
fn plan(control: &mut ControlBlock, wifi_available: bool, now: Instant) -> Step {
    if control.switch_requested {
        control.switch_requested = false;
        control.error_count = 0;
        control.failed_at = None;
        if control.state == ManagerState::Error {
            control.state = ManagerState::Idle;
        }
    }

    let transition = Step::Transition {
        desired: control.desired_mode,
        epoch: control.epoch,
    };

    match control.state {
        ManagerState::Initializing => {
            info!("Modbus manager initialized");
            control.state = ManagerState::Idle;
            Step::Nothing
        }
        ManagerState::Idle => {
            if !control.desired_mode.is_satisfied_by(control.current_mode) {
                transition
            } else {
                if control.error_count > 0 {
                    info!("Resuming on {} after a failed switch", control.current_mode);
                }
                control.record_resume(now);
                Step::Nothing
            }
        }
        ManagerState::RunningRtu | ManagerState::RunningTcp => {
            if !control.desired_mode.is_satisfied_by(control.current_mode) {
                return transition;
            }

            let wifi_check_due = is_due(
                control.last_wifi_check,
                control.config.wifi_check_interval(),
                now,
            );
            if control.desired_mode == Transport::Auto && wifi_check_due {
                control.last_wifi_check = Some(now);
                match control.current_mode {
                    Transport::Tcp if !wifi_available && control.config.auto_fallback_enabled => {
                        info!("Network lost, falling back to RTU");
                        return transition;
                    }
                    Transport::Rtu if wifi_available => {
                        info!("Network available, upgrading to TCP");
                        return transition;
                    }
                    _ => {}
                }
            }

            if control.config.register_sync_enabled
                && is_due(control.last_sync, control.config.sync_interval(), now)
            {
                control.last_sync = Some(now);
                Step::Sync {
                    active: control.current_mode,
                }
            } else {
                Step::Nothing
            }
        }
        // Transitions run inside a tick, so this is only seen from other callers
        ManagerState::Switching => Step::Nothing,
        ManagerState::Error => {
            let retries_left = control.error_count < control.config.max_retry_attempts;
            let backoff_over = control
                .failed_at
                .map_or(true, |at| now.duration_since(at) >= control.config.retry_backoff());
            if retries_left && backoff_over {
                info!(
                    "Retrying on RTU after failure {}/{}",
                    control.error_count, control.config.max_retry_attempts
                );
                control.desired_mode = Transport::Rtu;
                control.state = ManagerState::Idle;
            }
            Step::Nothing
        }
    }
}

fn is_due(last: Option<Instant>, interval: std::time::Duration, now: Instant) -> bool {
    last.map_or(true, |last| now.duration_since(last) >= interval)
}
