// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-memory engine used by unit tests

use std::io;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;

use crate::modbus::engine::{EngineCounters, LocalRegisters, ModbusEngine};

#[derive(Debug, Default)]
struct MockState {
    running: AtomicBool,
    start_calls: AtomicU32,
    stop_calls: AtomicU32,
    failing_starts: AtomicU32,
    start_delay_ms: AtomicU32,
    registers: Mutex<Option<LocalRegisters>>,
}

/// Engine that only flips a flag; its handle steers failures and delays.
pub(crate) struct MockEngine {
    state: Arc<MockState>,
    counters: EngineCounters,
}

/// Test-side view of a [`MockEngine`].
#[derive(Clone)]
pub(crate) struct MockHandle {
    state: Arc<MockState>,
    counters: EngineCounters,
}

impl MockEngine {
    pub(crate) fn new() -> (Self, MockHandle) {
        let state = Arc::new(MockState::default());
        let counters = EngineCounters::new();
        (
            Self {
                state: state.clone(),
                counters: counters.clone(),
            },
            MockHandle { state, counters },
        )
    }
}

impl MockHandle {
    pub(crate) fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    pub(crate) fn start_calls(&self) -> u32 {
        self.state.start_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_calls(&self) -> u32 {
        self.state.stop_calls.load(Ordering::SeqCst)
    }

    /// Make the next `count` starts fail.
    pub(crate) fn fail_next_starts(&self, count: u32) {
        self.state.failing_starts.store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_start_delay(&self, delay: Duration) {
        self.state
            .start_delay_ms
            .store(delay.as_millis() as u32, Ordering::SeqCst);
    }

    /// Bank handed to the last successful start.
    pub(crate) fn registers(&self) -> Option<LocalRegisters> {
        self.state.registers.lock().unwrap().clone()
    }

    /// Simulate the engine dying without a stop request.
    pub(crate) fn crash(&self) {
        self.state.running.store(false, Ordering::SeqCst);
    }

    /// Pretend a master sent `count` requests.
    pub(crate) fn record_messages(&self, count: u32) {
        for _ in 0..count {
            self.counters.record_message();
        }
    }
}

#[async_trait]
impl ModbusEngine for MockEngine {
    async fn start(&mut self, registers: LocalRegisters) -> io::Result<()> {
        self.state.start_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(delay))).await;
        }
        let failing = self.state.failing_starts.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_starts.store(failing - 1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "mock start failure"));
        }
        *self.state.registers.lock().unwrap() = Some(registers);
        self.state.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> io::Result<()> {
        self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.state.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    fn counters(&self) -> EngineCounters {
        self.counters.clone()
    }

    fn local_port(&self) -> Option<u16> {
        self.is_running().then_some(1502)
    }
}
