// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register storage
//!
//! This module provides the [`RegisterStore`], a thread-safe bank holding the
//! four Modbus areas laid out by a [`RegisterLayout`]. The manager owns one
//! instance as the canonical register map, and every transport adapter owns a
//! separate instance as its local cache. Values only move between them through
//! the synchronization engine.
//!
//! ## Consistency
//!
//! All four areas sit behind a single `RwLock`. Multi-register writes are
//! bounds-checked before the first value is stored, so a reader never observes
//! a partially applied write and a rejected write leaves every area untouched.

pub mod layout;
pub mod snapshot;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

pub use layout::{AreaSpec, RegisterArea, RegisterLayout, RegisterRange};
pub use snapshot::{RegisterBlock, RegisterSnapshot};

/// Errors raised by register accesses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("{count} {area} register(s) at offset {offset} are out of range")]
    OutOfRange {
        area: RegisterArea,
        offset: u16,
        count: usize,
    },
}

/// Outcome of a best-effort snapshot application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Registers stored
    pub applied: usize,
    /// Registers rejected because they fall outside the layout
    pub failed: usize,
    /// Stored registers whose value actually changed
    pub changed: usize,
}

#[derive(Debug)]
struct RegisterBank {
    layout: RegisterLayout,
    areas: [Vec<u16>; 4],
}

impl RegisterBank {
    fn new(layout: RegisterLayout) -> Self {
        let areas = RegisterArea::ALL.map(|area| vec![0u16; usize::from(layout.spec(area).size)]);
        Self { layout, areas }
    }

    fn check(
        &self,
        area: RegisterArea,
        offset: u16,
        count: usize,
    ) -> Result<AreaSpec, RegisterError> {
        let spec = self.layout.spec(area);
        if spec.contains(offset, count) {
            Ok(spec)
        } else {
            Err(RegisterError::OutOfRange {
                area,
                offset,
                count,
            })
        }
    }

    fn read(
        &self,
        area: RegisterArea,
        offset: u16,
        count: usize,
    ) -> Result<Vec<u16>, RegisterError> {
        let spec = self.check(area, offset, count)?;
        let first = spec.slot(offset);
        Ok(self.areas[area.index()][first..first + count].to_vec())
    }

    fn write(
        &mut self,
        area: RegisterArea,
        offset: u16,
        values: &[u16],
    ) -> Result<(), RegisterError> {
        let spec = self.check(area, offset, values.len())?;
        let first = spec.slot(offset);
        let target = &mut self.areas[area.index()][first..first + values.len()];
        for (slot, value) in target.iter_mut().zip(values) {
            *slot = normalize(area, *value);
        }
        Ok(())
    }

    fn store_one(&mut self, area: RegisterArea, address: u16, value: u16) -> Option<bool> {
        let spec = self.layout.spec(area);
        if !spec.contains(address, 1) {
            return None;
        }
        let slot = &mut self.areas[area.index()][spec.slot(address)];
        let value = normalize(area, value);
        let changed = *slot != value;
        *slot = value;
        Some(changed)
    }
}

fn normalize(area: RegisterArea, value: u16) -> u16 {
    if area.is_bit() {
        u16::from(value != 0)
    } else {
        value
    }
}

/// Thread-safe register map shared through cheap clones.
///
/// Cloning a `RegisterStore` yields another handle on the same storage. Use
/// [`RegisterStore::new`] to create an independent bank.
#[derive(Debug, Clone)]
pub struct RegisterStore {
    inner: Arc<RwLock<RegisterBank>>,
}

impl Default for RegisterStore {
    fn default() -> Self {
        Self::new(RegisterLayout::default())
    }
}

impl RegisterStore {
    /// Create a zero-filled bank for `layout`
    pub fn new(layout: RegisterLayout) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegisterBank::new(layout))),
        }
    }

    fn bank(&self) -> RwLockReadGuard<'_, RegisterBank> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn bank_mut(&self) -> RwLockWriteGuard<'_, RegisterBank> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn layout(&self) -> RegisterLayout {
        self.bank().layout
    }

    /// Read `count` consecutive registers of `area` starting at `offset`
    pub fn read(
        &self,
        area: RegisterArea,
        offset: u16,
        count: u16,
    ) -> Result<Vec<u16>, RegisterError> {
        self.bank().read(area, offset, usize::from(count))
    }

    /// Write `values` into `area` starting at `offset`
    ///
    /// Either every value is stored or, when any address falls outside the
    /// declared range, nothing is.
    pub fn write(
        &self,
        area: RegisterArea,
        offset: u16,
        values: &[u16],
    ) -> Result<(), RegisterError> {
        self.bank_mut().write(area, offset, values)
    }

    pub fn read_bits(
        &self,
        area: RegisterArea,
        offset: u16,
        count: u16,
    ) -> Result<Vec<bool>, RegisterError> {
        self.read(area, offset, count)
            .map(|words| words.into_iter().map(|word| word != 0).collect())
    }

    pub fn write_bits(
        &self,
        area: RegisterArea,
        offset: u16,
        bits: &[bool],
    ) -> Result<(), RegisterError> {
        let words: Vec<u16> = bits.iter().map(|bit| u16::from(*bit)).collect();
        self.write(area, offset, &words)
    }

    /// Copy of every area
    pub fn snapshot(&self) -> RegisterSnapshot {
        let bank = self.bank();
        RegisterArea::ALL
            .iter()
            .map(|area| {
                let spec = bank.layout.spec(*area);
                RegisterBlock::new(*area, spec.start, bank.areas[area.index()].clone())
            })
            .collect()
    }

    /// Copy of the listed ranges, taken under one lock
    pub fn snapshot_ranges(
        &self,
        ranges: &[RegisterRange],
    ) -> Result<RegisterSnapshot, RegisterError> {
        let bank = self.bank();
        ranges
            .iter()
            .map(|range| {
                bank.read(range.area, range.start, usize::from(range.count))
                    .map(|values| RegisterBlock::new(range.area, range.start, values))
            })
            .collect()
    }

    /// Store every register of `snapshot` that fits the layout.
    ///
    /// Registers outside the layout are counted in [`ApplyOutcome::failed`]
    /// and skipped; the rest of the snapshot is still applied.
    pub fn apply(&self, snapshot: &RegisterSnapshot) -> ApplyOutcome {
        let mut bank = self.bank_mut();
        let mut outcome = ApplyOutcome::default();
        for (area, address, value) in snapshot.iter() {
            match bank.store_one(area, address, value) {
                Some(changed) => {
                    outcome.applied += 1;
                    if changed {
                        outcome.changed += 1;
                    }
                }
                None => outcome.failed += 1,
            }
        }
        outcome
    }
}
