// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register synchronization between the canonical map and the adapters
//!
//! The [`SyncEngine`] keeps, for every adapter, a shadow snapshot holding the
//! last value each register had on both sides. Comparing against the shadow
//! tells which side changed a register since the previous pass:
//!
//! - adapter to canonical copies the Holding and Coil registers a master wrote
//!   through the transport;
//! - canonical to adapter copies the registers the canonical map changed,
//!   which includes the values local collaborators store into it.
//!
//! A value changed on one side is never overwritten by the stale copy on the
//! other side. Copies are best effort: a register that cannot be stored is
//! logged and counted, the rest of the pass carries on, and the call reports
//! [`SyncError::Partial`].

use std::collections::HashMap;

use log::{debug, warn};
use thiserror::Error;

use crate::registers::{RegisterBlock, RegisterRange, RegisterSnapshot, RegisterStore};
use crate::transport::{Transport, TransportAdapter, TransportError};

/// Errors raised by a synchronization pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("{failed} register(s) failed to synchronize, {copied} copied")]
    Partial { failed: usize, copied: usize },
}

/// Registers copied by a successful pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub copied: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct PassTotals {
    copied: usize,
    failed: usize,
}

impl PassTotals {
    fn add(&mut self, result: Result<SyncReport, SyncError>) {
        match result {
            Ok(report) => self.copied += report.copied,
            Err(SyncError::Partial { failed, copied }) => {
                self.copied += copied;
                self.failed += failed;
            }
        }
    }

    fn finish(self) -> Result<SyncReport, SyncError> {
        if self.failed > 0 {
            Err(SyncError::Partial {
                failed: self.failed,
                copied: self.copied,
            })
        } else {
            Ok(SyncReport {
                copied: self.copied,
            })
        }
    }
}

/// Copies registers between the canonical store and transport adapters.
///
/// Shadows are kept per transport kind, so at most one adapter of each kind
/// takes part in the synchronization.
pub struct SyncEngine {
    store: RegisterStore,
    critical_ranges: Vec<RegisterRange>,
    shadows: HashMap<Transport, RegisterSnapshot>,
}

impl SyncEngine {
    pub fn new(store: RegisterStore, critical_ranges: Vec<RegisterRange>) -> Self {
        Self {
            store,
            critical_ranges,
            shadows: HashMap::new(),
        }
    }

    pub fn set_critical_ranges(&mut self, ranges: Vec<RegisterRange>) {
        self.critical_ranges = ranges;
    }

    /// Whether `transport` has been seeded from the canonical map.
    pub fn is_seeded(&self, transport: Transport) -> bool {
        self.shadows.contains_key(&transport)
    }

    /// Canonical map to adapter.
    ///
    /// The first pass for an adapter copies the whole map; later passes copy
    /// only the registers the canonical map changed since.
    pub fn sync_from_canonical(
        &mut self,
        adapter: &dyn TransportAdapter,
    ) -> Result<SyncReport, SyncError> {
        let canonical = self.store.snapshot();
        self.push_changes(adapter, canonical, 0)
    }

    /// Adapter to canonical map.
    ///
    /// Only registers a master can write, and that changed on the adapter
    /// since the previous pass, are copied.
    pub fn sync_to_canonical(
        &mut self,
        adapter: &dyn TransportAdapter,
    ) -> Result<SyncReport, SyncError> {
        self.pull_changes(adapter, None)
    }

    /// Periodic pass while `active` runs.
    ///
    /// The active transport is the write authority: its changes go to the
    /// canonical map first, and the result is then mirrored back to it and to
    /// the standby adapter. A standby of the same kind as `active` shares its
    /// shadow and is not mirrored.
    pub fn sync_cycle(
        &mut self,
        active: &dyn TransportAdapter,
        standby: &dyn TransportAdapter,
    ) -> Result<SyncReport, SyncError> {
        let mut totals = PassTotals::default();
        totals.add(self.sync_to_canonical(active));
        totals.add(self.sync_from_canonical(active));
        if standby.transport() == active.transport() {
            if !std::ptr::addr_eq(active, standby) {
                warn!(
                    "Standby adapter is also a {} transport, skipping its mirror",
                    standby.transport()
                );
            }
        } else {
            totals.add(self.sync_from_canonical(standby));
        }
        let result = totals.finish();
        debug!("Synchronization cycle on {}: {:?}", active.transport(), result);
        result
    }

    /// Two-way pass limited to the critical ranges.
    ///
    /// An adapter that was never seeded gets a full canonical copy instead.
    pub fn sync_critical(
        &mut self,
        adapter: &dyn TransportAdapter,
    ) -> Result<SyncReport, SyncError> {
        if !self.is_seeded(adapter.transport()) {
            return self.sync_from_canonical(adapter);
        }

        let ranges = self.critical_ranges.clone();
        let mut totals = PassTotals::default();
        totals.add(self.pull_changes(adapter, Some(&ranges)));

        let layout = self.store.layout();
        let (readable, skipped): (Vec<_>, Vec<_>) = ranges
            .into_iter()
            .partition(|range| range.fits(&layout));
        let mut unreadable = 0;
        for range in &skipped {
            warn!(
                "Skipping critical range {} {}+{}: outside the canonical map",
                range.area, range.start, range.count
            );
            unreadable += usize::from(range.count);
        }

        // One read lock for every range so the copy is consistent
        let canonical = match self.store.snapshot_ranges(&readable) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!("Cannot read the critical ranges: {}", e);
                unreadable += readable.iter().map(|r| usize::from(r.count)).sum::<usize>();
                RegisterSnapshot::new()
            }
        };
        totals.add(self.push_changes(adapter, canonical, unreadable));
        totals.finish()
    }

    fn push_changes(
        &mut self,
        adapter: &dyn TransportAdapter,
        canonical: RegisterSnapshot,
        already_failed: usize,
    ) -> Result<SyncReport, SyncError> {
        let transport = adapter.transport();
        let outgoing = match self.shadows.get(&transport) {
            Some(shadow) => RegisterSnapshot::from_entries(
                canonical
                    .iter()
                    .filter(|(area, address, value)| {
                        shadow.get(*area, *address) != Some(*value)
                    }),
            ),
            None => canonical.clone(),
        };

        let mut failed = already_failed;
        if !outgoing.is_empty() {
            match adapter.push_to_engine(&outgoing) {
                Ok(()) => {}
                Err(TransportError::PartialWrite { failed: rejected }) => {
                    warn!(
                        "{} register(s) rejected by the {} transport \
                         while copying from the canonical map",
                        rejected, transport
                    );
                    failed += rejected;
                }
                Err(e) => {
                    warn!("Copy to the {} transport failed: {}", transport, e);
                    failed += outgoing.len();
                }
            }
        }

        match self.shadows.get_mut(&transport) {
            Some(shadow) => record(shadow, &outgoing),
            None => {
                self.shadows.insert(transport, canonical);
            }
        }

        let copied = outgoing.len().saturating_sub(failed - already_failed);
        if copied > 0 {
            debug!("Copied {} register(s) to the {} transport", copied, transport);
        }
        PassTotals { copied, failed }.finish()
    }

    fn pull_changes(
        &mut self,
        adapter: &dyn TransportAdapter,
        ranges: Option<&[RegisterRange]>,
    ) -> Result<SyncReport, SyncError> {
        let transport = adapter.transport();
        let Some(shadow) = self.shadows.get_mut(&transport) else {
            debug!("The {} transport was never seeded, nothing to copy back", transport);
            return Ok(SyncReport::default());
        };

        let layout = self.store.layout();
        let local = adapter.pull_from_engine();
        let mut failed = 0;
        let mut changed = Vec::new();
        for (area, address, value) in local.iter() {
            if !area.is_master_writable()
                || ranges.is_some_and(|ranges| !ranges.iter().any(|r| r.covers(area, address)))
                || shadow.get(area, address) == Some(value)
            {
                continue;
            }
            if !layout.spec(area).contains(address, 1) {
                warn!(
                    "Cannot copy {} register {} from the {} transport: outside the canonical map",
                    area, address, transport
                );
                failed += 1;
                continue;
            }
            changed.push((area, address, value));
        }

        let incoming = RegisterSnapshot::from_entries(changed);
        let outcome = self.store.apply(&incoming);
        failed += outcome.failed;
        record(shadow, &incoming);

        if outcome.applied > 0 {
            debug!(
                "Copied {} register(s) from the {} transport",
                outcome.applied, transport
            );
        }
        PassTotals {
            copied: outcome.applied,
            failed,
        }
        .finish()
    }
}

/// Store agreed values into a shadow snapshot.
fn record(shadow: &mut RegisterSnapshot, entries: &RegisterSnapshot) {
    for (area, address, value) in entries.iter() {
        if !shadow.set(area, address, value) {
            shadow.push(RegisterBlock::new(area, address, vec![value]));
        }
    }
}
