// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register snapshots exchanged between the store and the transport adapters

use serde::{Deserialize, Serialize};

use super::RegisterArea;

/// Contiguous run of register values in a single area.
///
/// Bit areas carry `0` or `1` in each word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBlock {
    pub area: RegisterArea,
    pub start: u16,
    pub values: Vec<u16>,
}

impl RegisterBlock {
    pub fn new(area: RegisterArea, start: u16, values: Vec<u16>) -> Self {
        Self {
            area,
            start,
            values,
        }
    }

    pub fn contains(&self, area: RegisterArea, address: u16) -> bool {
        let address = u32::from(address);
        self.area == area
            && address >= u32::from(self.start)
            && address < u32::from(self.start) + self.values.len() as u32
    }

    pub fn get(&self, area: RegisterArea, address: u16) -> Option<u16> {
        if self.contains(area, address) {
            Some(self.values[usize::from(address - self.start)])
        } else {
            None
        }
    }

    /// Iterate over `(address, value)` pairs.
    ///
    /// Values that would lie past the top of the 16-bit address space are not
    /// yielded.
    pub fn entries(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.values.iter().enumerate().map_while(move |(i, value)| {
            u16::try_from(usize::from(self.start) + i)
                .ok()
                .map(|address| (address, *value))
        })
    }
}

/// Point-in-time copy of one or more register blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegisterSnapshot {
    blocks: Vec<RegisterBlock>,
}

impl RegisterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: RegisterBlock) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[RegisterBlock] {
        &self.blocks
    }

    /// Value of a register if any block covers it. Later blocks win.
    pub fn get(&self, area: RegisterArea, address: u16) -> Option<u16> {
        self.blocks
            .iter()
            .rev()
            .find_map(|block| block.get(area, address))
    }

    /// Overwrite a register already covered by a block.
    ///
    /// Returns `false` when no block covers `(area, address)`.
    pub fn set(&mut self, area: RegisterArea, address: u16, value: u16) -> bool {
        match self
            .blocks
            .iter_mut()
            .rev()
            .find(|block| block.contains(area, address))
        {
            Some(block) => {
                block.values[usize::from(address - block.start)] = value;
                true
            }
            None => false,
        }
    }

    /// Build a snapshot from individual registers, merging consecutive
    /// addresses of the same area into one block.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (RegisterArea, u16, u16)>,
    {
        let mut snapshot = Self::new();
        for (area, address, value) in entries {
            match snapshot.blocks.last_mut() {
                Some(block)
                    if block.area == area
                        && u32::from(block.start) + block.values.len() as u32
                            == u32::from(address) =>
                {
                    block.values.push(value);
                }
                _ => snapshot.push(RegisterBlock::new(area, address, vec![value])),
            }
        }
        snapshot
    }

    /// Iterate over every `(area, address, value)` triple.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterArea, u16, u16)> + '_ {
        self.blocks.iter().flat_map(|block| {
            block
                .entries()
                .map(move |(address, value)| (block.area, address, value))
        })
    }

    /// Number of registers carried.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|block| block.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<RegisterBlock> for RegisterSnapshot {
    fn from_iter<I: IntoIterator<Item = RegisterBlock>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lookup() {
        let snapshot: RegisterSnapshot = vec![
            RegisterBlock::new(RegisterArea::Holding, 10, vec![1, 2, 3]),
            RegisterBlock::new(RegisterArea::Coil, 10, vec![1, 0]),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.get(RegisterArea::Holding, 12), Some(3));
        assert_eq!(snapshot.get(RegisterArea::Holding, 13), None);
        assert_eq!(snapshot.get(RegisterArea::Coil, 11), Some(0));
        assert_eq!(snapshot.get(RegisterArea::Input, 10), None);
        assert_eq!(snapshot.len(), 5);
    }

    #[test]
    fn test_snapshot_iteration_order() {
        let mut snapshot = RegisterSnapshot::new();
        snapshot.push(RegisterBlock::new(RegisterArea::Input, 5, vec![7, 8]));
        let entries: Vec<_> = snapshot.iter().collect();
        assert_eq!(
            entries,
            vec![(RegisterArea::Input, 5, 7), (RegisterArea::Input, 6, 8)]
        );
    }

    #[test]
    fn test_from_entries_merges_runs() {
        let snapshot = RegisterSnapshot::from_entries(vec![
            (RegisterArea::Holding, 1, 10),
            (RegisterArea::Holding, 2, 20),
            (RegisterArea::Holding, 5, 50),
            (RegisterArea::Coil, 6, 1),
        ]);
        assert_eq!(
            snapshot.blocks(),
            &[
                RegisterBlock::new(RegisterArea::Holding, 1, vec![10, 20]),
                RegisterBlock::new(RegisterArea::Holding, 5, vec![50]),
                RegisterBlock::new(RegisterArea::Coil, 6, vec![1]),
            ]
        );
    }

    #[test]
    fn test_set_updates_covered_register_only() {
        let mut snapshot: RegisterSnapshot =
            std::iter::once(RegisterBlock::new(RegisterArea::Holding, 0, vec![0; 4])).collect();
        assert!(snapshot.set(RegisterArea::Holding, 3, 9));
        assert!(!snapshot.set(RegisterArea::Holding, 4, 9));
        assert!(!snapshot.set(RegisterArea::Coil, 0, 1));
        assert_eq!(snapshot.get(RegisterArea::Holding, 3), Some(9));
    }
}
