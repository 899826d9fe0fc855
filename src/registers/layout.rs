// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register area declarations
//!
//! A [`RegisterLayout`] fixes, once and for all, the address range of each of
//! the four Modbus areas. The layout is part of the configuration file and is
//! shared by the canonical store and by every transport-local bank so that
//! both sides always agree on what is addressable.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The four standard Modbus data kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterArea {
    /// Read/write 16-bit words (FC 03, 06, 16)
    Holding,
    /// Read-only 16-bit words (FC 04)
    Input,
    /// Read/write single bits (FC 01, 05, 15)
    Coil,
    /// Read-only single bits (FC 02)
    Discrete,
}

impl RegisterArea {
    /// All areas, in storage order.
    pub const ALL: [RegisterArea; 4] = [
        RegisterArea::Holding,
        RegisterArea::Input,
        RegisterArea::Coil,
        RegisterArea::Discrete,
    ];

    /// Whether the area stores single bits rather than words.
    pub fn is_bit(self) -> bool {
        matches!(self, RegisterArea::Coil | RegisterArea::Discrete)
    }

    /// Whether a remote Modbus master is able to write this area.
    pub fn is_master_writable(self) -> bool {
        matches!(self, RegisterArea::Holding | RegisterArea::Coil)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            RegisterArea::Holding => 0,
            RegisterArea::Input => 1,
            RegisterArea::Coil => 2,
            RegisterArea::Discrete => 3,
        }
    }
}

impl fmt::Display for RegisterArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterArea::Holding => "holding",
            RegisterArea::Input => "input",
            RegisterArea::Coil => "coil",
            RegisterArea::Discrete => "discrete",
        };
        f.write_str(name)
    }
}

/// Contiguous address range of one area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaSpec {
    /// First valid address
    pub start: u16,
    /// Number of addressable registers
    pub size: u16,
}

impl AreaSpec {
    pub const fn new(start: u16, size: u16) -> Self {
        Self { start, size }
    }

    /// One past the last valid address.
    pub fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.size)
    }

    /// Whether `count` registers starting at `offset` all lie inside the area.
    ///
    /// A zero-length range is accepted anywhere in `[start, end]`.
    pub fn contains(&self, offset: u16, count: usize) -> bool {
        let offset = u32::from(offset);
        offset >= u32::from(self.start) && offset + count as u32 <= self.end()
    }

    /// Index of `offset` inside the backing storage. Callers check bounds first.
    pub(crate) fn slot(&self, offset: u16) -> usize {
        usize::from(offset - self.start)
    }
}

/// Address ranges of all four areas.
///
/// The default reserves the Holding range 0..4000, which covers the named
/// sub-blocks at 1000, 2000 and 3000, and 256 entries for each other area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterLayout {
    #[serde(default = "default_holding")]
    pub holding: AreaSpec,
    #[serde(default = "default_small_area")]
    pub input: AreaSpec,
    #[serde(default = "default_small_area")]
    pub coil: AreaSpec,
    #[serde(default = "default_small_area")]
    pub discrete: AreaSpec,
}

fn default_holding() -> AreaSpec {
    AreaSpec::new(0, 4000)
}

fn default_small_area() -> AreaSpec {
    AreaSpec::new(0, 256)
}

impl Default for RegisterLayout {
    fn default() -> Self {
        Self {
            holding: default_holding(),
            input: default_small_area(),
            coil: default_small_area(),
            discrete: default_small_area(),
        }
    }
}

impl RegisterLayout {
    /// Address range declared for `area`.
    pub fn spec(&self, area: RegisterArea) -> AreaSpec {
        match area {
            RegisterArea::Holding => self.holding,
            RegisterArea::Input => self.input,
            RegisterArea::Coil => self.coil,
            RegisterArea::Discrete => self.discrete,
        }
    }

    /// Total number of registers across all areas.
    pub fn total_registers(&self) -> usize {
        RegisterArea::ALL
            .iter()
            .map(|area| usize::from(self.spec(*area).size))
            .sum()
    }
}

/// A sub-range of one area, used for the critical-only synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRange {
    pub area: RegisterArea,
    pub start: u16,
    pub count: u16,
}

impl RegisterRange {
    pub const fn new(area: RegisterArea, start: u16, count: u16) -> Self {
        Self { area, start, count }
    }

    /// Whether the range includes register `address` of `area`.
    pub fn covers(&self, area: RegisterArea, address: u16) -> bool {
        self.area == area && AreaSpec::new(self.start, self.count).contains(address, 1)
    }

    /// Whether the range fits inside the layout.
    pub fn fits(&self, layout: &RegisterLayout) -> bool {
        layout
            .spec(self.area)
            .contains(self.start, usize::from(self.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_bounds() {
        let spec = AreaSpec::new(1000, 10);
        assert!(spec.contains(1000, 10));
        assert!(spec.contains(1009, 1));
        assert!(spec.contains(1010, 0));
        assert!(!spec.contains(1009, 2));
        assert!(!spec.contains(999, 1));
        assert_eq!(spec.end(), 1010);
    }

    #[test]
    fn test_area_at_top_of_address_space() {
        let spec = AreaSpec::new(65000, 535);
        assert!(spec.contains(65534, 1));
        assert!(!spec.contains(65535, 1));
    }

    #[test]
    fn test_default_layout_covers_named_blocks() {
        let layout = RegisterLayout::default();
        for block in [1000u16, 2000, 3000] {
            assert!(RegisterRange::new(RegisterArea::Holding, block, 16).fits(&layout));
        }
        assert_eq!(layout.total_registers(), 4000 + 3 * 256);
    }

    #[test]
    fn test_range_covers() {
        let range = RegisterRange::new(RegisterArea::Holding, 1000, 16);
        assert!(range.covers(RegisterArea::Holding, 1000));
        assert!(range.covers(RegisterArea::Holding, 1015));
        assert!(!range.covers(RegisterArea::Holding, 1016));
        assert!(!range.covers(RegisterArea::Coil, 1000));
    }

    #[test]
    fn test_area_properties() {
        assert!(RegisterArea::Coil.is_bit());
        assert!(!RegisterArea::Input.is_bit());
        assert!(RegisterArea::Holding.is_master_writable());
        assert!(!RegisterArea::Discrete.is_master_writable());
        assert_eq!(RegisterArea::Discrete.to_string(), "discrete");
    }
}
