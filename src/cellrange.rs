//! Bounded enumeration of the ECAL cell identifier space
//!
//! The channel status map is built by scanning coordinate grids that are a bit
//! larger than the detector, and keeping only the identifiers that map to real
//! crystals. The grids are spelled out here so that their (inclusive) bounds
//! can be checked independently of the map building logic.

use crate::detid::{DetectorCellId, EB_MAX_IETA, EB_MAX_IPHI, EE_MAX_IXY};
use std::ops::RangeInclusive;

/// Coordinate grid scanned in the ECAL barrel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarrelGrid {
    /// Scanned ieta values
    pub ieta: RangeInclusive<i32>,

    /// Scanned iphi values
    pub iphi: RangeInclusive<i32>,
}
//
impl Default for BarrelGrid {
    fn default() -> Self {
        Self {
            ieta: -EB_MAX_IETA..=EB_MAX_IETA,
            iphi: 0..=EB_MAX_IPHI,
        }
    }
}
//
impl BarrelGrid {
    /// Iterate over the valid barrel crystals of the grid, ieta-major
    pub fn cells(&self) -> impl Iterator<Item = DetectorCellId> + '_ {
        self.ieta
            .clone()
            .flat_map(move |ieta| self.iphi.clone().map(move |iphi| (ieta, iphi)))
            .filter(|&(ieta, iphi)| DetectorCellId::valid_barrel(ieta, iphi))
            .map(|(ieta, iphi)| DetectorCellId::EcalBarrel { ieta, iphi })
    }
}

/// Coordinate grid scanned in the ECAL endcaps
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndcapGrid {
    /// Scanned ix values
    pub ix: RangeInclusive<i32>,

    /// Scanned iy values
    pub iy: RangeInclusive<i32>,

    /// Scanned iz values, zero is never part of the scan
    pub iz: RangeInclusive<i32>,
}
//
impl Default for EndcapGrid {
    fn default() -> Self {
        Self {
            ix: 0..=EE_MAX_IXY,
            iy: 0..=EE_MAX_IXY,
            iz: -1..=1,
        }
    }
}
//
impl EndcapGrid {
    /// Iterate over the valid endcap crystals of the grid, ix-major with iz
    /// varying fastest
    pub fn cells(&self) -> impl Iterator<Item = DetectorCellId> + '_ {
        self.ix
            .clone()
            .flat_map(move |ix| self.iy.clone().map(move |iy| (ix, iy)))
            .flat_map(move |(ix, iy)| {
                self.iz
                    .clone()
                    .filter(|&iz| iz != 0)
                    .map(move |iz| (ix, iy, iz))
            })
            .filter(|&(ix, iy, iz)| DetectorCellId::valid_endcap(ix, iy, iz))
            .map(|(ix, iy, iz)| DetectorCellId::EcalEndcap { ix, iy, iz })
    }
}
