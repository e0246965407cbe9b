//! Map of the unhealthy ECAL channels, built from the channel status conditions
//!
//! Once per run, every crystal of the ECAL is looked up in the channel status
//! table. Crystals whose status reaches the configured masking threshold are
//! recorded along with their position, so that tracks pointing at them can be
//! flagged during event processing.

use crate::{
    cellrange::{BarrelGrid, EndcapGrid},
    detid::DetectorCellId,
    error::ProducerError,
    geometry::{CaloGeometry, CellPosition},
    histogram::{Axis, Hist2D, HistogramFile},
    kinematics::{self, Direction},
    numeric::{functions::*, Float},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

/// Only the lower bits of a channel status code carry the channel's health
pub const STATUS_MASK: u32 = 0x1F;

/// Status of channels which are missing from the status table
///
/// This is below any sensible masking threshold, so such channels are never
/// flagged as bad.
///
pub const UNKNOWN_STATUS: i32 = -1;

/// Name of the occupancy histogram of bad channels in the diagnostic file
pub const DIAGNOSTIC_HIST_NAME: &str = "badChannels";

/// Source of per-channel health status codes
pub trait StatusSource: Send + Sync {
    /// Raw status code of a channel, if the channel is known
    fn status_code(&self, id: DetectorCellId) -> Option<u32>;
}

/// Status code and channel, as stored in channel status files
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Channel identifier
    pub id: DetectorCellId,

    /// Raw status code
    pub status: u32,
}

/// In-memory channel status table
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<StatusRecord>", into = "Vec<StatusRecord>")]
pub struct ChannelStatusTable {
    codes: HashMap<DetectorCellId, u32>,
}
//
impl ChannelStatusTable {
    /// Set the status code of a channel
    #[cfg(test)]
    pub fn insert(&mut self, id: DetectorCellId, status: u32) {
        self.codes.insert(id, status);
    }

    /// Number of channels with a known status
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Truth that no channel status is known
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
//
impl From<Vec<StatusRecord>> for ChannelStatusTable {
    fn from(records: Vec<StatusRecord>) -> Self {
        Self {
            codes: records.into_iter().map(|r| (r.id, r.status)).collect(),
        }
    }
}
//
impl From<ChannelStatusTable> for Vec<StatusRecord> {
    fn from(table: ChannelStatusTable) -> Self {
        let mut records = table
            .codes
            .into_iter()
            .map(|(id, status)| StatusRecord { id, status })
            .collect::<Vec<_>>();
        records.sort_by_key(|r| r.id);
        records
    }
}
//
impl StatusSource for ChannelStatusTable {
    fn status_code(&self, id: DetectorCellId) -> Option<u32> {
        self.codes.get(&id).copied()
    }
}

/// Health of a channel, as compared against the masking threshold
pub fn masked_status(source: &dyn StatusSource, id: DetectorCellId) -> i32 {
    source
        .status_code(id)
        .map_or(UNKNOWN_STATUS, |code| (code & STATUS_MASK) as i32)
}

/// Where a bad channel is and why it was flagged
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusDescriptor {
    /// Barrel crystal
    Barrel { ieta: i32, iphi: i32, status: i32 },

    /// Endcap crystal
    Endcap { ix: i32, iy: i32, iz: i32, status: i32 },
}
//
impl StatusDescriptor {
    /// Numerical tag of the sub-detector (1 = barrel, 2 = endcap)
    pub fn discriminator(&self) -> i32 {
        match self {
            Self::Barrel { .. } => 1,
            Self::Endcap { .. } => 2,
        }
    }

    /// Masked status code
    pub fn status(&self) -> i32 {
        match *self {
            Self::Barrel { status, .. } | Self::Endcap { status, .. } => status,
        }
    }

    /// Flat integer rendition, the sub-detector tag followed by the raw
    /// indices and the status code
    pub fn bits(&self) -> Vec<i32> {
        match *self {
            Self::Barrel { ieta, iphi, status } => vec![self.discriminator(), ieta, iphi, status],
            Self::Endcap { ix, iy, iz, status } => {
                vec![self.discriminator(), ix, iy, iz, status]
            }
        }
    }
}

/// Position and status of one bad channel
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatusEntry {
    /// Where the channel is
    pub position: CellPosition,

    /// What is wrong with it
    pub status: StatusDescriptor,
}

/// All bad channels of the ECAL
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelStatusMap {
    entries: BTreeMap<DetectorCellId, ChannelStatusEntry>,
}
//
impl ChannelStatusMap {
    /// Look up a channel
    #[cfg(test)]
    pub fn get(&self, id: DetectorCellId) -> Option<&ChannelStatusEntry> {
        self.entries.get(&id)
    }

    /// Number of bad channels
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Truth that all channels are healthy
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the bad channels, in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&DetectorCellId, &ChannelStatusEntry)> {
        self.entries.iter()
    }

    /// Truth that some bad channel lies within `delta_r` of a direction
    pub fn any_within(&self, direction: &impl Direction, delta_r: Float) -> bool {
        let max_dr2 = sqr(delta_r);
        self.entries
            .values()
            .any(|entry| kinematics::delta_r2(direction, &entry.position) < max_dr2)
    }
}

/// Outcome of a channel status map build
#[derive(Clone, Debug)]
pub struct StatusMapBuild {
    /// Bad channel map
    pub map: ChannelStatusMap,

    /// Occupancy of bad channels in (eta, phi), if requested
    pub diagnostic: Option<Hist2D>,
}

/// Builder of the bad ECAL channel map
#[derive(Clone, Debug)]
pub struct ChannelStatusMapBuilder {
    /// Barrel coordinates to be scanned
    pub barrel: BarrelGrid,

    /// Endcap coordinates to be scanned
    pub endcap: EndcapGrid,

    /// Channels whose masked status is at least this are recorded
    pub mask_threshold: i32,

    /// Whether an occupancy histogram of bad channels should be produced
    pub emit_diagnostic: bool,
}
//
impl ChannelStatusMapBuilder {
    /// Set up a builder which scans the whole ECAL
    pub fn new(mask_threshold: i32, emit_diagnostic: bool) -> Self {
        Self {
            barrel: BarrelGrid::default(),
            endcap: EndcapGrid::default(),
            mask_threshold,
            emit_diagnostic,
        }
    }

    /// Scan the ECAL and record the bad channels
    ///
    /// Fails if the geometry does not know about one of the scanned crystals,
    /// since the resulting map would then be incomplete.
    ///
    pub fn build(
        &self,
        status: &dyn StatusSource,
        geometry: &dyn CaloGeometry,
    ) -> Result<StatusMapBuild, ProducerError> {
        let mut map = ChannelStatusMap::default();
        let mut diagnostic = self.emit_diagnostic.then(|| {
            Hist2D::new(Axis::uniform(360, -3.0, 3.0), Axis::uniform(360, -3.2, 3.2))
        });

        let cells = self.barrel.cells().chain(self.endcap.cells());
        for id in cells {
            let code = masked_status(status, id);
            let position = geometry.cell_position(id)?;
            if code < self.mask_threshold {
                continue;
            }

            let descriptor = match id {
                DetectorCellId::EcalBarrel { ieta, iphi } => StatusDescriptor::Barrel {
                    ieta,
                    iphi,
                    status: code,
                },
                DetectorCellId::EcalEndcap { ix, iy, iz } => StatusDescriptor::Endcap {
                    ix,
                    iy,
                    iz,
                    status: code,
                },
                DetectorCellId::Hcal { .. } => unreachable!("Only ECAL cells are scanned"),
            };
            map.entries.insert(
                id,
                ChannelStatusEntry {
                    position,
                    status: descriptor,
                },
            );
            log::trace!(
                "Bad ECAL channel {id} with status {}: {:?}",
                descriptor.status(),
                descriptor.bits()
            );
            if let Some(hist) = diagnostic.as_mut() {
                hist.fill(position.eta, position.phi, 1.);
            }
        }

        log::debug!(
            "Found {} ECAL channels with status >= {}",
            map.len(),
            self.mask_threshold
        );
        Ok(StatusMapBuild { map, diagnostic })
    }
}

/// Write the bad channel occupancy histogram to disk
pub fn write_diagnostic(hist: &Hist2D, path: &Path) -> Result<(), ProducerError> {
    let mut file = HistogramFile::default();
    file.insert(DIAGNOSTIC_HIST_NAME, hist.clone());
    file.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{IdealGeometry, TabulatedGeometry};

    fn table(entries: &[(DetectorCellId, u32)]) -> ChannelStatusTable {
        let mut table = ChannelStatusTable::default();
        for &(id, status) in entries {
            table.insert(id, status);
        }
        table
    }

    const EB: DetectorCellId = DetectorCellId::EcalBarrel { ieta: -3, iphi: 17 };
    const EE: DetectorCellId = DetectorCellId::EcalEndcap { ix: 20, iy: 60, iz: 1 };

    #[test]
    fn status_is_masked_to_five_bits() {
        let t = table(&[(EB, 0x3F), (EE, 0x1F)]);
        assert_eq!(masked_status(&t, EB), 31);
        assert_eq!(masked_status(&t, EB), masked_status(&t, EE));
        assert_eq!(
            masked_status(&t, DetectorCellId::EcalBarrel { ieta: 1, iphi: 1 }),
            UNKNOWN_STATUS
        );
    }

    #[test]
    fn flagged_channels_are_recorded() {
        let t = table(&[
            (EB, 12),
            (EE, 0x20 | 3),
            (DetectorCellId::EcalBarrel { ieta: 1, iphi: 1 }, 2),
        ]);
        let build = ChannelStatusMapBuilder::new(3, false)
            .build(&t, &IdealGeometry)
            .expect("Ideal geometry covers the ECAL");
        assert!(build.diagnostic.is_none());
        assert_eq!(build.map.len(), 2);

        let eb = build.map.get(EB).expect("Barrel channel should be flagged");
        assert_eq!(eb.status.bits(), vec![1, -3, 17, 12]);
        assert_eq!(eb.status.discriminator(), 1);
        let expected = IdealGeometry.cell_position(EB).expect("Valid cell");
        assert_eq!(eb.position, expected);

        let ee = build.map.get(EE).expect("Endcap channel should be flagged");
        assert_eq!(ee.status.bits(), vec![2, 20, 60, 1, 3]);
        assert_eq!(ee.status.status(), 3);
    }

    #[test]
    fn raw_statuses_with_equal_low_bits_are_equivalent() {
        let with_high_bit = table(&[(EB, 0x3F)]);
        let without = table(&[(EB, 0x1F)]);
        for threshold in [0, 16, 31, 32] {
            let builder = ChannelStatusMapBuilder::new(threshold, false);
            let a = builder.build(&with_high_bit, &IdealGeometry).expect("Valid geometry");
            let b = builder.build(&without, &IdealGeometry).expect("Valid geometry");
            assert_eq!(a.map, b.map);
        }
    }

    #[test]
    fn diagnostic_histogram_counts_flagged_channels() {
        let t = table(&[(EB, 5), (EE, 7)]);
        let build = ChannelStatusMapBuilder::new(1, true)
            .build(&t, &IdealGeometry)
            .expect("Valid geometry");
        let hist = build.diagnostic.expect("Diagnostic was requested");
        assert_eq!(hist.integral(), 2.);
        assert_eq!(hist.x_axis().num_bins(), 360);
    }

    #[test]
    fn missing_geometry_is_fatal() {
        let builder = ChannelStatusMapBuilder {
            barrel: BarrelGrid {
                ieta: 1..=1,
                iphi: 1..=2,
            },
            endcap: EndcapGrid {
                ix: 0..=0,
                iy: 0..=0,
                iz: 1..=1,
            },
            mask_threshold: 1,
            emit_diagnostic: false,
        };
        let geometry = TabulatedGeometry::default();
        let result = builder.build(&ChannelStatusTable::default(), &geometry);
        assert!(matches!(
            result,
            Err(ProducerError::GeometryUnavailable { .. })
        ));
    }

    #[test]
    fn proximity_to_bad_channels() {
        let t = table(&[(EB, 5)]);
        let build = ChannelStatusMapBuilder::new(1, false)
            .build(&t, &IdealGeometry)
            .expect("Valid geometry");
        let pos = build.map.get(EB).expect("Channel is flagged").position;
        assert!(build.map.any_within(&(pos.eta + 0.01, pos.phi), 0.05));
        assert!(!build.map.any_within(&(pos.eta + 0.1, pos.phi), 0.05));
    }

    #[test]
    fn status_table_serde() {
        let json = r#"[{"id": {"ecal_barrel": {"ieta": -3, "iphi": 17}}, "status": 63}]"#;
        let t: ChannelStatusTable = serde_json::from_str(json).expect("Table should parse");
        assert_eq!(t.len(), 1);
        assert_eq!(t.status_code(EB), Some(63));
    }
}
