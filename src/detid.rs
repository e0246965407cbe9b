//! Calorimeter readout cell identifiers

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Largest |ieta| of an ECAL barrel crystal
pub const EB_MAX_IETA: i32 = 85;

/// Number of ECAL barrel crystals along phi
pub const EB_MAX_IPHI: i32 = 360;

/// Largest ix/iy of an ECAL endcap crystal
pub const EE_MAX_IXY: i32 = 100;

/// Inner radius of the endcap crystal annulus, in crystal pitches
pub const EE_INNER_RADIUS: f64 = 11.;

/// Outer radius of the endcap crystal annulus, in crystal pitches
pub const EE_OUTER_RADIUS: f64 = 50.;

/// Centre of the endcap (ix, iy) grid
pub const EE_GRID_CENTER: f64 = 50.5;

/// Number of HCAL towers along phi
pub const HCAL_MAX_IPHI: i32 = 72;

/// Largest |ieta| of the hadronic barrel
pub const HB_MAX_IETA: i32 = 16;

/// Smallest |ieta| of the hadronic endcap (overlaps the last HB tower)
pub const HE_MIN_IETA: i32 = 16;

/// Largest |ieta| of the hadronic endcap
pub const HE_MAX_IETA: i32 = 29;

/// Hadronic calorimeter sub-detectors covered by HBHE rec-hits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HcalSubdetector {
    /// Hadronic barrel
    Barrel,

    /// Hadronic endcap
    Endcap,
}

/// Identifier of one calorimeter readout cell
///
/// The ECAL barrel, ECAL endcap and HCAL identifiers live in disjoint
/// namespaces. Any combination of indices can be represented, use `is_valid()`
/// to know whether it maps to an actual detector cell.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorCellId {
    /// ECAL barrel crystal, addressed by (ieta, iphi)
    EcalBarrel { ieta: i32, iphi: i32 },

    /// ECAL endcap crystal, addressed by (ix, iy) on the side iz = ±1
    EcalEndcap { ix: i32, iy: i32, iz: i32 },

    /// HCAL barrel or endcap tower segment
    Hcal {
        subdet: HcalSubdetector,
        ieta: i32,
        iphi: i32,
        depth: i32,
    },
}
//
impl DetectorCellId {
    /// Truth that these indices address a real ECAL barrel crystal
    pub fn valid_barrel(ieta: i32, iphi: i32) -> bool {
        ieta != 0 && ieta.abs() <= EB_MAX_IETA && (1..=EB_MAX_IPHI).contains(&iphi)
    }

    /// Truth that these indices address a real ECAL endcap crystal
    ///
    /// Each endcap is modelled as an annulus of crystals around the beam pipe,
    /// a crystal exists if its centre falls inside the annulus.
    ///
    pub fn valid_endcap(ix: i32, iy: i32, iz: i32) -> bool {
        if iz.abs() != 1
            || !(1..=EE_MAX_IXY).contains(&ix)
            || !(1..=EE_MAX_IXY).contains(&iy)
        {
            return false;
        }
        let r = (f64::from(ix) - EE_GRID_CENTER).hypot(f64::from(iy) - EE_GRID_CENTER);
        r > EE_INNER_RADIUS && r <= EE_OUTER_RADIUS
    }

    /// Truth that these indices address a real HB/HE tower segment
    pub fn valid_hcal(subdet: HcalSubdetector, ieta: i32, iphi: i32, depth: i32) -> bool {
        let aieta = ieta.abs();
        let phi_ok = (1..=HCAL_MAX_IPHI).contains(&iphi);
        match subdet {
            HcalSubdetector::Barrel => {
                phi_ok && (1..=HB_MAX_IETA).contains(&aieta) && (1..=2).contains(&depth)
            }
            HcalSubdetector::Endcap => {
                phi_ok && (HE_MIN_IETA..=HE_MAX_IETA).contains(&aieta) && (1..=3).contains(&depth)
            }
        }
    }

    /// Truth that this identifier maps to an actual detector cell
    pub fn is_valid(&self) -> bool {
        match *self {
            Self::EcalBarrel { ieta, iphi } => Self::valid_barrel(ieta, iphi),
            Self::EcalEndcap { ix, iy, iz } => Self::valid_endcap(ix, iy, iz),
            Self::Hcal {
                subdet,
                ieta,
                iphi,
                depth,
            } => Self::valid_hcal(subdet, ieta, iphi, depth),
        }
    }

    /// Packed 32-bit form of the identifier, used in diagnostics
    ///
    /// Detector in bits 28-31 (3 = ECAL, 4 = HCAL), sub-detector in bits 25-27,
    /// the remaining bits carry the indices. Indices are masked to their field
    /// widths, so only valid identifiers round-trip meaningfully.
    ///
    pub fn raw(&self) -> u32 {
        const ECAL: u32 = 3 << 28;
        const HCAL: u32 = 4 << 28;
        let field = |value: i32, bits: u32| (value.unsigned_abs()) & ((1 << bits) - 1);
        match *self {
            Self::EcalBarrel { ieta, iphi } => {
                let zside = if ieta > 0 { 1 << 16 } else { 0 };
                ECAL | (1 << 25) | zside | (field(ieta, 7) << 9) | field(iphi, 9)
            }
            Self::EcalEndcap { ix, iy, iz } => {
                let zside = if iz > 0 { 1 << 14 } else { 0 };
                ECAL | (2 << 25) | zside | (field(ix, 7) << 7) | field(iy, 7)
            }
            Self::Hcal {
                subdet,
                ieta,
                iphi,
                depth,
            } => {
                let subdet = match subdet {
                    HcalSubdetector::Barrel => 1,
                    HcalSubdetector::Endcap => 2,
                };
                let zside = if ieta > 0 { 1 << 13 } else { 0 };
                HCAL | (subdet << 25)
                    | (field(depth, 5) << 14)
                    | zside
                    | (field(ieta, 6) << 7)
                    | field(iphi, 7)
            }
        }
    }
}

impl Display for DetectorCellId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EcalBarrel { ieta, iphi } => write!(fmt, "EB(ieta {ieta}, iphi {iphi})"),
            Self::EcalEndcap { ix, iy, iz } => write!(fmt, "EE(ix {ix}, iy {iy}, iz {iz})"),
            Self::Hcal {
                subdet,
                ieta,
                iphi,
                depth,
            } => {
                let name = match subdet {
                    HcalSubdetector::Barrel => "HB",
                    HcalSubdetector::Endcap => "HE",
                };
                write!(fmt, "{name}(ieta {ieta}, iphi {iphi}, depth {depth})")
            }
        }?;
        write!(fmt, " [0x{:08x}]", self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrel_validity() {
        assert!(DetectorCellId::valid_barrel(1, 1));
        assert!(DetectorCellId::valid_barrel(-85, 360));
        assert!(!DetectorCellId::valid_barrel(0, 10));
        assert!(!DetectorCellId::valid_barrel(86, 10));
        assert!(!DetectorCellId::valid_barrel(10, 0));
        assert!(!DetectorCellId::valid_barrel(10, 361));
    }

    #[test]
    fn endcap_validity() {
        // Outer rim along an axis, and the beam pipe hole
        assert!(DetectorCellId::valid_endcap(1, 50, 1));
        assert!(!DetectorCellId::valid_endcap(50, 50, -1));
        // Corners of the grid are outside of the annulus
        assert!(!DetectorCellId::valid_endcap(1, 1, 1));
        assert!(!DetectorCellId::valid_endcap(100, 100, -1));
        // Bad side or out of grid
        assert!(!DetectorCellId::valid_endcap(1, 50, 0));
        assert!(!DetectorCellId::valid_endcap(0, 50, 1));
        assert!(!DetectorCellId::valid_endcap(101, 50, 1));
    }

    #[test]
    fn hcal_validity() {
        use HcalSubdetector::*;
        assert!(DetectorCellId::valid_hcal(Barrel, -16, 72, 2));
        assert!(!DetectorCellId::valid_hcal(Barrel, 17, 1, 1));
        assert!(DetectorCellId::valid_hcal(Endcap, 29, 1, 3));
        assert!(!DetectorCellId::valid_hcal(Endcap, 15, 1, 1));
        assert!(!DetectorCellId::valid_hcal(Endcap, 20, 73, 1));
    }

    #[test]
    fn raw_ids_are_distinct_across_namespaces() {
        let eb = DetectorCellId::EcalBarrel { ieta: 1, iphi: 1 };
        let ee = DetectorCellId::EcalEndcap { ix: 1, iy: 1, iz: 1 };
        let hb = DetectorCellId::Hcal {
            subdet: HcalSubdetector::Barrel,
            ieta: 1,
            iphi: 1,
            depth: 1,
        };
        assert_ne!(eb.raw(), ee.raw());
        assert_ne!(eb.raw(), hb.raw());
        assert_eq!(eb.raw() >> 28, 3);
        assert_eq!(hb.raw() >> 28, 4);
        assert_eq!(
            DetectorCellId::EcalBarrel { ieta: -1, iphi: 1 }.raw() & (1 << 16),
            0
        );
    }

    #[test]
    fn serde_form() {
        let id: DetectorCellId =
            serde_json::from_str(r#"{"ecal_endcap": {"ix": 3, "iy": 40, "iz": -1}}"#)
                .expect("Identifier should parse");
        assert_eq!(id, DetectorCellId::EcalEndcap { ix: 3, iy: 40, iz: -1 });
        assert!(id.is_valid());
    }
}
