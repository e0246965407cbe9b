//! Calorimeter geometry: where each readout cell sits in the detector

use crate::{
    detid::{DetectorCellId, HcalSubdetector, EB_MAX_IPHI, EE_GRID_CENTER, HCAL_MAX_IPHI},
    error::ProducerError,
    kinematics::{self, Direction, Position},
    numeric::{
        floats::consts::{PI, TAU},
        Float,
    },
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

/// Angular coordinates of a calorimeter cell
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellPosition {
    /// Pseudorapidity
    pub eta: Float,

    /// Azimuth
    pub phi: Float,

    /// Polar angle
    pub theta: Float,
}
//
impl CellPosition {
    /// Compute the angular coordinates of a position vector
    pub fn from_position(p: &Position) -> Self {
        Self {
            eta: p.eta(),
            phi: p.phi(),
            theta: kinematics::theta(p),
        }
    }
}

impl Direction for CellPosition {
    fn eta(&self) -> Float {
        self.eta
    }

    fn phi(&self) -> Float {
        self.phi
    }
}

/// Source of calorimeter cell positions
///
/// Geometry lookups happen inside of event processing, which may be spread
/// across threads, hence the Send + Sync requirement.
///
pub trait CaloGeometry: Send + Sync {
    /// Position of the centre of a cell's front face
    ///
    /// Fails with `GeometryUnavailable` if this geometry does not describe the
    /// requested cell. Callers should treat that as fatal.
    ///
    fn position(&self, id: DetectorCellId) -> Result<Position, ProducerError>;

    /// Angular coordinates of a cell
    fn cell_position(&self, id: DetectorCellId) -> Result<CellPosition, ProducerError> {
        self.position(id).map(|p| CellPosition::from_position(&p))
    }
}

// ### IDEAL GEOMETRY ###

/// Radius of the ECAL barrel front face (cm)
const EB_RADIUS: Float = 129.;

/// Pseudorapidity span of one ECAL barrel crystal
const EB_ETA_PITCH: Float = 0.0174;

/// Distance between the interaction point and the ECAL endcap faces (cm)
const EE_Z: Float = 317.;

/// Transverse size of one ECAL endcap crystal (cm)
const EE_PITCH: Float = 2.862;

/// Radius of the first HB depth segment (cm)
const HB_RADIUS: Float = 180.;

/// Distance between the interaction point and the first HE depth (cm)
const HE_Z: Float = 388.;

/// Extent of one HCAL depth segment (cm)
const HCAL_DEPTH_STEP: Float = 12.;

/// Pseudorapidity span of one HCAL tower
const HCAL_ETA_PITCH: Float = 0.087;

/// Analytic geometry with regularly spaced cells
///
/// Barrel cells sit on cylinders and endcap cells on planes, with uniform
/// segmentation in (eta, phi) or (x, y). Every identifier that passes
/// `DetectorCellId::is_valid()` has a position.
///
#[derive(Clone, Copy, Debug, Default)]
pub struct IdealGeometry;
//
impl IdealGeometry {
    /// Centre of a phi cell, numbering from 1 starting at -𝜋
    fn phi_center(iphi: i32, num_cells: i32) -> Float {
        -PI + (iphi as Float - 0.5) * TAU / num_cells as Float
    }

    /// Centre of an eta ring, numbering from ±1 on each side of eta = 0
    fn eta_center(ieta: i32, pitch: Float) -> Float {
        let sign = ieta.signum() as Float;
        sign * (ieta.abs() as Float - 0.5) * pitch
    }
}
//
impl CaloGeometry for IdealGeometry {
    fn position(&self, id: DetectorCellId) -> Result<Position, ProducerError> {
        if !id.is_valid() {
            return Err(ProducerError::GeometryUnavailable { raw: id.raw() });
        }
        let position = match id {
            DetectorCellId::EcalBarrel { ieta, iphi } => kinematics::from_rho_eta_phi(
                EB_RADIUS,
                Self::eta_center(ieta, EB_ETA_PITCH),
                Self::phi_center(iphi, EB_MAX_IPHI),
            ),
            DetectorCellId::EcalEndcap { ix, iy, iz } => {
                let offset = |i: i32| (i as Float - EE_GRID_CENTER as Float) * EE_PITCH;
                Position::new(offset(ix), offset(iy), iz as Float * EE_Z)
            }
            DetectorCellId::Hcal {
                subdet,
                ieta,
                iphi,
                depth,
            } => {
                let eta = Self::eta_center(ieta, HCAL_ETA_PITCH);
                let phi = Self::phi_center(iphi, HCAL_MAX_IPHI);
                let depth_offset = (depth - 1) as Float * HCAL_DEPTH_STEP;
                match subdet {
                    HcalSubdetector::Barrel => {
                        kinematics::from_rho_eta_phi(HB_RADIUS + depth_offset, eta, phi)
                    }
                    HcalSubdetector::Endcap => {
                        let z = (HE_Z + depth_offset).copysign(eta);
                        kinematics::from_z_eta_phi(z, eta, phi)
                    }
                }
            }
        };
        Ok(position)
    }
}

// ### TABULATED GEOMETRY ###

/// One cell of a tabulated geometry file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TabulatedCell {
    /// Identifier of the cell
    pub id: DetectorCellId,

    /// Cartesian position of the cell (cm)
    pub position: [Float; 3],
}

/// Geometry which knows only about an explicit list of cells
#[derive(Clone, Debug, Default)]
pub struct TabulatedGeometry {
    positions: HashMap<DetectorCellId, Position>,
}
//
impl TabulatedGeometry {
    /// Build a geometry from a list of cells
    pub fn new(cells: impl IntoIterator<Item = TabulatedCell>) -> Self {
        Self {
            positions: cells
                .into_iter()
                .map(|cell| (cell.id, Position::from(cell.position)))
                .collect(),
        }
    }

    /// Load a geometry from a JSON list of cells
    pub fn load(path: &Path) -> Result<Self, ProducerError> {
        let file = File::open(path).map_err(|source| ProducerError::Io {
            path: path.to_owned(),
            source,
        })?;
        let cells: Vec<TabulatedCell> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ProducerError::Json {
                path: path.to_owned(),
                source,
            })?;
        Ok(Self::new(cells))
    }

    /// Number of cells in the geometry
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Truth that the geometry does not describe any cell
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
//
impl CaloGeometry for TabulatedGeometry {
    fn position(&self, id: DetectorCellId) -> Result<Position, ProducerError> {
        self.positions
            .get(&id)
            .copied()
            .ok_or(ProducerError::GeometryUnavailable { raw: id.raw() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::TOLERANCE;
    use crate::cellrange::{BarrelGrid, EndcapGrid};

    #[test]
    fn ideal_barrel_positions() {
        let geom = IdealGeometry;
        let pos = geom
            .cell_position(DetectorCellId::EcalBarrel { ieta: 1, iphi: 1 })
            .expect("Valid cell should have a position");
        assert!((pos.eta - 0.0087).abs() < TOLERANCE);
        assert!((pos.phi - (-PI + 0.5 * TAU / 360.)).abs() < TOLERANCE);

        let pos = geom
            .cell_position(DetectorCellId::EcalBarrel { ieta: -85, iphi: 360 })
            .expect("Valid cell should have a position");
        assert!((pos.eta + 84.5 * 0.0174).abs() < TOLERANCE);
        assert!(pos.phi < PI && pos.phi > PI - TAU / 360.);
    }

    #[test]
    fn ideal_geometry_covers_the_ecal() {
        let geom = IdealGeometry;
        for id in BarrelGrid::default().cells().chain(EndcapGrid::default().cells()) {
            let p = geom.position(id).expect("Valid cell should have a position");
            assert!(p.norm() > 100.);
        }
    }

    #[test]
    fn ideal_endcap_sides() {
        let geom = IdealGeometry;
        let plus = geom
            .cell_position(DetectorCellId::EcalEndcap { ix: 30, iy: 70, iz: 1 })
            .expect("Valid cell should have a position");
        let minus = geom
            .cell_position(DetectorCellId::EcalEndcap { ix: 30, iy: 70, iz: -1 })
            .expect("Valid cell should have a position");
        assert!(plus.eta > 1.4 && plus.eta < 3.1);
        assert!((plus.eta + minus.eta).abs() < TOLERANCE);
        assert!((plus.phi - minus.phi).abs() < TOLERANCE);
        assert!((plus.theta + minus.theta - PI).abs() < TOLERANCE);
    }

    #[test]
    fn ideal_hcal_positions() {
        let geom = IdealGeometry;
        let hb = geom
            .cell_position(DetectorCellId::Hcal {
                subdet: HcalSubdetector::Barrel,
                ieta: -3,
                iphi: 10,
                depth: 1,
            })
            .expect("Valid cell should have a position");
        assert!((hb.eta + 2.5 * 0.087).abs() < TOLERANCE);
        let he = geom
            .cell_position(DetectorCellId::Hcal {
                subdet: HcalSubdetector::Endcap,
                ieta: 20,
                iphi: 10,
                depth: 2,
            })
            .expect("Valid cell should have a position");
        assert!((he.eta - 19.5 * 0.087).abs() < TOLERANCE);
        assert!((he.phi - hb.phi).abs() < TOLERANCE);
    }

    #[test]
    fn invalid_cells_have_no_geometry() {
        let geom = IdealGeometry;
        let err = geom
            .position(DetectorCellId::EcalBarrel { ieta: 0, iphi: 1 })
            .expect_err("ieta = 0 is not a crystal");
        assert!(matches!(err, ProducerError::GeometryUnavailable { .. }));
    }

    #[test]
    fn tabulated_lookups() {
        let known = DetectorCellId::EcalBarrel { ieta: 5, iphi: 5 };
        let geom = TabulatedGeometry::new([TabulatedCell {
            id: known,
            position: [0., 129., 10.],
        }]);
        assert_eq!(geom.len(), 1);
        let p = geom.position(known).expect("Cell is tabulated");
        assert_eq!(p, Position::new(0., 129., 10.));
        let other = DetectorCellId::EcalBarrel { ieta: 5, iphi: 6 };
        match geom.position(other) {
            Err(ProducerError::GeometryUnavailable { raw }) => assert_eq!(raw, other.raw()),
            other => panic!("Unexpected lookup result {other:?}"),
        }
    }
}
