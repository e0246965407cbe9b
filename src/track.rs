//! Output tracks: input candidates enriched with calorimeter, jet, fiducial
//! and generator-level information

use crate::{
    detid::DetectorCellId,
    error::ProducerError,
    fiducial::EtaPhiList,
    geometry::CaloGeometry,
    kinematics::{self, Direction},
    numeric::Float,
    objects::{Candidate, GsfTrack, Jet, McParticle, RecHit},
    status::ChannelStatusMap,
};
use serde::{Deserialize, Serialize};

/// Radius of the cone in which calorimeter energy is summed
pub const CALO_CONE_DELTA_R: Float = 0.5;

/// Value of `delta_r_min_jet` when no jet passes the isolation selection
pub const NO_JET_DELTA_R: Float = 999.;

/// Maximal distance between a track and its generator-level match
pub const GEN_MATCH_MAX_DELTA_R: Float = 0.1;

/// Cell positions closer than this to the origin are considered degenerate
const MIN_CELL_DISTANCE: Float = 0.01;

/// Closest generator-level particle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenMatch {
    /// Particle Data Group identifier of the particle
    pub pdg_id: i32,

    /// Distance to the track
    pub delta_r: Float,
}

/// Track with the extra information needed by disappearing-track analyses
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track<T> {
    /// Input track
    pub candidate: T,

    /// Electromagnetic calorimeter energy within ΔR < 0.5 (GeV)
    pub calo_new_em_drp5: Float,

    /// Hadronic calorimeter energy within ΔR < 0.5 (GeV)
    pub calo_new_had_drp5: Float,

    /// Distance to the closest isolation jet, or `NO_JET_DELTA_R` if there is
    /// none. Absent if the jet collection was not available.
    pub delta_r_min_jet: Option<Float>,

    /// Distance to the closest GSF electron track, if any
    pub delta_r_min_gsf_track: Option<Float>,

    /// Truth that the track does not point at an electron veto hot spot
    pub is_fiducial_electron_track: bool,

    /// Truth that the track does not point at a muon veto hot spot
    pub is_fiducial_muon_track: bool,

    /// Truth that the track does not point at a dead ECAL channel
    pub is_fiducial_ecal_track: bool,

    /// Generator-level match, for simulated events
    pub gen_match: Option<GenMatch>,
}
//
impl<T: Candidate> Track<T> {
    /// Wrap an input track, with calorimeter and jet information unset
    pub fn new(candidate: T) -> Self {
        Self {
            candidate,
            calo_new_em_drp5: 0.,
            calo_new_had_drp5: 0.,
            delta_r_min_jet: None,
            delta_r_min_gsf_track: None,
            is_fiducial_electron_track: true,
            is_fiducial_muon_track: true,
            is_fiducial_ecal_track: true,
            gen_match: None,
        }
    }

    /// Flag the track against the fiducial maps and the dead ECAL channels
    pub fn set_fiducial_flags(
        &mut self,
        electron_vetoes: &EtaPhiList,
        muon_vetoes: &EtaPhiList,
        dead_channels: &ChannelStatusMap,
        min_delta_r: Float,
    ) {
        let c = &self.candidate;
        self.is_fiducial_electron_track = !electron_vetoes.is_vetoed(c, min_delta_r);
        self.is_fiducial_muon_track = !muon_vetoes.is_vetoed(c, min_delta_r);
        self.is_fiducial_ecal_track = !dead_channels.any_within(c, min_delta_r);
    }

    /// Record the distance to the closest GSF track
    pub fn set_gsf_tracks(&mut self, gsf_tracks: &[GsfTrack]) {
        self.delta_r_min_gsf_track = min_delta_r(&self.candidate, gsf_tracks);
    }

    /// Record the closest simulated particle within `GEN_MATCH_MAX_DELTA_R`
    pub fn set_gen_match(&mut self, particles: &[McParticle]) {
        self.gen_match = particles
            .iter()
            .map(|p| (p, kinematics::delta_r(&self.candidate, p)))
            .filter(|(_, dr)| *dr < GEN_MATCH_MAX_DELTA_R)
            .min_by(|(_, dr1), (_, dr2)| dr1.total_cmp(dr2))
            .map(|(p, delta_r)| GenMatch {
                pdg_id: p.pdg_id,
                delta_r,
            });
    }

    /// Record the distance to the closest isolation jet
    pub fn set_jets(&mut self, jets: &[Jet]) {
        let isolation_jets = jets.iter().filter(|j| j.is_isolation_jet());
        self.delta_r_min_jet = Some(
            isolation_jets
                .map(|jet| kinematics::delta_r(&self.candidate, jet))
                .fold(NO_JET_DELTA_R, Float::min),
        );
    }

    /// Sum the calorimeter energy in a ΔR < 0.5 cone around the track
    ///
    /// Fails if the geometry cannot locate one of the rec-hits.
    ///
    pub fn set_calo_energies(
        &mut self,
        geometry: &dyn CaloGeometry,
        em_hits: &[&[RecHit]],
        had_hits: &[RecHit],
    ) -> Result<(), ProducerError> {
        let cone_sum = |hits: &[RecHit]| -> Result<Float, ProducerError> {
            let mut energy = 0.;
            for hit in hits {
                if inside_cone(geometry, &self.candidate, hit.id, CALO_CONE_DELTA_R)? {
                    energy += hit.energy;
                }
            }
            Ok(energy)
        };
        let mut em_energy = 0.;
        for hits in em_hits {
            em_energy += cone_sum(hits)?;
        }
        let had_energy = cone_sum(had_hits)?;
        self.calo_new_em_drp5 = em_energy;
        self.calo_new_had_drp5 = had_energy;
        Ok(())
    }

    /// Total calorimeter energy within ΔR < 0.5 (GeV)
    pub fn calo_new_drp5(&self) -> Float {
        self.calo_new_em_drp5 + self.calo_new_had_drp5
    }
}

/// Smallest distance between a direction and any of a set of objects
fn min_delta_r<D: Direction>(direction: &impl Direction, objects: &[D]) -> Option<Float> {
    objects
        .iter()
        .map(|o| kinematics::delta_r(direction, o))
        .min_by(Float::total_cmp)
}

/// Truth that a calorimeter cell lies within `delta_r` of a direction
///
/// Cells whose position is too close to the origin to have a meaningful
/// direction are never inside of the cone.
///
pub fn inside_cone(
    geometry: &dyn CaloGeometry,
    direction: &impl Direction,
    id: DetectorCellId,
    delta_r: Float,
) -> Result<bool, ProducerError> {
    let position = geometry.position(id)?;
    if position.norm() < MIN_CELL_DISTANCE {
        return Ok(false);
    }
    Ok(kinematics::delta_r(direction, &position) < delta_r)
}
