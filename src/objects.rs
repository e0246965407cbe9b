//! Reconstructed and simulated physics objects which the producer consumes

use crate::{
    detid::DetectorCellId,
    kinematics::Direction,
    numeric::Float,
};
use serde::{Deserialize, Serialize};

/// Reconstructed object with a transverse momentum and a direction
///
/// This is what a `Track` can be built around.
///
pub trait Candidate: Direction {
    /// Transverse momentum (GeV)
    fn pt(&self) -> Float;

    /// Electric charge, in units of the elementary charge
    fn charge(&self) -> i32;
}

/// Implement Direction for a type with `eta` and `phi` fields
macro_rules! impl_direction {
    ($($t:ty),*) => {
        $(
            impl Direction for $t {
                fn eta(&self) -> Float {
                    self.eta
                }

                fn phi(&self) -> Float {
                    self.phi
                }
            }
        )*
    };
}

/// Implement Candidate for a type with `pt` and `charge` fields
macro_rules! impl_candidate {
    ($($t:ty),*) => {
        $(
            impl Candidate for $t {
                fn pt(&self) -> Float {
                    self.pt
                }

                fn charge(&self) -> i32 {
                    self.charge
                }
            }
        )*
    };
}

impl_direction!(RecoTrack, IsolatedTrack, Jet, McParticle, GsfTrack);
impl_candidate!(RecoTrack, IsolatedTrack);

// ### TRACKS ###

/// General-purpose reconstructed track
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecoTrack {
    /// Transverse momentum (GeV)
    pub pt: Float,

    /// Pseudorapidity at the point of closest approach
    pub eta: Float,

    /// Azimuth at the point of closest approach
    pub phi: Float,

    /// Electric charge
    pub charge: i32,

    /// Number of valid tracker hits
    #[serde(default)]
    pub num_valid_hits: u32,
}

/// Track from the isolated-track collection, which carries its own isolation
/// sums and has its own calorimeter-energy estimates
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsolatedTrack {
    /// Transverse momentum (GeV)
    pub pt: Float,

    /// Pseudorapidity
    pub eta: Float,

    /// Azimuth
    pub phi: Float,

    /// Electric charge
    pub charge: i32,

    /// Scalar sum of charged-hadron pt in the isolation cone (GeV)
    #[serde(default)]
    pub charged_hadron_iso: Float,

    /// Energy deposited in the matched calorimeter cells (GeV)
    #[serde(default)]
    pub matched_calo_energy: Float,
}

/// Input track, of any of the supported flavours
///
/// Events carry one flavour or the other in their track collection, and the
/// producer handles both the same way.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InputTrack {
    /// General-purpose track
    Generic(RecoTrack),

    /// Track from the isolated-track collection
    Isolated(IsolatedTrack),
}
//
impl Direction for InputTrack {
    fn eta(&self) -> Float {
        match self {
            Self::Generic(t) => t.eta,
            Self::Isolated(t) => t.eta,
        }
    }

    fn phi(&self) -> Float {
        match self {
            Self::Generic(t) => t.phi,
            Self::Isolated(t) => t.phi,
        }
    }
}
//
impl Candidate for InputTrack {
    fn pt(&self) -> Float {
        match self {
            Self::Generic(t) => t.pt,
            Self::Isolated(t) => t.pt,
        }
    }

    fn charge(&self) -> i32 {
        match self {
            Self::Generic(t) => t.charge,
            Self::Isolated(t) => t.charge,
        }
    }
}

/// Electron track from the Gaussian-sum filter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GsfTrack {
    /// Transverse momentum (GeV)
    pub pt: Float,

    /// Pseudorapidity
    pub eta: Float,

    /// Azimuth
    pub phi: Float,
}

// ### JETS ###

/// Minimal transverse momentum of the jets used for track isolation (GeV)
pub const JET_MIN_PT: Float = 30.;

/// Maximal absolute pseudorapidity of the jets used for track isolation
pub const JET_MAX_ABS_ETA: Float = 4.5;

/// Particle-flow jet, with the composition variables used for jet ID
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Jet {
    /// Transverse momentum (GeV)
    pub pt: Float,

    /// Pseudorapidity
    pub eta: Float,

    /// Azimuth
    pub phi: Float,

    /// Neutral hadron energy fraction
    pub neutral_hadron_energy_fraction: Float,

    /// Neutral electromagnetic energy fraction
    pub neutral_em_energy_fraction: Float,

    /// Charged hadron energy fraction
    pub charged_hadron_energy_fraction: Float,

    /// Charged electromagnetic energy fraction
    pub charged_em_energy_fraction: Float,

    /// Muon energy fraction
    pub muon_energy_fraction: Float,

    /// Number of charged constituents
    pub charged_multiplicity: u32,

    /// Number of neutral constituents
    pub neutral_multiplicity: u32,
}
//
impl Jet {
    /// Tight jet ID with lepton veto
    pub fn passes_tight_lep_veto(&self) -> bool {
        let abs_eta = self.eta.abs();
        let central_charged = abs_eta > 2.4
            || (self.charged_hadron_energy_fraction > 0.
                && self.charged_multiplicity > 0
                && self.charged_em_energy_fraction < 0.90);
        let central = self.neutral_hadron_energy_fraction < 0.90
            && self.neutral_em_energy_fraction < 0.90
            && self.charged_multiplicity + self.neutral_multiplicity > 1
            && self.muon_energy_fraction < 0.8
            && central_charged
            && abs_eta <= 3.0;
        let forward = self.neutral_em_energy_fraction < 0.90
            && self.neutral_multiplicity > 10
            && abs_eta > 3.0;
        central || forward
    }

    /// Truth that this jet should be used when computing track isolation
    pub fn is_isolation_jet(&self) -> bool {
        self.pt > JET_MIN_PT && self.eta.abs() < JET_MAX_ABS_ETA && self.passes_tight_lep_veto()
    }
}

// ### GENERATOR LEVEL ###

/// Simulated particle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McParticle {
    /// Particle Data Group identifier
    pub pdg_id: i32,

    /// Transverse momentum (GeV)
    pub pt: Float,

    /// Pseudorapidity
    pub eta: Float,

    /// Azimuth
    pub phi: Float,
}

// ### CALORIMETER ###

/// Energy deposit in one calorimeter cell
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecHit {
    /// Cell where the energy was deposited
    pub id: DetectorCellId,

    /// Deposited energy (GeV)
    pub energy: Float,
}
