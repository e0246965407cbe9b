//! Mechanism for loading and checking the producer configuration

use crate::{event::InputTag, fiducial::FiducialMapSource, numeric::Float, Result};
use eyre::{ensure, WrapErr};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Tags of the collections which the producer reads
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Collections {
    /// Input tracks
    pub tracks: InputTag,

    /// Particle-flow jets
    pub jets: InputTag,

    /// Simulated particles
    pub mcparticles: InputTag,

    /// GSF electron tracks
    pub gsf_tracks: InputTag,

    /// ECAL barrel rec-hits
    pub eb_rec_hits: InputTag,

    /// ECAL endcap rec-hits
    pub ee_rec_hits: InputTag,

    /// HCAL barrel and endcap rec-hits
    pub hbhe_rec_hits: InputTag,
}
//
impl Default for Collections {
    fn default() -> Self {
        let tag = |label: &str| InputTag::new(label, "");
        Self {
            tracks: tag("generalTracks"),
            jets: tag("slimmedJets"),
            mcparticles: tag("prunedGenParticles"),
            gsf_tracks: tag("electronGsfTracks"),
            eb_rec_hits: tag("reducedEcalRecHitsEB"),
            ee_rec_hits: tag("reducedEcalRecHitsEE"),
            hbhe_rec_hits: tag("reducedHcalRecHits"),
        }
    }
}

/// Sources of the electron and muon fiducial maps
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FiducialMaps {
    /// Sources of the electron veto map
    #[serde(default)]
    pub electrons: Vec<FiducialMapSource>,

    /// Sources of the muon veto map
    #[serde(default)]
    pub muons: Vec<FiducialMapSource>,
}

/// Producer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Input collections
    pub collections: Collections,

    /// Histograms from which the veto maps are extracted
    pub fiducial_maps: FiducialMaps,

    /// ECAL channels whose masked status reaches this value are dead
    pub masked_ecal_channel_status_threshold: i32,

    /// Truth that the dead ECAL channels should be saved as a histogram
    pub output_bad_ecal_channels: bool,

    /// Where the dead ECAL channel histogram is saved
    pub bad_ecal_channels_file: PathBuf,

    /// Truth that calorimeter energies and jet distances should be computed
    pub calo_association: bool,

    /// Smallest veto radius around hot spots and dead channels
    pub min_delta_r_for_fiducial_track: Float,
}
//
impl Default for Configuration {
    fn default() -> Self {
        Self {
            collections: Collections::default(),
            fiducial_maps: FiducialMaps::default(),
            masked_ecal_channel_status_threshold: 3,
            output_bad_ecal_channels: false,
            bad_ecal_channels_file: PathBuf::from("badEcalChannels.json"),
            calo_association: true,
            min_delta_r_for_fiducial_track: 0.05,
        }
    }
}
//
impl Configuration {
    /// Load the configuration from a file, check it, and log it
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read \"{}\"", path.display()))?;
        let config = Self::parse(&config_str)?;
        config.print();
        Ok(config)
    }

    /// Decode and check a configuration
    pub fn parse(config_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(config_str).wrap_err("Malformed configuration")?;

        // Negative thresholds would flag every channel of unknown status
        ensure!(
            config.masked_ecal_channel_status_threshold >= 0,
            "The masked ECAL channel status threshold must be positive"
        );

        ensure!(
            config.min_delta_r_for_fiducial_track > 0.,
            "The fiducial track veto radius must be strictly positive"
        );

        let all_sources = config
            .fiducial_maps
            .electrons
            .iter()
            .chain(&config.fiducial_maps.muons);
        for source in all_sources {
            ensure!(
                source.threshold_for_veto >= 0.,
                "Veto threshold of \"{}\" must be positive",
                source.hist_file.display()
            );
        }

        Ok(config)
    }

    /// Log the configuration
    pub fn print(&self) {
        let c = &self.collections;
        log::info!("tracks          : {}", c.tracks);
        log::info!("jets            : {}", c.jets);
        log::info!("mcparticles     : {}", c.mcparticles);
        log::info!("gsfTracks       : {}", c.gsf_tracks);
        log::info!("EBRecHits       : {}", c.eb_rec_hits);
        log::info!("EERecHits       : {}", c.ee_rec_hits);
        log::info!("HBHERecHits     : {}", c.hbhe_rec_hits);
        for (flavour, sources) in [
            ("electron", &self.fiducial_maps.electrons),
            ("muon", &self.fiducial_maps.muons),
        ] {
            for source in sources {
                log::info!(
                    "{flavour} map     : {} ({} / {}, {} sigma)",
                    source.hist_file.display(),
                    source.after_veto_hist_name,
                    source.before_veto_hist_name,
                    source.threshold_for_veto
                );
            }
        }
        log::info!(
            "maskedEcalChannelStatusThreshold : {}",
            self.masked_ecal_channel_status_threshold
        );
        log::info!("outputBadEcalChannels : {}", self.output_bad_ecal_channels);
        log::info!("caloAssociation : {}", self.calo_association);
        log::info!(
            "minDeltaRForFiducialTrack : {}",
            self.min_delta_r_for_fiducial_track
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Configuration::parse("").expect("Empty configuration is valid");
        assert_eq!(config, Configuration::default());
        assert!(config.calo_association);
        assert_eq!(config.min_delta_r_for_fiducial_track, 0.05);
        assert_eq!(config.bad_ecal_channels_file, Path::new("badEcalChannels.json"));
    }

    #[test]
    fn full_configuration() {
        let config = Configuration::parse(
            r#"
            masked_ecal_channel_status_threshold = 5
            output_bad_ecal_channels = true
            calo_association = false

            [collections]
            tracks = { label = "isolatedTracks" }
            jets = { label = "ak4PFJets", instance = "corrected" }
            mcparticles = { label = "genParticles" }
            gsf_tracks = { label = "electronGsfTracks" }
            eb_rec_hits = { label = "ecalRecHit", instance = "EcalRecHitsEB" }
            ee_rec_hits = { label = "ecalRecHit", instance = "EcalRecHitsEE" }
            hbhe_rec_hits = { label = "hbhereco" }

            [[fiducial_maps.electrons]]
            hist_file = "electronFiducialMap.json"
            before_veto_hist_name = "beforeVeto"
            after_veto_hist_name = "afterVeto"
            threshold_for_veto = 2.0
            "#,
        )
        .expect("Valid configuration");
        assert_eq!(config.masked_ecal_channel_status_threshold, 5);
        assert!(!config.calo_association);
        assert_eq!(config.collections.jets.instance, "corrected");
        assert_eq!(config.collections.tracks.instance, "");
        assert_eq!(config.fiducial_maps.electrons.len(), 1);
        assert!(config.fiducial_maps.muons.is_empty());
    }

    #[test]
    fn invalid_configurations() {
        for bad in [
            "masked_ecal_channel_status_threshold = -1",
            "min_delta_r_for_fiducial_track = 0.0",
            "unknown_option = 1",
            r#"
            [[fiducial_maps.muons]]
            hist_file = "muonFiducialMap.json"
            before_veto_hist_name = "beforeVeto"
            after_veto_hist_name = "afterVeto"
            threshold_for_veto = -2.0
            "#,
        ] {
            assert!(Configuration::parse(bad).is_err(), "{bad}");
        }
    }
}
