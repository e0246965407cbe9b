//! Production of the enriched track collection, one event at a time

use crate::{
    config::Configuration,
    error::ProducerError,
    event::{Event, EventSetup, InputTag},
    fiducial::{self, EtaPhiList},
    geometry::CaloGeometry,
    kinematics::Direction,
    objects::{Candidate, GsfTrack, InputTrack, Jet, McParticle, RecHit},
    status::{self, ChannelStatusMap, ChannelStatusMapBuilder},
    track::Track,
};
use std::sync::Arc;

/// Immutable snapshot of the per-run state needed to process events
///
/// It is built once at the beginning of each run, then shared by all the
/// events of the run, which may be processed concurrently.
///
pub struct RunConditions {
    /// Run number
    pub run: u32,

    /// Number of snapshots which were built in this job, this one included
    pub version: u64,

    /// ECAL channels whose masked status reaches the configured threshold
    pub dead_channels: ChannelStatusMap,

    /// Calorimeter geometry
    pub geometry: Arc<dyn CaloGeometry>,
}

/// Producer of enriched tracks
pub struct TrackProducer {
    /// Configuration
    config: Configuration,

    /// Hot spots of the electron veto
    electron_vetoes: EtaPhiList,

    /// Hot spots of the muon veto
    muon_vetoes: EtaPhiList,

    /// Number of run condition snapshots built so far
    num_snapshots: u64,

    /// Truth that the dead ECAL channel histogram was written
    diagnostic_written: bool,
}
//
impl TrackProducer {
    /// Set up the producer, extracting the fiducial maps
    pub fn new(config: Configuration) -> Self {
        let electron_vetoes =
            fiducial::build_veto_list("electron", &config.fiducial_maps.electrons);
        let muon_vetoes = fiducial::build_veto_list("muon", &config.fiducial_maps.muons);
        Self {
            config,
            electron_vetoes,
            muon_vetoes,
            num_snapshots: 0,
            diagnostic_written: false,
        }
    }

    /// Configuration of the producer
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Hot spots of the electron veto
    pub fn electron_vetoes(&self) -> &EtaPhiList {
        &self.electron_vetoes
    }

    /// Hot spots of the muon veto
    pub fn muon_vetoes(&self) -> &EtaPhiList {
        &self.muon_vetoes
    }

    /// Build the conditions snapshot of a new run
    ///
    /// Fails if the channel status or the geometry of the ECAL is incomplete.
    /// The dead channel histogram, if requested, is only written for the
    /// first run of the job.
    ///
    pub fn begin_run(&mut self, setup: &EventSetup) -> Result<Arc<RunConditions>, ProducerError> {
        let channel_status =
            setup
                .channel_status
                .as_ref()
                .ok_or_else(|| ProducerError::MissingRequiredInput {
                    what: format!("ECAL channel status for run {}", setup.run),
                })?;
        if channel_status.is_empty() {
            log::warn!("Run {}: the ECAL channel status table is empty", setup.run);
        }

        let emit_diagnostic = self.config.output_bad_ecal_channels && !self.diagnostic_written;
        let builder = ChannelStatusMapBuilder::new(
            self.config.masked_ecal_channel_status_threshold,
            emit_diagnostic,
        );
        let build = builder.build(channel_status, setup.geometry.as_ref())?;
        let num_barrel = build
            .map
            .iter()
            .filter(|(_, entry)| entry.status.discriminator() == 1)
            .count();
        if build.map.is_empty() {
            log::info!("Run {}: no dead ECAL channel", setup.run);
        } else {
            log::info!(
                "Run {}: {} dead ECAL channels out of {} with a known status \
                 ({} barrel, {} endcap)",
                setup.run,
                build.map.len(),
                channel_status.len(),
                num_barrel,
                build.map.len() - num_barrel
            );
        }

        if let Some(hist) = build.diagnostic {
            let path = &self.config.bad_ecal_channels_file;
            match status::write_diagnostic(&hist, path) {
                Ok(()) => log::info!(
                    "{} dead ECAL channels written to \"{}\"",
                    hist.integral(),
                    path.display()
                ),
                Err(e) => log::warn!("Failed to write dead ECAL channels: {e}"),
            }
            self.diagnostic_written = true;
        }

        self.num_snapshots += 1;
        Ok(Arc::new(RunConditions {
            run: setup.run,
            version: self.num_snapshots,
            dead_channels: build.map,
            geometry: setup.geometry.clone(),
        }))
    }

    /// Produce the enriched tracks of an event
    ///
    /// Returns the number of tracks which were produced, or None if the event
    /// has no track collection. In that case, nothing is stored in the event.
    ///
    /// Fails if calorimeter association is enabled and the rec-hits are
    /// missing, or if a rec-hit cannot be located.
    ///
    pub fn produce(
        &self,
        event: &mut Event,
        conditions: &RunConditions,
    ) -> Result<Option<usize>, ProducerError> {
        let cfg = &self.config;
        let collections = &cfg.collections;
        let Some(candidates) = event.get::<Vec<InputTrack>>(&collections.tracks) else {
            log::warn!(
                "Run {}, event {}: no track collection \"{}\", skipping",
                event.run,
                event.event,
                collections.tracks
            );
            return Ok(None);
        };

        let gsf_tracks = event.get::<Vec<GsfTrack>>(&collections.gsf_tracks);
        let mc_particles = if event.is_real_data {
            None
        } else {
            event.get::<Vec<McParticle>>(&collections.mcparticles)
        };
        let calo_inputs = if cfg.calo_association {
            Some(self.calo_inputs(event)?)
        } else {
            None
        };

        let mut tracks = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut track = Track::new(candidate.clone());
            track.set_fiducial_flags(
                &self.electron_vetoes,
                &self.muon_vetoes,
                &conditions.dead_channels,
                cfg.min_delta_r_for_fiducial_track,
            );
            if let Some(gsf_tracks) = gsf_tracks {
                track.set_gsf_tracks(gsf_tracks);
            }
            if let Some(mc_particles) = mc_particles {
                track.set_gen_match(mc_particles);
            }
            if let Some(calo) = &calo_inputs {
                if let Some(jets) = calo.jets {
                    track.set_jets(jets);
                }
                track.set_calo_energies(
                    conditions.geometry.as_ref(),
                    &[calo.eb_rec_hits, calo.ee_rec_hits],
                    calo.hbhe_rec_hits,
                )?;
            }
            log::debug!(
                "Track (pt {:.2}, eta {:.3}, phi {:.3}, q {}): calo {:.2} GeV, \
                 fiducial e/mu/ecal {}/{}/{}",
                track.candidate.pt(),
                track.candidate.eta(),
                track.candidate.phi(),
                track.candidate.charge(),
                track.calo_new_drp5(),
                track.is_fiducial_electron_track,
                track.is_fiducial_muon_track,
                track.is_fiducial_ecal_track
            );
            tracks.push(track);
        }

        let num_tracks = tracks.len();
        let instance = collections.tracks.instance.clone();
        event.put(instance, tracks);
        Ok(Some(num_tracks))
    }

    /// Gather the collections needed for calorimeter association
    fn calo_inputs<'event>(
        &self,
        event: &'event Event,
    ) -> Result<CaloInputs<'event>, ProducerError> {
        let collections = &self.config.collections;
        let rec_hits = |tag: &InputTag| {
            event
                .get::<Vec<RecHit>>(tag)
                .map(Vec::as_slice)
                .ok_or_else(|| ProducerError::MissingRequiredInput {
                    what: format!("rec-hits \"{tag}\""),
                })
        };
        let jets = event.get::<Vec<Jet>>(&collections.jets).map(Vec::as_slice);
        if jets.is_none() {
            log::warn!(
                "Run {}, event {}: no jet collection \"{}\"",
                event.run,
                event.event,
                collections.jets
            );
        }
        Ok(CaloInputs {
            jets,
            eb_rec_hits: rec_hits(&collections.eb_rec_hits)?,
            ee_rec_hits: rec_hits(&collections.ee_rec_hits)?,
            hbhe_rec_hits: rec_hits(&collections.hbhe_rec_hits)?,
        })
    }
}

/// Event collections used by calorimeter association
struct CaloInputs<'event> {
    jets: Option<&'event [Jet]>,
    eb_rec_hits: &'event [RecHit],
    ee_rec_hits: &'event [RecHit],
    hbhe_rec_hits: &'event [RecHit],
}
