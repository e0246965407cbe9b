//! trackveto: calorimeter-associated track production with fiducial vetoes
//!
//!
//! # Introduction (for the physicist)
//!
//! Searches for disappearing tracks need to know, for each reconstructed
//! track, how much calorimeter energy surrounds it, how far it is from the
//! closest jet, and whether it points at a region of the detector where
//! leptons are known to escape identification. Such regions are either ECAL
//! crystals which are flagged as dead in the channel status database, or
//! "hot spots" of the electron and muon vetoes, which are found by comparing
//! the (eta, phi) distributions of probe tracks before and after the veto.
//!
//!
//! # Introduction (for the computer guy)
//!
//! The job proceeds as follows:
//!
//! * read in the configuration and extract the lepton veto hot spots
//! * for each run, build the dead ECAL channel map from the conditions
//! * for each event of the run (possibly in parallel), enrich the tracks with
//!     * calorimeter energy sums in a ΔR < 0.5 cone,
//!     * the distance to the closest good jet and GSF electron track,
//!     * fiducial flags and a generator-level match
//! * then store the produced tracks and a summary of the job.

#![warn(missing_docs)]

mod cellrange;
mod config;
mod detid;
mod error;
mod event;
mod fiducial;
mod geometry;
mod histogram;
mod kinematics;
mod numeric;
mod objects;
mod output;
mod producer;
mod scheduling;
mod status;
mod track;

use crate::{
    config::Configuration,
    event::{Conditions, Event},
    geometry::{CaloGeometry, IdealGeometry, TabulatedGeometry},
    producer::TrackProducer,
    scheduling::ProcessingSummary,
};
use clap::Parser;
use eyre::WrapErr;
use std::{path::PathBuf, sync::Arc, time::Instant};

/// We'll use eyre's type-erased result type throughout the application
type Result<T> = eyre::Result<T>;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "trackveto.toml")]
    config: PathBuf,

    /// Path to the input events (JSON)
    #[arg(short, long)]
    events: PathBuf,

    /// Path to the per-run conditions (JSON)
    #[arg(long)]
    conditions: PathBuf,

    /// Path to a tabulated calorimeter geometry (JSON). The ideal geometry is
    /// used if this is not specified.
    #[arg(short, long)]
    geometry: Option<PathBuf>,

    /// Where the produced tracks should be written (JSON)
    #[arg(short, long, default_value = "tracks.json")]
    output: PathBuf,
}

/// This will act as our main function, with suitable error handling
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // ### CONFIGURATION AND INPUT READOUT ###

    let cfg = Configuration::load(&args.config).wrap_err("Failed to load the configuration")?;

    let geometry: Arc<dyn CaloGeometry> = match &args.geometry {
        Some(path) => {
            let geometry = TabulatedGeometry::load(path).wrap_err("Failed to load the geometry")?;
            if geometry.is_empty() {
                log::warn!("The tabulated geometry does not describe any cell");
            }
            log::info!("Loaded a geometry of {} cells", geometry.len());
            Arc::new(geometry)
        }
        None => Arc::new(IdealGeometry),
    };
    let conditions =
        Conditions::load(&args.conditions).wrap_err("Failed to load the conditions")?;
    let mut events = Event::load_all(&args.events).wrap_err("Failed to load the events")?;
    log::info!("Loaded {} events", events.len());

    // ### PRODUCER INITIALIZATION ###

    // NOTE: We start the clock after input I/O, to avoid IO-induced timing
    //       fluctuations. Fiducial map extraction is part of the job.
    let saved_time = Instant::now();
    let mut producer = TrackProducer::new(cfg);
    log::info!(
        "Extracted {} electron and {} muon veto regions",
        producer.electron_vetoes().len(),
        producer.muon_vetoes().len()
    );

    // ### EVENT PROCESSING ###

    // Events are processed one run at a time, since the conditions of a run
    // must be known before any of its events can be processed
    let mut summary = ProcessingSummary::default();
    let mut remaining = &mut events[..];
    while let Some(first) = remaining.first() {
        let run = first.run;
        let run_len = remaining.iter().take_while(|e| e.run == run).count();
        let (run_events, rest) = std::mem::take(&mut remaining).split_at_mut(run_len);
        remaining = rest;

        let setup = conditions.setup_for(run, geometry.clone());
        let run_conditions = producer
            .begin_run(&setup)
            .wrap_err_with(|| format!("Failed to set up run {run}"))?;
        log::info!(
            "Processing {run_len} events of run {} with conditions snapshot {}",
            run_conditions.run,
            run_conditions.version
        );

        let producer = &producer;
        let run_summary = scheduling::process_events(run_events, |event| {
            producer.produce(event, &run_conditions)
        })
        .wrap_err_with(|| format!("Failed to process run {run}"))?;
        summary.merge(run_summary);
    }

    // ### RESULTS STORAGE ###

    let elapsed_time = saved_time.elapsed();
    output::dump_results(producer.config(), &events, &summary, elapsed_time, &args.output)
        .wrap_err("Failed to output the results")?;

    // ...and we're done
    Ok(())
}
