//! This module is in charge of outputting the produced tracks and a summary
//! of the processing to the log and to disk

use crate::{
    config::Configuration,
    event::Event,
    numeric::Float,
    objects::InputTrack,
    scheduling::ProcessingSummary,
    track::Track,
};
use eyre::WrapErr;
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Produced tracks of one event, as written to disk
#[derive(Serialize)]
struct ProducedEvent<'event> {
    run: u32,
    event: u64,
    tracks: &'event [Track<InputTrack>],
}

/// Output the produced tracks and the processing summary
///
/// The tracks go to `output_path` as JSON, the summary goes to a text file
/// next to it. Events that were skipped are not written.
///
pub fn dump_results(
    cfg: &Configuration,
    events: &[Event],
    summary: &ProcessingSummary,
    elapsed_time: Duration,
    output_path: &Path,
) -> crate::Result<()> {
    // Compute a timestamp of when the job ended
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .wrap_err("Failed to format the timestamp")?;

    // Log the main figures
    log::info!(
        "Processed {} events ({} skipped), producing {} tracks in {:.3}s",
        summary.num_events,
        summary.num_skipped_events,
        summary.num_tracks,
        elapsed_time.as_secs_f64()
    );

    // Write the produced tracks
    {
        let instance = &cfg.collections.tracks.instance;
        let produced = events
            .iter()
            .filter_map(|event| {
                event.produced(instance).map(|tracks| ProducedEvent {
                    run: event.run,
                    event: event.event,
                    tracks,
                })
            })
            .collect::<Vec<_>>();
        let file = File::create(output_path)
            .wrap_err_with(|| format!("Failed to create \"{}\"", output_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &produced)
            .wrap_err("Failed to serialize the produced tracks")?;
        writer.flush()?;
    }

    // Write the processing summary
    {
        let summary_path = summary_path(output_path);
        let mut sum_file = File::create(&summary_path)
            .wrap_err_with(|| format!("Failed to create \"{}\"", summary_path.display()))?;
        let sum_file = &mut sum_file;

        writeln!(sum_file, "{timestamp}")?;
        write_entry(sum_file, "Events processed", summary.num_events)?;
        write_entry(sum_file, "Events without tracks", summary.num_skipped_events)?;
        write_entry(sum_file, "Tracks produced", summary.num_tracks)?;
        let elapsed_secs = elapsed_time.as_secs_f64();
        write_entry(sum_file, "Elapsed time (s)", elapsed_secs)?;
        if summary.num_events > 0 {
            let secs_per_ev = elapsed_secs / summary.num_events as f64;
            write_entry(sum_file, "Elapsed time per event (s)", secs_per_ev)?;
        }
        writeln!(sum_file, "---------------------------------------------")?;
        write_entry(sum_file, "Track collection", &cfg.collections.tracks)?;
        write_entry(sum_file, "Calorimeter association", cfg.calo_association)?;
        write_entry(
            sum_file,
            "Masked ECAL status threshold",
            cfg.masked_ecal_channel_status_threshold,
        )?;
        let min_dr: Float = cfg.min_delta_r_for_fiducial_track;
        write_entry(sum_file, "Fiducial track veto radius", min_dr)?;
    }

    // ...and we're done
    Ok(())
}

/// Where the summary of a job which writes tracks to `output_path` goes
pub fn summary_path(output_path: &Path) -> PathBuf {
    output_path.with_extension("summary")
}

/// Write a labeled value, with the values aligned in a column
fn write_entry(file: &mut File, label: &str, value: impl std::fmt::Display) -> std::io::Result<()> {
    writeln!(file, " {label:<30} : {value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event::Product, objects::RecoTrack};

    #[test]
    fn output_files() {
        let dir = tempfile::tempdir().expect("Temporary directory should be available");
        let output_path = dir.path().join("tracks.json");
        let cfg = Configuration::default();

        let mut produced = Event::new(1, 10, false);
        produced.insert(cfg.collections.tracks.clone(), Product::Tracks(Vec::new()));
        produced.put(
            "",
            vec![Track::new(InputTrack::Generic(RecoTrack {
                pt: 20.,
                eta: 0.1,
                phi: 0.2,
                charge: 1,
                num_valid_hits: 9,
            }))],
        );
        let skipped = Event::new(1, 11, false);
        let summary = ProcessingSummary {
            num_events: 2,
            num_skipped_events: 1,
            num_tracks: 1,
        };

        dump_results(
            &cfg,
            &[produced, skipped],
            &summary,
            Duration::from_millis(20),
            &output_path,
        )
        .expect("Output should be written");

        let tracks: serde_json::Value = serde_json::from_reader(
            File::open(&output_path).expect("Track file should exist"),
        )
        .expect("Track file should be valid JSON");
        let tracks = tracks.as_array().expect("Track file holds a list of events");
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0]["event"], 10);
        assert_eq!(tracks[0]["tracks"][0]["candidate"]["pt"], 20.);

        let summary_text = std::fs::read_to_string(summary_path(&output_path))
            .expect("Summary file should exist");
        assert!(summary_text.contains("Events processed"));
        assert!(summary_text.lines().any(|l| l.ends_with(": 2")));
    }
}
