//! Fiducial maps: regions of the detector where leptons are not vetoed well
//!
//! Each map is derived from a pair of (eta, phi) histograms of probe tracks,
//! before and after a lepton veto is applied. The ratio of the two is a veto
//! inefficiency. Bins where it is significantly larger than its average over
//! the detector are "hot spots", and tracks pointing at them are considered
//! non-fiducial.

use crate::{
    error::ProducerError,
    histogram::{Hist2D, HistogramFile},
    kinematics::{self, Direction},
    numeric::{functions::*, Float},
};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

/// A flagged region of the detector
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EtaPhi {
    /// Pseudorapidity of the bin centre
    pub eta: Float,

    /// Azimuth of the bin centre
    pub phi: Float,

    /// Excess of the bin over the mean, in standard deviations
    pub sigma: Float,
}
//
impl EtaPhi {
    /// Total lexicographic order on (eta, phi)
    pub fn cmp_eta_phi(&self, other: &Self) -> Ordering {
        self.eta
            .total_cmp(&other.eta)
            .then_with(|| self.phi.total_cmp(&other.phi))
    }
}

impl Direction for EtaPhi {
    fn eta(&self) -> Float {
        self.eta
    }

    fn phi(&self) -> Float {
        self.phi
    }
}

/// List of flagged regions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EtaPhiList {
    /// Flagged regions
    points: Vec<EtaPhi>,

    /// Largest half-diagonal of the histogram bins that were scanned
    ///
    /// A track closer than this to a flagged bin centre may be inside of that
    /// bin, so this is the smallest meaningful veto radius.
    ///
    min_delta_r: Float,
}
//
impl EtaPhiList {
    /// Flagged regions
    pub fn points(&self) -> &[EtaPhi] {
        &self.points
    }

    /// Smallest meaningful veto radius
    pub fn min_delta_r(&self) -> Float {
        self.min_delta_r
    }

    /// Number of flagged regions
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Truth that no region was flagged
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a flagged region
    pub fn push(&mut self, point: EtaPhi) {
        self.points.push(point);
    }

    /// Take a bin radius into account. The veto radius can only grow.
    pub fn update_min_delta_r(&mut self, bin_radius: Float) {
        if self.min_delta_r < bin_radius {
            self.min_delta_r = bin_radius;
        }
    }

    /// Sort the flagged regions by increasing eta, then phi
    pub fn sort(&mut self) {
        self.points.sort_by(EtaPhi::cmp_eta_phi);
    }

    /// Truth that a direction falls within the veto radius of a flagged region
    ///
    /// The veto radius is the largest of `min_delta_r` and of the bin radius
    /// of the source histograms. The list must have been sorted.
    ///
    pub fn is_vetoed(&self, direction: &impl Direction, min_delta_r: Float) -> bool {
        let max_dr = min_delta_r.max(self.min_delta_r);
        let max_dr2 = sqr(max_dr);
        let eta = direction.eta();
        debug_assert!(self
            .points
            .windows(2)
            .all(|w| w[0].cmp_eta_phi(&w[1]) != Ordering::Greater));

        // Points with eta below eta - max_dr cannot be in range, and once eta
        // goes past eta + max_dr no later point can be in range either
        let start = self.points.partition_point(|p| p.eta < eta - max_dr);
        self.points[start..]
            .iter()
            .take_while(|p| p.eta <= eta + max_dr)
            .any(|p| kinematics::delta_r2(direction, p) < max_dr2)
    }
}

/// Where to find the histograms of one fiducial map
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiducialMapSource {
    /// Histogram file
    pub hist_file: PathBuf,

    /// Name of the probe histogram before the lepton veto
    pub before_veto_hist_name: String,

    /// Name of the probe histogram after the lepton veto
    pub after_veto_hist_name: String,

    /// Significance above which a bin is flagged, in standard deviations
    pub threshold_for_veto: Float,
}

/// Average veto inefficiency over the detector, with its uncertainty
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeanEfficiency {
    /// Ratio of the after-veto to the before-veto totals
    pub mean: Float,

    /// Uncertainty on the mean
    pub error: Float,
}

/// Decide whether a bin lies above the mean by more than the threshold
///
/// The comparison is strict: a bin exactly at the threshold is not flagged.
///
pub fn exceeds_threshold(excess: Float, threshold: Float, combined_error: Float) -> bool {
    excess > threshold * combined_error
}

/// Compute the mean efficiency over the bins which are populated before veto
///
/// Every bin, populated or not, contributes its half-diagonal to the veto
/// radius of `veto_list`.
///
pub fn mean_efficiency(
    before: &Hist2D,
    after: &Hist2D,
    veto_list: &mut EtaPhiList,
) -> MeanEfficiency {
    let (x_axis, y_axis) = (before.x_axis(), before.y_axis());
    let (mut a, mut b, mut a_err2, mut b_err2): (Float, Float, Float, Float) = (0., 0., 0., 0.);
    for (i, j) in before.bins() {
        let bin_radius = (0.5 * x_axis.bin_width(i)).hypot(0.5 * y_axis.bin_width(j));
        veto_list.update_min_delta_r(bin_radius);

        let content_before = before.bin_content(i, j);
        if content_before == 0. {
            continue;
        }
        let error_before = before.bin_error(i, j);
        let content_after = after.bin_content(i, j);
        let error_after = after.bin_error(i, j);

        a += content_after;
        b += content_before;
        a_err2 += sqr(error_after);
        b_err2 += sqr(error_before);
    }

    let mean = a / b;
    let error = mean * (sqrt(a_err2) / a).hypot(sqrt(b_err2) / b);
    MeanEfficiency { mean, error }
}

/// Summary of one fiducial map extraction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractionReport {
    /// Mean veto inefficiency
    pub mean: MeanEfficiency,

    /// Number of bins which were flagged
    pub num_flagged: usize,
}

/// Flag the bins of a before/after histogram pair which are significantly
/// above the mean, appending them to `veto_list` in bin order
///
/// Fails only if the two histograms do not share a binning.
///
pub fn extract(
    before: &Hist2D,
    after: &Hist2D,
    threshold: Float,
    veto_list: &mut EtaPhiList,
) -> Result<ExtractionReport, ProducerError> {
    let incompatible = || {
        ProducerError::IncompatibleBinning("before veto".to_owned(), "after veto".to_owned())
    };
    if !before.same_binning(after) {
        return Err(incompatible());
    }

    // First, the mean efficiency and its error
    let mean = mean_efficiency(before, after, veto_list);

    // Then, the bins which are above the mean by more than the threshold
    let ratio = after.divide(before).ok_or_else(incompatible)?;
    let mut num_flagged = 0;
    for (i, j) in ratio.bins() {
        let content = ratio.bin_content(i, j);
        let combined_error = ratio.bin_error(i, j).hypot(mean.error);
        let eta = ratio.x_axis().bin_center(i);
        let phi = ratio.y_axis().bin_center(j);
        let excess = content - mean.mean;
        let sigma = excess / combined_error;

        let hot = exceeds_threshold(excess, threshold, combined_error);
        if hot {
            veto_list.push(EtaPhi { eta, phi, sigma });
            num_flagged += 1;
        }
        if content != 0. {
            log::debug!(
                "({eta:>10.4}, {phi:>10.4}): {sigma:>10.4} sigma above mean of {:>10.6}{}",
                mean.mean,
                if hot { " * HOT SPOT *" } else { "" }
            );
        }
    }

    Ok(ExtractionReport { mean, num_flagged })
}

/// Load the histograms of a fiducial map source and extract its hot spots
///
/// Missing or malformed files and histograms are not fatal: the job should
/// still be able to run with partial fiducial maps, so these are reported and
/// the source is skipped.
///
pub fn extract_from_source(
    source: &FiducialMapSource,
    veto_list: &mut EtaPhiList,
) -> Option<ExtractionReport> {
    match try_extract_from_source(source, veto_list) {
        Ok(report) => {
            log::info!(
                "Extracted {} veto regions from \"{}\" (mean {} ± {})",
                report.num_flagged,
                source.hist_file.display(),
                report.mean.mean,
                report.mean.error
            );
            Some(report)
        }
        Err(e) => {
            log::warn!("{e}. Skipping...");
            None
        }
    }
}

/// Fallible part of `extract_from_source`
fn try_extract_from_source(
    source: &FiducialMapSource,
    veto_list: &mut EtaPhiList,
) -> Result<ExtractionReport, ProducerError> {
    let file = HistogramFile::load(&source.hist_file)?;
    let before = file.get(&source.hist_file, &source.before_veto_hist_name)?;
    let after = file.get(&source.hist_file, &source.after_veto_hist_name)?;
    extract(before, after, source.threshold_for_veto, veto_list).map_err(|_| {
        ProducerError::IncompatibleBinning(
            source.before_veto_hist_name.clone(),
            source.after_veto_hist_name.clone(),
        )
    })
}

/// Build the sorted veto list of one lepton flavour from all of its sources
pub fn build_veto_list(flavour: &str, sources: &[FiducialMapSource]) -> EtaPhiList {
    let mut veto_list = EtaPhiList::default();
    for source in sources {
        log::info!(
            "Calculating {flavour} veto regions in (eta, phi) from \"{}\"...",
            display_path(&source.hist_file)
        );
        extract_from_source(source, &mut veto_list);
    }
    veto_list.sort();

    if veto_list.is_empty() {
        log::info!("No {flavour} veto regions");
        return veto_list;
    }
    let mut summary = format!(
        "{flavour} veto regions in (eta, phi), vetoed within {:.4}:",
        veto_list.min_delta_r()
    );
    for point in veto_list.points() {
        summary.push_str(&format!("\n({:>10.4},{:>10.4})", point.eta, point.phi));
    }
    log::info!("{summary}");
    veto_list
}

/// Shorten a path for display, keeping only its file name when possible
fn display_path(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
