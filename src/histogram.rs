//! Two-dimensional histograms with per-bin uncertainties
//!
//! These follow the usual HEP conventions: each bin tracks the sum of the
//! weights that were filled into it and the sum of the squared weights, whose
//! square root is the bin's statistical uncertainty. Bins are addressed with
//! 0-based (x, y) indices and stored x-major, so scanning the storage in order
//! walks over y for each x in turn.

use crate::{
    error::ProducerError,
    numeric::{functions::*, Float},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Histogram axis with arbitrary (increasing) bin edges
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Bin edges, one more than the number of bins
    edges: Vec<Float>,
}
//
impl Axis {
    /// Axis with `num_bins` bins of equal width between `low` and `high`
    pub fn uniform(num_bins: usize, low: Float, high: Float) -> Self {
        assert!(num_bins > 0, "An axis needs at least one bin");
        assert!(high > low, "Axis bounds must be increasing");
        let width = (high - low) / num_bins as Float;
        let mut edges = (0..num_bins)
            .map(|i| low + i as Float * width)
            .collect::<Vec<_>>();
        edges.push(high);
        Self { edges }
    }

    /// Axis with explicit bin edges
    #[cfg(test)]
    pub fn variable(edges: Vec<Float>) -> Self {
        assert!(edges.len() >= 2, "An axis needs at least one bin");
        assert!(
            edges.windows(2).all(|w| w[1] > w[0]),
            "Bin edges must be strictly increasing"
        );
        Self { edges }
    }

    /// Number of bins
    pub fn num_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Width of a bin
    pub fn bin_width(&self, bin: usize) -> Float {
        self.edges[bin + 1] - self.edges[bin]
    }

    /// Centre of a bin
    pub fn bin_center(&self, bin: usize) -> Float {
        0.5 * (self.edges[bin] + self.edges[bin + 1])
    }

    /// Bin containing a coordinate, if it is within the axis range
    ///
    /// Bins include their lower edge and exclude their upper edge.
    ///
    pub fn find_bin(&self, x: Float) -> Option<usize> {
        if x.is_nan() || x < self.edges[0] || x >= self.edges[self.num_bins()] {
            return None;
        }
        // Index of the first edge which is strictly above x, minus one
        Some(self.edges.partition_point(|&edge| edge <= x) - 1)
    }
}

/// 2-D histogram of weights
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hist2D {
    /// Horizontal axis
    x: Axis,

    /// Vertical axis
    y: Axis,

    /// Sum of weights in each bin
    contents: Vec<Float>,

    /// Sum of squared weights in each bin
    ///
    /// Histograms which were written without uncertainties are assumed to be
    /// filled with unit weights, so that the errors are Poissonian.
    ///
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sumw2: Option<Vec<Float>>,
}
//
impl Hist2D {
    // ### CONSTRUCTION ###

    /// Build an empty histogram
    pub fn new(x: Axis, y: Axis) -> Self {
        let num_bins = x.num_bins() * y.num_bins();
        Self {
            x,
            y,
            contents: vec![0.; num_bins],
            sumw2: Some(vec![0.; num_bins]),
        }
    }

    /// Build a histogram from a function giving the content and uncertainty of
    /// each (x, y) bin
    pub fn from_fn(x: Axis, y: Axis, mut f: impl FnMut(usize, usize) -> (Float, Float)) -> Self {
        let mut result = Self::new(x, y);
        for i in 0..result.x.num_bins() {
            for j in 0..result.y.num_bins() {
                let (content, error) = f(i, j);
                result.set_bin(i, j, content, error);
            }
        }
        result
    }

    /// Check the internal consistency of a histogram that was deserialized
    fn validate(&self, name: &str) -> Result<(), String> {
        let edges_ok = |axis: &Axis| {
            axis.edges.len() >= 2 && axis.edges.windows(2).all(|w| w[1] > w[0])
        };
        if !edges_ok(&self.x) || !edges_ok(&self.y) {
            return Err(format!("histogram \"{name}\" has invalid bin edges"));
        }
        let num_bins = self.x.num_bins() * self.y.num_bins();
        if self.contents.len() != num_bins {
            return Err(format!(
                "histogram \"{name}\" has {} bin contents, expected {num_bins}",
                self.contents.len()
            ));
        }
        if let Some(sumw2) = &self.sumw2 {
            if sumw2.len() != num_bins {
                return Err(format!(
                    "histogram \"{name}\" has {} bin errors, expected {num_bins}",
                    sumw2.len()
                ));
            }
        }
        Ok(())
    }

    // ### ACCESSORS ###

    /// Horizontal axis
    pub fn x_axis(&self) -> &Axis {
        &self.x
    }

    /// Vertical axis
    pub fn y_axis(&self) -> &Axis {
        &self.y
    }

    /// Storage index of bin (i, j)
    fn index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.x.num_bins() && j < self.y.num_bins());
        i * self.y.num_bins() + j
    }

    /// Sum of weights in bin (i, j)
    pub fn bin_content(&self, i: usize, j: usize) -> Float {
        self.contents[self.index(i, j)]
    }

    /// Statistical uncertainty of bin (i, j)
    pub fn bin_error(&self, i: usize, j: usize) -> Float {
        let idx = self.index(i, j);
        match &self.sumw2 {
            Some(sumw2) => sqrt(sumw2[idx]),
            None => sqrt(abs(self.contents[idx])),
        }
    }

    /// Overwrite the content and uncertainty of bin (i, j)
    pub fn set_bin(&mut self, i: usize, j: usize, content: Float, error: Float) {
        let idx = self.index(i, j);
        self.contents[idx] = content;
        self.sumw2_mut()[idx] = error * error;
    }

    /// Sum of the weights of all bins
    pub fn integral(&self) -> Float {
        self.contents.iter().sum()
    }

    /// Truth that two histograms have the same binning
    pub fn same_binning(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Make the sum of squared weights explicit, if it was implicit
    fn sumw2_mut(&mut self) -> &mut Vec<Float> {
        let contents = &self.contents;
        self.sumw2
            .get_or_insert_with(|| contents.iter().map(|c| abs(*c)).collect())
    }

    // ### OPERATIONS ###

    /// Add a weighted entry at (x, y). Out-of-range entries are dropped.
    pub fn fill(&mut self, x: Float, y: Float, weight: Float) {
        if let (Some(i), Some(j)) = (self.x.find_bin(x), self.y.find_bin(y)) {
            let idx = self.index(i, j);
            self.sumw2_mut()[idx] += weight * weight;
            self.contents[idx] += weight;
        }
    }

    /// Bin-by-bin ratio of this histogram to another one
    ///
    /// Uncertainties are propagated as for uncorrelated quantities. Bins where
    /// the denominator is empty get a zero content and uncertainty.
    ///
    pub fn divide(&self, denominator: &Self) -> Option<Self> {
        if !self.same_binning(denominator) {
            return None;
        }
        Some(Self::from_fn(self.x.clone(), self.y.clone(), |i, j| {
            let (c1, e1) = (self.bin_content(i, j), self.bin_error(i, j));
            let (c2, e2) = (denominator.bin_content(i, j), denominator.bin_error(i, j));
            if c2 == 0. {
                return (0., 0.);
            }
            let c2_sq = c2 * c2;
            let err2 = (e1 * e1 * c2_sq + e2 * e2 * c1 * c1) / (c2_sq * c2_sq);
            (c1 / c2, sqrt(err2))
        }))
    }

    /// Iterate over all (i, j) bin indices, x-major
    pub fn bins(&self) -> impl Iterator<Item = (usize, usize)> {
        let (nx, ny) = (self.x.num_bins(), self.y.num_bins());
        (0..nx).flat_map(move |i| (0..ny).map(move |j| (i, j)))
    }
}

/// Collection of named histograms, as stored on disk
///
/// The on-disk format is a JSON object mapping histogram names to histograms.
///
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistogramFile {
    histograms: BTreeMap<String, Hist2D>,
}
//
impl HistogramFile {
    /// Load a histogram file
    ///
    /// Histograms are only checked for consistency when they are looked up,
    /// so that a broken histogram does not prevent using the other ones.
    ///
    pub fn load(path: &Path) -> Result<Self, ProducerError> {
        let file = File::open(path).map_err(|source| ProducerError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ProducerError::Json {
            path: path.to_owned(),
            source,
        })
    }

    /// Save the histograms to disk, replacing any previous file
    pub fn save(&self, path: &Path) -> Result<(), ProducerError> {
        let io_error = |source| ProducerError::Io {
            path: path.to_owned(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        serde_json::to_writer(&mut writer, self).map_err(|source| ProducerError::Json {
            path: path.to_owned(),
            source,
        })?;
        writer.flush().map_err(io_error)
    }

    /// Add a histogram, replacing any previous histogram with the same name
    pub fn insert(&mut self, name: impl Into<String>, hist: Hist2D) {
        self.histograms.insert(name.into(), hist);
    }

    /// Look up a histogram by name and check its consistency
    ///
    /// `path` is the file which the histograms were loaded from, it is only
    /// used for error reporting.
    ///
    pub fn get(&self, path: &Path, name: &str) -> Result<&Hist2D, ProducerError> {
        let hist =
            self.histograms
                .get(name)
                .ok_or_else(|| ProducerError::MissingHistogramSource {
                    file: path.to_owned(),
                    name: name.to_owned(),
                })?;
        hist.validate(name).map_err(|msg| ProducerError::Json {
            path: path.to_owned(),
            source: serde::de::Error::custom(msg),
        })?;
        Ok(hist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::TOLERANCE;

    #[test]
    fn axis_lookup() {
        let axis = Axis::uniform(4, -2., 2.);
        assert_eq!(axis.num_bins(), 4);
        assert_eq!(axis.find_bin(-2.), Some(0));
        assert_eq!(axis.find_bin(-0.5), Some(1));
        assert_eq!(axis.find_bin(0.), Some(2));
        assert_eq!(axis.find_bin(1.999), Some(3));
        assert_eq!(axis.find_bin(2.), None);
        assert_eq!(axis.find_bin(-2.1), None);
        assert_eq!(axis.find_bin(Float::NAN), None);
        assert_eq!(axis.bin_center(1), -0.5);
        assert_eq!(axis.bin_width(3), 1.);

        let axis = Axis::variable(vec![0., 1., 3.]);
        assert_eq!(axis.bin_width(1), 2.);
        assert_eq!(axis.bin_center(1), 2.);
        assert_eq!(axis.find_bin(2.5), Some(1));
    }

    #[test]
    fn fill_tracks_weights() {
        let mut h = Hist2D::new(Axis::uniform(2, 0., 2.), Axis::uniform(3, 0., 3.));
        h.fill(0.5, 2.5, 1.);
        h.fill(0.5, 2.5, 2.);
        h.fill(1.5, 0.5, 1.);
        h.fill(5., 0.5, 1.);
        assert_eq!(h.bin_content(0, 2), 3.);
        assert_eq!(h.bin_error(0, 2), sqrt(5.));
        assert_eq!(h.bin_content(1, 0), 1.);
        assert_eq!(h.integral(), 4.);
        assert_eq!(
            h.bins().collect::<Vec<_>>(),
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn division_propagates_errors() {
        let axis = || Axis::uniform(2, 0., 2.);
        let num = Hist2D::from_fn(axis(), Axis::uniform(1, 0., 1.), |i, _| {
            [(150., 12.), (5., 1.)][i]
        });
        let den = Hist2D::from_fn(axis(), Axis::uniform(1, 0., 1.), |i, _| {
            [(100., 10.), (0., 0.)][i]
        });
        let ratio = num.divide(&den).expect("Binnings match");
        assert_eq!(ratio.bin_content(0, 0), 1.5);
        let expected: Float = sqrt((144. * 1e4 + 100. * 22500.) / 1e8);
        assert!((ratio.bin_error(0, 0) - expected).abs() < TOLERANCE);
        assert_eq!(ratio.bin_content(1, 0), 0.);
        assert_eq!(ratio.bin_error(1, 0), 0.);

        let other = Hist2D::new(Axis::uniform(3, 0., 2.), Axis::uniform(1, 0., 1.));
        assert!(num.divide(&other).is_none());
    }

    #[test]
    fn implicit_errors_are_poissonian() {
        let json = r#"{
            "x": {"edges": [0, 1, 2]},
            "y": {"edges": [0, 1]},
            "contents": [4, 9]
        }"#;
        let h: Hist2D = serde_json::from_str(json).expect("Histogram should parse");
        h.validate("h").expect("Histogram should be consistent");
        assert_eq!(h.bin_error(0, 0), 2.);
        assert_eq!(h.bin_error(1, 0), 3.);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().expect("Temporary directory should be available");
        let path = dir.path().join("maps.json");
        let mut file = HistogramFile::default();
        let mut h = Hist2D::new(Axis::uniform(2, -1., 1.), Axis::uniform(2, -1., 1.));
        h.fill(0.5, -0.5, 2.);
        file.insert("occupancy", h.clone());
        file.save(&path).expect("Histograms should be written");

        let loaded = HistogramFile::load(&path).expect("Histograms should be read back");
        assert_eq!(loaded.get(&path, "occupancy").ok(), Some(&h));
        assert!(matches!(
            loaded.get(&path, "missing"),
            Err(ProducerError::MissingHistogramSource { .. })
        ));
    }

    #[test]
    fn inconsistent_histograms_are_rejected_on_lookup() {
        let dir = tempfile::tempdir().expect("Temporary directory should be available");
        let path = dir.path().join("broken.json");
        std::fs::write(
            &path,
            r#"{
                "broken": {"x": {"edges": [0, 1]}, "y": {"edges": [0, 1]}, "contents": [1, 2]},
                "good": {"x": {"edges": [0, 1]}, "y": {"edges": [0, 1]}, "contents": [3]}
            }"#,
        )
        .expect("Fixture should be written");
        let file = HistogramFile::load(&path).expect("Consistency is checked on lookup");
        assert!(matches!(
            file.get(&path, "broken"),
            Err(ProducerError::Json { .. })
        ));
        let good = file.get(&path, "good").expect("Other histograms are still usable");
        assert_eq!(good.bin_content(0, 0), 3.);

        std::fs::write(&path, "{").expect("Fixture should be written");
        assert!(matches!(
            HistogramFile::load(&path),
            Err(ProducerError::Json { .. })
        ));
    }
}
