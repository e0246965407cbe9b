//! Failure modes of the track production machinery
//!
//! Only the fatal cases are ever returned as errors. Recoverable conditions
//! (missing optional inputs, missing fiducial map sources, degenerate cell
//! geometry) are logged where they are detected and yield partial results.

use std::path::PathBuf;
use thiserror::Error;

/// Errors emitted by the geometry, conditions and event production layers
#[derive(Debug, Error)]
pub enum ProducerError {
    /// The geometry has no description of this calorimeter cell
    #[error("failed to access geometry for DetId: {raw}")]
    GeometryUnavailable {
        /// Packed identifier of the cell
        raw: u32,
    },

    /// A collection or record that is needed to produce meaningful results
    /// could not be found
    #[error("unable to find {what}")]
    MissingRequiredInput {
        /// Description of the missing input
        what: String,
    },

    /// A fiducial map histogram file or histogram could not be found
    #[error("no histogram named \"{name}\" in \"{}\"", file.display())]
    MissingHistogramSource {
        /// Histogram file which was searched
        file: PathBuf,

        /// Name of the histogram that was looked up
        name: String,
    },

    /// Two histograms which should share a binning do not
    #[error("histograms \"{0}\" and \"{1}\" have incompatible binnings")]
    IncompatibleBinning(String, String),

    /// Filesystem error
    #[error("I/O error on \"{}\"", path.display())]
    Io {
        /// File that was being accessed
        path: PathBuf,

        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON data
    #[error("malformed data in \"{}\"", path.display())]
    Json {
        /// File that was being decoded
        path: PathBuf,

        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}
