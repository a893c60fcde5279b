use std::path::PathBuf;

use cortexlink_stream::StreamError;
use thiserror::Error;

/// Errors from model loading and the decode cycle.
///
/// Configuration errors (`ArtifactIo`, `ArtifactFormat`, `ModelInvalid`,
/// `SampleRateMismatch`, `TooFewLabels`) are fatal at construction time and
/// never retried. `BufferEmpty` is the distinct buffer-underrun condition
/// reported when a feature frame is requested before the first cycle.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read model artifact {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model artifact {path}: {source}")]
    ArtifactFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model rejected: {0}")]
    ModelInvalid(String),

    #[error("stream sampling rate {stream:.1} Hz does not match model rate {model:.1} Hz")]
    SampleRateMismatch { stream: f64, model: f64 },

    #[error("mock decoder needs at least two labels, got {0}")]
    TooFewLabels(usize),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("no feature frame has been computed yet")]
    BufferEmpty,
}
