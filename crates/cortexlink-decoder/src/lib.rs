//! Online decoding engine.
//!
//! [`Decoder`] turns a streaming multichannel time series into spectral
//! feature frames and class-probability vectors, one window per cycle, while
//! maintaining a time-bounded rolling buffer of recent frames.
//! [`daemon::DecoderDaemon`] hosts a decoder in a detached worker process and
//! publishes results through a memory-mapped shared region so readers never
//! block on the decode loop.

pub mod buffer;
pub mod classifier;
pub mod daemon;
pub mod decoder;
pub mod error;
pub mod features;
pub mod filters;
pub mod model;
pub mod shm;

pub use buffer::FeatureFrameBuffer;
pub use classifier::{ClassifierModel, LinearClassifier};
pub use daemon::{
    build_decoder, run_worker, DaemonConfig, DaemonError, DecoderDaemon, DecoderSetup,
    SourceConfig, WorkerSpec,
};
pub use decoder::{Decoder, MockDecoder, ProbabilityDecoder};
pub use error::DecodeError;
pub use features::{BandPowerExtractor, FeatureExtractor, FeatureFrame, FrameShape};
pub use model::{DecoderModel, LabelSet, ModelArtifact};
pub use shm::{SharedResultRegion, ShmError};
