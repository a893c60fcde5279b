//! The decode cycle: window in, probability vector out.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cortexlink_foundation::{real_clock, SharedClock};
use cortexlink_stream::WindowSource;
use cortexlink_telemetry::DecodeMetrics;

use crate::buffer::FeatureFrameBuffer;
use crate::error::DecodeError;
use crate::features::FrameShape;
use crate::model::{DecoderModel, LabelSet};

/// Simulated per-cycle latency of the mock path, matching the measured cost
/// of spectral estimation plus classification on the reference hardware.
pub const MOCK_CYCLE_LATENCY: Duration = Duration::from_micros(62_500);

/// One probability vector per call. Implemented by the real [`Decoder`] and
/// by [`MockDecoder`]; the daemon worker is generic over this seam.
pub trait ProbabilityDecoder: Send {
    /// Label vocabulary, ordered like every returned probability vector.
    fn labels(&self) -> &LabelSet;

    /// Feature-frame shape, if this decoder computes frames at all.
    fn frame_shape(&self) -> Option<FrameShape>;

    /// True once the underlying stream has buffered a full window.
    fn is_ready(&self) -> bool;

    /// Run one decode cycle and return the class probabilities.
    fn next_probability(&mut self) -> Result<Vec<f64>, DecodeError>;

    /// The most recent feature frame, flattened channel-major. Reports
    /// [`DecodeError::BufferEmpty`] before the first completed cycle.
    fn latest_feature_frame(&self) -> Result<Vec<f64>, DecodeError>;
}

/// The real decode path: pulls windows from a [`WindowSource`], preprocesses
/// on the full channel layout, extracts one feature frame per cycle into the
/// rolling buffer, and classifies the newest frame.
pub struct Decoder {
    model: DecoderModel,
    source: Box<dyn WindowSource>,
    buffer: FeatureFrameBuffer,
    clock: SharedClock,
    metrics: Option<Arc<DecodeMetrics>>,
    ready_poll: Duration,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("ready_poll", &self.ready_poll)
            .finish_non_exhaustive()
    }
}

impl Decoder {
    /// Load the model artifact and bind it to the source. Fatal on a
    /// malformed artifact, unresolvable channels, or a sampling-rate
    /// mismatch between stream and model.
    pub fn new(
        artifact_path: &Path,
        source: Box<dyn WindowSource>,
        buffer_seconds: f64,
    ) -> Result<Self, DecodeError> {
        let model = DecoderModel::load(artifact_path, source.channel_names(), source.sample_rate())?;
        tracing::info!(
            rate = model.sample_rate,
            window_frames = model.window_frames,
            picks = model.picks.len(),
            labels = model.labels.len(),
            "decoder initialized"
        );
        Ok(Self {
            model,
            source,
            buffer: FeatureFrameBuffer::new(buffer_seconds),
            clock: real_clock(),
            metrics: None,
            ready_poll: Duration::from_millis(2),
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DecodeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn model(&self) -> &DecoderModel {
        &self.model
    }

    pub fn buffer(&self) -> &FeatureFrameBuffer {
        &self.buffer
    }

    /// The cycle's only suspension point: pull from the source until a full
    /// window is buffered.
    fn wait_for_window(&mut self) -> Result<(), DecodeError> {
        loop {
            self.source.acquire()?;
            if self.source.is_ready() {
                return Ok(());
            }
            self.clock.sleep(self.ready_poll);
        }
    }
}

impl ProbabilityDecoder for Decoder {
    fn labels(&self) -> &LabelSet {
        &self.model.labels
    }

    fn frame_shape(&self) -> Option<FrameShape> {
        Some(self.model.frame_shape)
    }

    fn is_ready(&self) -> bool {
        self.source.is_ready()
    }

    fn next_probability(&mut self) -> Result<Vec<f64>, DecodeError> {
        let started = Instant::now();

        self.wait_for_window()?;
        let mut window = self.source.window()?;

        // Filters run on the original channel layout; picking must wait
        // until spatial mixing has seen every channel.
        self.model.chain.apply(&mut window);
        let picked = window.select_channels(&self.model.picks);

        let frame = self.model.extractor.extract(&picked);
        self.buffer.push(frame, picked.leading_timestamp());

        let latest = self.buffer.latest().ok_or(DecodeError::BufferEmpty)?;
        let probs = self.model.classifier.predict_proba(latest.as_flat());

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(started.elapsed());
            metrics.update_buffer(self.buffer.len(), self.buffer.span());
        }
        Ok(probs)
    }

    fn latest_feature_frame(&self) -> Result<Vec<f64>, DecodeError> {
        self.buffer
            .latest()
            .map(|frame| frame.as_flat().to_vec())
            .ok_or(DecodeError::BufferEmpty)
    }
}

/// Hardware-free decode path: a biased pseudo-random distribution over a
/// caller-supplied label list, with a simulated compute delay so throughput
/// tests see realistic timing. Computes no feature frames.
pub struct MockDecoder {
    labels: LabelSet,
    rng: fastrand::Rng,
    latency: Duration,
    clock: SharedClock,
}

impl std::fmt::Debug for MockDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDecoder")
            .field("labels", &self.labels)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl MockDecoder {
    pub fn new(label_names: &[String]) -> Result<Self, DecodeError> {
        if label_names.len() < 2 {
            return Err(DecodeError::TooFewLabels(label_names.len()));
        }
        Ok(Self {
            labels: LabelSet::from_names(label_names),
            rng: fastrand::Rng::new(),
            latency: MOCK_CYCLE_LATENCY,
            clock: real_clock(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

impl ProbabilityDecoder for MockDecoder {
    fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn frame_shape(&self) -> Option<FrameShape> {
        None
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn next_probability(&mut self) -> Result<Vec<f64>, DecodeError> {
        // Biased likelihood for the first label; the remainder is split
        // evenly across the others.
        let first = self.rng.f64();
        let rest = (1.0 - first) / (self.labels.len() - 1) as f64;
        let mut probs = vec![rest; self.labels.len()];
        probs[0] = first;

        self.clock.sleep(self.latency);
        Ok(probs)
    }

    fn latest_feature_frame(&self) -> Result<Vec<f64>, DecodeError> {
        Err(DecodeError::BufferEmpty)
    }
}
