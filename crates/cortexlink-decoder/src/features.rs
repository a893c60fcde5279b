//! Feature extraction seam and the built-in band-power extractor.

use std::sync::Arc;

use cortexlink_stream::SampleWindow;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Shape of a feature frame: channels x frequency bins. Fixed for the
/// lifetime of a loaded model; determined once from a zero-filled probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub rows: usize,
    pub cols: usize,
}

impl FrameShape {
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One spectral summary of one window: channels x frequency bins, stored
/// channel-major so flattening is frequency-minor.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    data: Vec<f64>,
    shape: FrameShape,
}

impl FeatureFrame {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), rows * cols, "data is rows * cols");
        Self {
            data,
            shape: FrameShape { rows, cols },
        }
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.shape.cols + col]
    }

    /// The frame flattened channel-major, frequency-minor — the feature
    /// vector the classifier consumes.
    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }
}

/// Maps one preprocessed, channel-picked window to a feature frame of a
/// fixed shape. Implementations are pure functions over the window data.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, window: &SampleWindow) -> FeatureFrame;
}

/// Log band power per channel via a Hann-windowed FFT periodogram.
///
/// Output rows follow the window's channel order; columns follow the
/// configured band order.
pub struct BandPowerExtractor {
    sample_rate: f64,
    n_samples: usize,
    bands: Vec<(f64, f64)>,
    fft: Arc<dyn Fft<f32>>,
    hann: Vec<f32>,
}

impl BandPowerExtractor {
    pub fn new(sample_rate: f64, n_samples: usize, bands: Vec<(f64, f64)>) -> Self {
        assert!(n_samples > 1, "periodogram needs more than one sample");
        assert!(!bands.is_empty(), "at least one frequency band");
        let fft = FftPlanner::new().plan_fft_forward(n_samples);
        let hann = (0..n_samples)
            .map(|i| {
                let x = std::f32::consts::TAU * i as f32 / (n_samples - 1) as f32;
                0.5 - 0.5 * x.cos()
            })
            .collect();
        Self {
            sample_rate,
            n_samples,
            bands,
            fft,
            hann,
        }
    }

    pub fn n_bands(&self) -> usize {
        self.bands.len()
    }
}

impl FeatureExtractor for BandPowerExtractor {
    fn extract(&self, window: &SampleWindow) -> FeatureFrame {
        assert_eq!(
            window.n_samples(),
            self.n_samples,
            "window length does not match the planned FFT size"
        );
        let rows = window.n_channels();
        let cols = self.bands.len();
        let bin_hz = self.sample_rate / self.n_samples as f64;
        let norm = (self.n_samples * self.n_samples) as f64;

        let mut data = Vec::with_capacity(rows * cols);
        let mut spectrum: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); self.n_samples];

        for ch in 0..rows {
            for (slot, (&s, &w)) in spectrum
                .iter_mut()
                .zip(window.channel(ch).iter().zip(&self.hann))
            {
                *slot = Complex::new(s * w, 0.0);
            }
            self.fft.process(&mut spectrum);

            for &(low, high) in &self.bands {
                let mut acc = 0.0f64;
                let mut count = 0usize;
                for (k, bin) in spectrum.iter().enumerate().take(self.n_samples / 2 + 1) {
                    let freq = k as f64 * bin_hz;
                    if freq >= low && freq < high {
                        acc += bin.norm_sqr() as f64;
                        count += 1;
                    }
                }
                let power = if count > 0 {
                    acc / count as f64 / norm
                } else {
                    0.0
                };
                data.push((power + 1e-12).log10());
            }
        }

        FeatureFrame::new(rows, cols, data)
    }
}
