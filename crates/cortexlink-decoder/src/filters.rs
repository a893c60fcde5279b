//! In-place preprocessing applied to each window before channel picking.
//!
//! Every stage sees the full, original channel layout: spatial filtering
//! mixes across channels that are not in the final pick list, so picking
//! happens strictly after this chain.

use cortexlink_stream::SampleWindow;

/// Re-write the recording reference: recover the old reference channel as
/// the negated new-reference signal, then subtract the new reference from
/// every other channel.
#[derive(Debug, Clone)]
pub struct Rereference {
    pub old: Option<usize>,
    pub new: usize,
}

impl Rereference {
    fn apply(&self, window: &mut SampleWindow) {
        let reference: Vec<f32> = window.channel(self.new).to_vec();
        if let Some(old) = self.old {
            for (sample, &r) in window.channel_mut(old).iter_mut().zip(&reference) {
                *sample = -r;
            }
        }
        for ch in 0..window.n_channels() {
            if Some(ch) == self.old {
                continue;
            }
            for (sample, &r) in window.channel_mut(ch).iter_mut().zip(&reference) {
                *sample -= r;
            }
        }
    }
}

/// Common average reference over a channel subset: subtract the subset mean
/// from each subset channel, per time sample.
fn common_average_reference(window: &mut SampleWindow, channels: &[usize]) {
    if channels.is_empty() {
        return;
    }
    let samples = window.n_samples();
    let mut mean = vec![0.0f32; samples];
    for &ch in channels {
        for (m, &s) in mean.iter_mut().zip(window.channel(ch)) {
            *m += s;
        }
    }
    let scale = 1.0 / channels.len() as f32;
    for m in mean.iter_mut() {
        *m *= scale;
    }
    for &ch in channels {
        for (sample, &m) in window.channel_mut(ch).iter_mut().zip(&mean) {
            *sample -= m;
        }
    }
}

/// Second-order IIR section (RBJ cookbook coefficients), run forward over a
/// channel with zero initial state. Windows overlap cycle-to-cycle, so each
/// application is stateless.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Biquad {
    /// Constant-peak-gain band-pass centered on the geometric mean of the
    /// band edges.
    pub fn bandpass(sample_rate: f64, low_hz: f64, high_hz: f64) -> Self {
        let f0 = (low_hz * high_hz).sqrt();
        let q = f0 / (high_hz - low_hz);
        let w0 = std::f64::consts::TAU * f0 / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (alpha / a0) as f32,
            b1: 0.0,
            b2: (-alpha / a0) as f32,
            a1: (-2.0 * w0.cos() / a0) as f32,
            a2: ((1.0 - alpha) / a0) as f32,
        }
    }

    pub fn notch(sample_rate: f64, center_hz: f64, q: f64) -> Self {
        let w0 = std::f64::consts::TAU * center_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        let cos_w0 = w0.cos();
        Self {
            b0: (1.0 / a0) as f32,
            b1: (-2.0 * cos_w0 / a0) as f32,
            b2: (1.0 / a0) as f32,
            a1: (-2.0 * cos_w0 / a0) as f32,
            a2: ((1.0 - alpha) / a0) as f32,
        }
    }

    /// Direct form II transposed.
    pub fn run(&self, samples: &mut [f32]) {
        let mut s1 = 0.0f32;
        let mut s2 = 0.0f32;
        for x in samples.iter_mut() {
            let y = self.b0 * *x + s1;
            s1 = self.b1 * *x - self.a1 * y + s2;
            s2 = self.b2 * *x - self.a2 * y;
            *x = y;
        }
    }
}

/// The full per-window preprocessing chain, in application order:
/// multiplier scaling, reference re-write, spatial common-average filter,
/// spectral band-pass, notch. Each filter is restricted to its configured
/// channel subset.
#[derive(Default)]
pub struct PreprocessChain {
    pub multiplier: Option<f32>,
    pub reference: Option<Rereference>,
    pub spatial_channels: Option<Vec<usize>>,
    pub spectral: Option<(Biquad, Vec<usize>)>,
    pub notch: Option<(Biquad, Vec<usize>)>,
}

impl PreprocessChain {
    pub fn apply(&self, window: &mut SampleWindow) {
        if let Some(multiplier) = self.multiplier {
            for ch in 0..window.n_channels() {
                for sample in window.channel_mut(ch) {
                    *sample *= multiplier;
                }
            }
        }
        if let Some(reference) = &self.reference {
            reference.apply(window);
        }
        if let Some(channels) = &self.spatial_channels {
            common_average_reference(window, channels);
        }
        if let Some((filter, channels)) = &self.spectral {
            for &ch in channels {
                filter.run(window.channel_mut(ch));
            }
        }
        if let Some((filter, channels)) = &self.notch {
            for &ch in channels {
                filter.run(window.channel_mut(ch));
            }
        }
    }
}
