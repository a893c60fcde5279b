use std::f64::consts::TAU;
use std::time::Duration;

use cortexlink_foundation::{real_clock, SharedClock};
use serde::{Deserialize, Serialize};

use crate::sliding::SlidingWindowBuffer;
use crate::source::{StreamError, WindowSource};
use crate::window::SampleWindow;

/// Configuration for the simulated stream. Serializable so it can cross the
/// daemon's process boundary as plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    pub sample_rate: f64,
    pub channel_names: Vec<String>,
    /// Samples generated per `acquire` call.
    pub step_frames: usize,
    pub amplitude: f32,
    pub noise: f32,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
    /// Sleep each acquire to real-time cadence instead of free-running.
    pub pace: bool,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            sample_rate: 512.0,
            channel_names: ["Fp1", "Fp2", "C3", "Cz", "C4", "P3", "P4", "O1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            step_frames: 32,
            amplitude: 10.0,
            noise: 2.0,
            seed: None,
            pace: false,
        }
    }
}

/// Synthetic sinusoid-plus-noise source. Channel `i` carries a tone at
/// `8 + 2i` Hz so spectral features differ per channel; timestamps advance by
/// exactly one sample period per generated sample.
pub struct SimulatedSource {
    cfg: SimulatedConfig,
    buffer: SlidingWindowBuffer,
    clock: SharedClock,
    rng: fastrand::Rng,
    sample_index: u64,
    scratch: Vec<f32>,
}

impl SimulatedSource {
    pub fn new(cfg: SimulatedConfig, window_frames: usize) -> Self {
        let n = cfg.channel_names.len();
        let rng = match cfg.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            buffer: SlidingWindowBuffer::new(n, window_frames),
            clock: real_clock(),
            rng,
            sample_index: 0,
            scratch: Vec::with_capacity(n),
            cfg,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

impl WindowSource for SimulatedSource {
    fn sample_rate(&self) -> f64 {
        self.cfg.sample_rate
    }

    fn channel_names(&self) -> &[String] {
        &self.cfg.channel_names
    }

    fn is_ready(&self) -> bool {
        self.buffer.is_full()
    }

    fn acquire(&mut self) -> Result<(), StreamError> {
        let n = self.cfg.channel_names.len();
        for _ in 0..self.cfg.step_frames {
            let t = self.sample_index as f64 / self.cfg.sample_rate;
            self.scratch.clear();
            for ch in 0..n {
                let tone_hz = 8.0 + 2.0 * ch as f64;
                let tone = self.cfg.amplitude * (TAU * tone_hz * t).sin() as f32;
                let noise = self.cfg.noise * (self.rng.f32() * 2.0 - 1.0);
                self.scratch.push(tone + noise);
            }
            self.buffer.push_frame(&self.scratch, t);
            self.sample_index += 1;
        }
        if self.cfg.pace {
            self.clock.sleep(Duration::from_secs_f64(
                self.cfg.step_frames as f64 / self.cfg.sample_rate,
            ));
        }
        Ok(())
    }

    fn window(&mut self) -> Result<SampleWindow, StreamError> {
        self.buffer.window().ok_or(StreamError::NotReady)
    }
}
