use std::collections::VecDeque;

use crate::window::SampleWindow;

/// Per-channel ring of the most recent `window_frames` samples plus their
/// timestamps. Concrete [`WindowSource`](crate::WindowSource) implementations
/// append incoming chunks here and serve the buffered content as a
/// [`SampleWindow`] once full.
pub struct SlidingWindowBuffer {
    channels: Vec<VecDeque<f32>>,
    timestamps: VecDeque<f64>,
    window_frames: usize,
}

impl SlidingWindowBuffer {
    pub fn new(n_channels: usize, window_frames: usize) -> Self {
        assert!(n_channels > 0, "at least one channel");
        assert!(window_frames > 0, "window must span at least one sample");
        Self {
            channels: (0..n_channels)
                .map(|_| VecDeque::with_capacity(window_frames))
                .collect(),
            timestamps: VecDeque::with_capacity(window_frames),
            window_frames,
        }
    }

    /// Append one time-sample (one value per channel), evicting the oldest
    /// sample once the window is full.
    pub fn push_frame(&mut self, frame: &[f32], timestamp: f64) {
        debug_assert_eq!(frame.len(), self.channels.len());
        for (ring, &value) in self.channels.iter_mut().zip(frame) {
            if ring.len() == self.window_frames {
                ring.pop_front();
            }
            ring.push_back(value);
        }
        if self.timestamps.len() == self.window_frames {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(timestamp);
    }

    /// Append a chunk of interleaved samples (frame-major: all channels of
    /// sample 0, then all channels of sample 1, ...).
    pub fn push_chunk(&mut self, frames: &[f32], timestamps: &[f64]) {
        let n = self.channels.len();
        debug_assert_eq!(frames.len(), timestamps.len() * n);
        for (i, &ts) in timestamps.iter().enumerate() {
            let row = &frames[i * n..(i + 1) * n];
            self.push_frame(row, ts);
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.timestamps.len() == self.window_frames
    }

    /// The buffered window, once enough samples have arrived.
    pub fn window(&self) -> Option<SampleWindow> {
        if !self.is_full() {
            return None;
        }
        let n = self.channels.len();
        let mut data = Vec::with_capacity(n * self.window_frames);
        for ring in &self.channels {
            data.extend(ring.iter().copied());
        }
        Some(SampleWindow::new(
            n,
            self.window_frames,
            data,
            self.timestamps.iter().copied().collect(),
        ))
    }
}
