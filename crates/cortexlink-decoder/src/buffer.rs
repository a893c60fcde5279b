//! Rolling, time-bounded buffer of feature frames.

use std::collections::VecDeque;

use crate::features::FeatureFrame;

/// Insertion-ordered feature frames with a parallel sequence of leading
/// timestamps. After every push the buffered span is trimmed to
/// `retain_seconds` behind the newest timestamp, using a sorted search from
/// the front rather than a linear scan.
///
/// The retention window keys off the newest frame's *leading* timestamp, so
/// the retained span is approximate to within one cycle step at the
/// boundary. Timestamps are strictly increasing by contract of the window
/// source; the buffer does not re-check this.
pub struct FeatureFrameBuffer {
    frames: VecDeque<FeatureFrame>,
    timestamps: VecDeque<f64>,
    retain_seconds: f64,
}

impl FeatureFrameBuffer {
    pub fn new(retain_seconds: f64) -> Self {
        assert!(retain_seconds > 0.0, "retention must be positive");
        Self {
            frames: VecDeque::new(),
            timestamps: VecDeque::new(),
            retain_seconds,
        }
    }

    /// Append a frame keyed by its window's leading timestamp, then evict
    /// everything more than `retain_seconds` older than it.
    pub fn push(&mut self, frame: FeatureFrame, timestamp: f64) {
        self.frames.push_back(frame);
        self.timestamps.push_back(timestamp);

        let oldest = self.timestamps[0];
        if timestamp - oldest > self.retain_seconds {
            let cutoff = timestamp - self.retain_seconds;
            let first_kept = self.timestamps.partition_point(|&t| t < cutoff);
            if first_kept > 0 {
                self.frames.drain(..first_kept);
                self.timestamps.drain(..first_kept);
            }
        }
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.frames.len(), self.timestamps.len());
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn latest(&self) -> Option<&FeatureFrame> {
        self.frames.back()
    }

    pub fn oldest_timestamp(&self) -> Option<f64> {
        self.timestamps.front().copied()
    }

    pub fn newest_timestamp(&self) -> Option<f64> {
        self.timestamps.back().copied()
    }

    /// Newest minus oldest buffered timestamp; zero when fewer than two
    /// frames are held.
    pub fn span(&self) -> f64 {
        match (self.newest_timestamp(), self.oldest_timestamp()) {
            (Some(newest), Some(oldest)) => newest - oldest,
            _ => 0.0,
        }
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.timestamps.iter().copied().collect()
    }

    pub fn retain_seconds(&self) -> f64 {
        self.retain_seconds
    }
}
