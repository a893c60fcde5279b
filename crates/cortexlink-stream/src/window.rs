/// One fixed-duration slice of the live signal: a channels x samples matrix
/// (channel-major, contiguous) with one timestamp per sample, in seconds.
///
/// Windows are read-only to the decode pipeline apart from in-place
/// preprocessing; each lives for exactly one decode cycle.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    data: Vec<f32>,
    channels: usize,
    samples: usize,
    timestamps: Vec<f64>,
}

impl SampleWindow {
    pub fn new(channels: usize, samples: usize, data: Vec<f32>, timestamps: Vec<f64>) -> Self {
        assert!(samples > 0, "a window holds at least one sample");
        assert_eq!(data.len(), channels * samples, "data is channels * samples");
        assert_eq!(timestamps.len(), samples, "one timestamp per sample");
        Self {
            data,
            channels,
            samples,
            timestamps,
        }
    }

    /// Zero-filled window, used to probe feature extractors for their
    /// output shape at model-load time.
    pub fn zeros(channels: usize, samples: usize) -> Self {
        Self::new(
            channels,
            samples,
            vec![0.0; channels * samples],
            vec![0.0; samples],
        )
    }

    pub fn n_channels(&self) -> usize {
        self.channels
    }

    pub fn n_samples(&self) -> usize {
        self.samples
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.data[ch * self.samples..(ch + 1) * self.samples]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.data[ch * self.samples..(ch + 1) * self.samples]
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Timestamp of the first sample; feature frames are keyed by this.
    pub fn leading_timestamp(&self) -> f64 {
        self.timestamps[0]
    }

    pub fn trailing_timestamp(&self) -> f64 {
        self.timestamps[self.samples - 1]
    }

    /// Copy out the given channels, in pick order, keeping the timestamps.
    pub fn select_channels(&self, picks: &[usize]) -> SampleWindow {
        let mut data = Vec::with_capacity(picks.len() * self.samples);
        for &ch in picks {
            data.extend_from_slice(self.channel(ch));
        }
        SampleWindow::new(picks.len(), self.samples, data, self.timestamps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_slices_are_contiguous_rows() {
        let w = SampleWindow::new(
            2,
            3,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![0.0, 0.1, 0.2],
        );
        assert_eq!(w.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(w.channel(1), &[4.0, 5.0, 6.0]);
        assert_eq!(w.leading_timestamp(), 0.0);
        assert_eq!(w.trailing_timestamp(), 0.2);
    }

    #[test]
    fn select_channels_reorders_rows() {
        let w = SampleWindow::new(
            3,
            2,
            vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0],
            vec![0.0, 0.1],
        );
        let picked = w.select_channels(&[2, 0]);
        assert_eq!(picked.n_channels(), 2);
        assert_eq!(picked.channel(0), &[3.0, 3.0]);
        assert_eq!(picked.channel(1), &[1.0, 1.0]);
        assert_eq!(picked.timestamps(), w.timestamps());
    }

    #[test]
    #[should_panic(expected = "one timestamp per sample")]
    fn mismatched_timestamps_panic() {
        SampleWindow::new(1, 2, vec![0.0, 0.0], vec![0.0]);
    }
}
