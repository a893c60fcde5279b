use thiserror::Error;

use crate::window::SampleWindow;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream has not buffered a full window yet")]
    NotReady,

    #[error("channel {name:?} not present in the live stream")]
    ChannelNotFound { name: String },

    #[error("stream closed: {0}")]
    Closed(String),
}

/// A live multichannel signal stream, consumed window-by-window.
///
/// `acquire` pulls whatever samples the underlying transport has pending into
/// the source's internal buffer; `window` then serves the most recent
/// fixed-duration window. The decoder polls `acquire`/`is_ready` until a full
/// window is available, so a source never needs to block on its own.
///
/// Contract the decode pipeline relies on but does not enforce: successive
/// windows must carry strictly increasing leading timestamps. A stalled
/// stream that re-serves the same window produces duplicate timestamps and
/// breaks the feature buffer's sorted eviction search downstream.
pub trait WindowSource: Send {
    /// Sampling rate of the stream in Hz. Must match the model's rate
    /// exactly; there is no resampling path.
    fn sample_rate(&self) -> f64;

    /// Channel names in live stream order. Channel index layouts are not
    /// stable across sessions, so all model channel lists are resolved
    /// against these names at load time.
    fn channel_names(&self) -> &[String];

    /// True once enough samples are buffered to serve a full window.
    fn is_ready(&self) -> bool;

    /// Pull pending samples into the internal buffer.
    fn acquire(&mut self) -> Result<(), StreamError>;

    /// The most recent full window plus per-sample timestamps.
    fn window(&mut self) -> Result<SampleWindow, StreamError>;
}

/// Resolve a list of channel names against the live stream's ordering.
///
/// Returns one live index per wanted name, in the wanted order.
pub fn resolve_channels(wanted: &[String], live: &[String]) -> Result<Vec<usize>, StreamError> {
    wanted
        .iter()
        .map(|name| {
            live.iter()
                .position(|c| c == name)
                .ok_or_else(|| StreamError::ChannelNotFound { name: name.clone() })
        })
        .collect()
}
