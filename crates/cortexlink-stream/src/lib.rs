//! Streaming sample windows for the decode pipeline.
//!
//! The decoder never talks to acquisition hardware directly; it consumes a
//! [`WindowSource`], which serves the most recent fixed-duration multichannel
//! window plus per-sample timestamps. A [`SlidingWindowBuffer`] is the
//! building block for concrete sources, and [`SimulatedSource`] provides a
//! synthetic stream for integration tests and hardware-free runs.

pub mod sim;
pub mod sliding;
pub mod source;
pub mod window;

pub use sim::{SimulatedConfig, SimulatedSource};
pub use sliding::SlidingWindowBuffer;
pub use source::{resolve_channels, StreamError, WindowSource};
pub use window::SampleWindow;
