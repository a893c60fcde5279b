pub mod decode_metrics;

pub use decode_metrics::{DecodeMetrics, RateReport, RateTracker};
