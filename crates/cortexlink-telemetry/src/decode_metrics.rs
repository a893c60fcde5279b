use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared metrics for cross-thread decode monitoring
#[derive(Clone)]
pub struct DecodeMetrics {
    /// Completed decode cycles since start
    pub cycles_completed: Arc<AtomicU64>,
    /// Duration of the most recent cycle, microseconds
    pub last_cycle_us: Arc<AtomicU64>,
    /// Decode throughput * 10 (one decimal of precision)
    pub decode_hz_x10: Arc<AtomicU64>,
    /// Feature frames currently retained
    pub frames_buffered: Arc<AtomicUsize>,
    /// Buffered timestamp span, milliseconds
    pub buffer_span_ms: Arc<AtomicU64>,
    /// Wall-clock instant of the last completed cycle
    pub last_cycle_at: Arc<RwLock<Option<Instant>>>,
}

impl Default for DecodeMetrics {
    fn default() -> Self {
        Self {
            cycles_completed: Arc::new(AtomicU64::new(0)),
            last_cycle_us: Arc::new(AtomicU64::new(0)),
            decode_hz_x10: Arc::new(AtomicU64::new(0)),
            frames_buffered: Arc::new(AtomicUsize::new(0)),
            buffer_span_ms: Arc::new(AtomicU64::new(0)),
            last_cycle_at: Arc::new(RwLock::new(None)),
        }
    }
}

impl DecodeMetrics {
    pub fn record_cycle(&self, elapsed: Duration) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
        *self.last_cycle_at.write() = Some(Instant::now());
    }

    pub fn update_rate(&self, hz: f64) {
        self.decode_hz_x10
            .store((hz * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn update_buffer(&self, frames: usize, span_seconds: f64) {
        self.frames_buffered.store(frames, Ordering::Relaxed);
        self.buffer_span_ms
            .store((span_seconds * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn decode_hz(&self) -> f64 {
        self.decode_hz_x10.load(Ordering::Relaxed) as f64 / 10.0
    }

    /// Seconds since the last completed cycle, if any cycle has completed.
    pub fn idle_seconds(&self) -> Option<f64> {
        self.last_cycle_at
            .read()
            .map(|at| at.elapsed().as_secs_f64())
    }
}

/// Per-second throughput report for the speed harness.
#[derive(Debug, Clone, Copy)]
pub struct RateReport {
    pub ms_per_cycle: f64,
    pub hz: f64,
}

/// Tracks decode throughput over rolling one-second windows.
pub struct RateTracker {
    window_start: Instant,
    count: u64,
}

impl RateTracker {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Call once per completed cycle; reports once a full second has elapsed.
    pub fn tick(&mut self) -> Option<RateReport> {
        self.count += 1;
        let elapsed = self.window_start.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let secs = elapsed.as_secs_f64();
            let report = RateReport {
                ms_per_cycle: secs * 1000.0 / self.count as f64,
                hz: self.count as f64 / secs,
            };
            self.window_start = Instant::now();
            self.count = 0;
            Some(report)
        } else {
            None
        }
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}
