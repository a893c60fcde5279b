//! Decode speed benchmark: run N cycles, print per-second latency and
//! throughput, then the overall mean.

use cortexlink_decoder::ProbabilityDecoder;
use cortexlink_telemetry::RateTracker;

pub fn run_speed(decoder: &mut dyn ProbabilityDecoder, cycles: u64) -> anyhow::Result<()> {
    let mut tracker = RateTracker::new();
    let mut window_latencies = Vec::new();

    for _ in 0..cycles {
        decoder.next_probability()?;
        if let Some(report) = tracker.tick() {
            println!(
                "{:6.1} ms/cycle   {:6.1} Hz",
                report.ms_per_cycle, report.hz
            );
            window_latencies.push(report.ms_per_cycle);
        }
    }

    if window_latencies.is_empty() {
        println!("finished in under one second; increase --cycles for a rate estimate");
    } else {
        let mean = window_latencies.iter().sum::<f64>() / window_latencies.len() as f64;
        println!("mean = {mean:.1} ms/cycle");
    }
    Ok(())
}
