//! Daemon-backed sample decoding loop.
//!
//! Polls the daemon's unread slot, exponentially smooths the raw
//! probabilities, and prints the arg-max label for every new classification.
//! A watchdog warns when no classification has completed for five seconds —
//! `probability_if_unread` returning `None` is what makes "no new result
//! yet" distinguishable from a logically idle classifier.

use std::time::{Duration, Instant};

use cortexlink_decoder::DecoderDaemon;

const SMOOTHING_KEEP: f64 = 0.8;
const WATCHDOG_AFTER: Duration = Duration::from_secs(5);

pub async fn run_sample_loop(daemon: &mut DecoderDaemon) -> anyhow::Result<()> {
    daemon.start()?;
    let names = daemon.labels().names().to_vec();
    let mut smoothed = vec![1.0 / names.len() as f64; names.len()];
    let mut last_cycle = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(Duration::from_millis(1));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupt received; stopping decoder daemon");
                break;
            }
            _ = poll.tick() => {
                match daemon.probability_if_unread() {
                    Some(raw) => {
                        let elapsed_ms = last_cycle.elapsed().as_secs_f64() * 1000.0;
                        for (s, r) in smoothed.iter_mut().zip(&raw) {
                            *s = *s * SMOOTHING_KEEP + r * (1.0 - SMOOTHING_KEEP);
                        }
                        let mut line = format!("[{elapsed_ms:8.1} ms]");
                        for (name, (s, r)) in names.iter().zip(smoothed.iter().zip(&raw)) {
                            line.push_str(&format!("   {name} {s:.3} (raw {r:.3})"));
                        }
                        line.push_str(&format!("   => {}", names[argmax(&smoothed)]));
                        println!("{line}");
                        last_cycle = Instant::now();
                    }
                    None => {
                        if last_cycle.elapsed() > WATCHDOG_AFTER {
                            tracing::warn!(
                                "no classification in the last 5 seconds; is the stream alive?"
                            );
                            last_cycle = Instant::now();
                        }
                    }
                }
            }
        }
    }

    daemon.stop()?;
    Ok(())
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
