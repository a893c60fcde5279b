//! Worker-protocol tests over a shared region file, with the worker loop on
//! a thread. Threads and processes see the same mapped bytes, so this
//! exercises the exact cross-process protocol without spawning binaries.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use cortexlink_decoder::daemon::worker_loop;
use cortexlink_decoder::features::FrameShape;
use cortexlink_decoder::model::LabelSet;
use cortexlink_decoder::{DecodeError, MockDecoder, ProbabilityDecoder, SharedResultRegion};

fn region_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn poll_until<T>(timeout: Duration, mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = f() {
            return value;
        }
        assert!(Instant::now() < deadline, "timed out waiting");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn unread_semantics_with_a_live_worker() {
    let dir = tempfile::tempdir().unwrap();
    let path = region_path(&dir, "mock.shm");
    let owner = SharedResultRegion::create(&path, 2, None).unwrap();

    let worker_path = path.clone();
    let worker = std::thread::spawn(move || {
        let mut region = SharedResultRegion::open(&worker_path).unwrap();
        let mut decoder = MockDecoder::new(&["L".to_string(), "R".to_string()])
            .unwrap()
            .with_seed(3)
            // long cycles make the consumed-slot window unambiguous
            .with_latency(Duration::from_millis(200));
        region.set_running(true);
        worker_loop(&mut region, &mut decoder)
    });

    poll_until(Duration::from_secs(2), || owner.is_running().then_some(()));

    // first publication arrives within one cycle
    let first = poll_until(Duration::from_secs(2), || {
        owner.read_probability_if_unread()
    });
    assert_eq!(first.len(), 2);
    assert!((first.iter().sum::<f64>() - 1.0).abs() < 1e-9);

    // immediately after consuming: nothing new yet
    assert!(owner.read_probability_if_unread().is_none());
    // the unconditional read still serves the last snapshot
    assert_eq!(owner.read_probability(), first);

    // the next cycle publishes again
    let second = poll_until(Duration::from_secs(2), || {
        owner.read_probability_if_unread()
    });
    assert_eq!(second.len(), 2);

    owner.set_running(false);
    worker.join().unwrap().unwrap();
    assert!(!owner.is_running());
}

#[test]
fn stop_flag_halts_the_worker_within_one_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = region_path(&dir, "halt.shm");
    let owner = SharedResultRegion::create(&path, 2, None).unwrap();

    let worker_path = path.clone();
    let worker = std::thread::spawn(move || {
        let mut region = SharedResultRegion::open(&worker_path).unwrap();
        let mut decoder = MockDecoder::new(&["L".to_string(), "R".to_string()])
            .unwrap()
            .with_seed(5)
            .with_latency(Duration::from_millis(10));
        region.set_running(true);
        worker_loop(&mut region, &mut decoder)
    });

    poll_until(Duration::from_secs(2), || owner.is_running().then_some(()));
    owner.set_running(false);

    let started = Instant::now();
    worker.join().unwrap().unwrap();
    // cooperative stop: bounded by one decode cycle, with slack for CI
    assert!(started.elapsed() < Duration::from_secs(1));
}

/// Fixed-output decoder so the frame handshake is observable end to end.
struct FrameStubDecoder {
    labels: LabelSet,
    frame: Vec<f64>,
    cycles: u64,
}

impl ProbabilityDecoder for FrameStubDecoder {
    fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn frame_shape(&self) -> Option<FrameShape> {
        Some(FrameShape { rows: 2, cols: 2 })
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn next_probability(&mut self) -> Result<Vec<f64>, DecodeError> {
        self.cycles += 1;
        std::thread::sleep(Duration::from_millis(5));
        Ok(vec![0.75, 0.25])
    }

    fn latest_feature_frame(&self) -> Result<Vec<f64>, DecodeError> {
        if self.cycles == 0 {
            return Err(DecodeError::BufferEmpty);
        }
        Ok(self.frame.clone())
    }
}

#[test]
fn feature_frames_are_served_on_request_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = region_path(&dir, "frames.shm");
    let shape = Some(FrameShape { rows: 2, cols: 2 });
    let owner = SharedResultRegion::create(&path, 2, shape).unwrap();

    let worker_path = path.clone();
    let worker = std::thread::spawn(move || {
        let mut region = SharedResultRegion::open(&worker_path).unwrap();
        let mut decoder = FrameStubDecoder {
            labels: LabelSet::from_names(&["L".to_string(), "R".to_string()]),
            frame: vec![1.5, 2.5, 3.5, 4.5],
            cycles: 0,
        };
        region.set_running(true);
        worker_loop(&mut region, &mut decoder)
    });

    poll_until(Duration::from_secs(2), || owner.is_running().then_some(()));

    // nothing is copied until a reader asks
    assert!(!owner.frame_request_pending());

    owner.request_frame();
    poll_until(Duration::from_secs(2), || {
        (!owner.frame_request_pending()).then_some(())
    });
    assert_eq!(owner.read_frame(), vec![1.5, 2.5, 3.5, 4.5]);

    owner.set_running(false);
    worker.join().unwrap().unwrap();
}
