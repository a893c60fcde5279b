//! Full daemon round trips against a real spawned worker process.

use std::time::{Duration, Instant};

use cortexlink_decoder::{
    DaemonConfig, DaemonError, DecodeError, DecoderDaemon, DecoderSetup, SourceConfig,
};
use cortexlink_stream::SimulatedConfig;

mod common;

fn poll_until<T>(timeout: Duration, mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = f() {
            return value;
        }
        assert!(Instant::now() < deadline, "timed out waiting");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn mock_daemon(dir: &tempfile::TempDir) -> DecoderDaemon {
    let mut config = DaemonConfig::new(DecoderSetup::Mock {
        labels: vec!["LEFT_GO".into(), "RIGHT_GO".into()],
    });
    config.worker_exe = Some(common::worker_exe());
    config.shm_dir = Some(dir.path().to_path_buf());
    DecoderDaemon::new(config).unwrap()
}

#[test]
fn mock_daemon_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = mock_daemon(&dir);
    assert!(!daemon.is_running());

    // before the first publication: the uniform prior, already consumed
    assert_eq!(daemon.probability(), vec![0.5, 0.5]);

    daemon.start().unwrap();
    assert!(daemon.is_running());

    // starting a running daemon is a logged no-op
    daemon.start().unwrap();
    assert!(daemon.is_running());

    let probs = poll_until(Duration::from_secs(5), || daemon.probability_if_unread());
    assert_eq!(probs.len(), 2);
    assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);

    // mock mode publishes no feature frames
    assert!(matches!(
        daemon.feature_frame(),
        Err(DaemonError::NoFeatureSlot)
    ));

    daemon.stop().unwrap();
    assert!(!daemon.is_running());
    // stopping again is a logged no-op, state unchanged
    daemon.stop().unwrap();
    assert!(!daemon.is_running());
}

#[test]
fn daemon_restarts_with_a_fresh_region() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = mock_daemon(&dir);

    daemon.start().unwrap();
    poll_until(Duration::from_secs(5), || daemon.probability_if_unread());
    daemon.stop().unwrap();

    // after stop the region was re-armed: prior restored, nothing unread
    assert_eq!(daemon.probability(), vec![0.5, 0.5]);
    assert!(daemon.probability_if_unread().is_none());

    daemon.start().unwrap();
    let probs = poll_until(Duration::from_secs(5), || daemon.probability_if_unread());
    assert_eq!(probs.len(), 2);
    daemon.stop().unwrap();
}

#[test]
fn model_daemon_serves_feature_frames() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = common::write_artifact(&common::test_artifact());
    let sim = SimulatedConfig {
        sample_rate: 512.0,
        channel_names: ["Cz", "C3", "C4", "Fp1"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        step_frames: 32,
        seed: Some(11),
        pace: true,
        ..Default::default()
    };
    let mut config = DaemonConfig::new(DecoderSetup::Model {
        artifact: artifact.path().to_path_buf(),
        source: SourceConfig::Simulated(sim),
    });
    config.worker_exe = Some(common::worker_exe());
    config.shm_dir = Some(dir.path().to_path_buf());

    let mut daemon = DecoderDaemon::new(config).unwrap();
    assert_eq!(daemon.labels().codes(), &[11, 9]);

    daemon.start().unwrap();
    let probs = poll_until(Duration::from_secs(5), || daemon.probability_if_unread());
    assert_eq!(probs.len(), 2);
    assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-6);

    // the one blocking reader call, bounded by the worker's cycle latency
    let frame = daemon.feature_frame().unwrap();
    assert_eq!(frame.len(), 3 * 2);
    assert!(frame.iter().all(|v| v.is_finite()));

    daemon.stop().unwrap();
    assert!(!daemon.is_running());
}

#[test]
fn worker_init_failure_surfaces_as_start_error() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = common::write_artifact(&common::test_artifact());
    // stream rate disagrees with the model: the worker must die during
    // startup and the daemon must report it instead of hanging
    let sim = SimulatedConfig {
        sample_rate: 500.0,
        channel_names: ["Cz", "C3", "C4", "Fp1"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ..Default::default()
    };
    let mut config = DaemonConfig::new(DecoderSetup::Model {
        artifact: artifact.path().to_path_buf(),
        source: SourceConfig::Simulated(sim),
    });
    config.worker_exe = Some(common::worker_exe());
    config.shm_dir = Some(dir.path().to_path_buf());

    let mut daemon = DecoderDaemon::new(config).unwrap();
    assert!(matches!(
        daemon.start(),
        Err(DaemonError::WorkerStart(_))
    ));
    assert!(!daemon.is_running());
}

#[test]
fn missing_artifact_is_fatal_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DaemonConfig::new(DecoderSetup::Model {
        artifact: dir.path().join("missing.json"),
        source: SourceConfig::Simulated(SimulatedConfig::default()),
    });
    config.worker_exe = Some(common::worker_exe());
    assert!(matches!(
        DecoderDaemon::new(config),
        Err(DaemonError::Decode(DecodeError::ArtifactIo { .. }))
    ));
}
