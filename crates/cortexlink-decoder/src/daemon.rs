//! Process-isolated decoding daemon.
//!
//! The daemon owns a decoder inside a detached worker process. Worker and
//! readers share no heap; results travel through a [`SharedResultRegion`]
//! and word-sized flags. Only plain, serializable configuration crosses the
//! process boundary — the worker re-initializes its own decoder, model, and
//! stream from a [`WorkerSpec`], never from live handles.
//!
//! Lifecycle: `Stopped -> Armed -> Running -> Stopped`. Arming allocates a
//! fresh shared region sized exactly to the active shapes; stopping clears
//! the running flag, joins the worker boundedly, and re-arms, so the region
//! is never stale across restarts (a model swap can change every slot size).

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use cortexlink_stream::{SimulatedConfig, SimulatedSource, WindowSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decoder::{Decoder, MockDecoder, ProbabilityDecoder};
use crate::error::DecodeError;
use crate::features::FrameShape;
use crate::model::{DecoderModel, LabelSet};
use crate::shm::{SharedResultRegion, ShmError};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Shm(#[from] ShmError),

    #[error("failed to spawn decode worker: {0}")]
    Spawn(std::io::Error),

    #[error("decode worker failed to start: {0}")]
    WorkerStart(String),

    #[error("decode worker is not running")]
    NotRunning,

    #[error("shared region carries no feature slot (mock decoding)")]
    NoFeatureSlot,

    #[error("shared region shape does not match the worker's model: {0}")]
    ShapeMismatch(String),

    #[error("worker spec: {0}")]
    Spec(#[from] serde_json::Error),
}

/// How the worker builds its window source. Variants are plain data; a
/// hardware-backed source would slot in as another variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceConfig {
    Simulated(SimulatedConfig),
}

/// What the worker decodes with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DecoderSetup {
    /// Real pipeline: model artifact plus a window source.
    Model {
        artifact: PathBuf,
        source: SourceConfig,
    },
    /// Mock pipeline over a caller-supplied ordered label list.
    Mock { labels: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub setup: DecoderSetup,
    /// Feature-frame retention in seconds, passed through to the decoder.
    pub buffer_seconds: f64,
    /// Executable spawned as the worker; defaults to the current one, which
    /// must understand the hidden `decode-worker` subcommand.
    pub worker_exe: Option<PathBuf>,
    /// Directory for region files; defaults to the system temp dir.
    pub shm_dir: Option<PathBuf>,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}

impl DaemonConfig {
    pub fn new(setup: DecoderSetup) -> Self {
        Self {
            setup,
            buffer_seconds: 1.0,
            worker_exe: None,
            shm_dir: None,
            start_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything the worker process needs, as plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub shm_path: PathBuf,
    pub setup: DecoderSetup,
    pub buffer_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonState {
    Stopped,
    Armed,
    Running,
}

pub struct DecoderDaemon {
    config: DaemonConfig,
    state: DaemonState,
    labels: LabelSet,
    frame_shape: Option<FrameShape>,
    region: Option<SharedResultRegion>,
    shm_path: Option<PathBuf>,
    worker: Option<Child>,
    region_serial: u64,
}

impl DecoderDaemon {
    /// Probe the configured setup for its shapes and arm. Fatal on a bad
    /// artifact or fewer than two mock labels.
    pub fn new(config: DaemonConfig) -> Result<Self, DaemonError> {
        let (labels, frame_shape) = match &config.setup {
            DecoderSetup::Model { artifact, .. } => {
                let probe = DecoderModel::probe(artifact)?;
                (probe.labels, Some(probe.frame_shape))
            }
            DecoderSetup::Mock { labels } => {
                if labels.len() < 2 {
                    return Err(DecodeError::TooFewLabels(labels.len()).into());
                }
                tracing::warn!("mock decoding enabled; probabilities are synthetic");
                (LabelSet::from_names(labels), None)
            }
        };
        let mut daemon = Self {
            config,
            state: DaemonState::Stopped,
            labels,
            frame_shape,
            region: None,
            shm_path: None,
            worker: None,
            region_serial: 0,
        };
        daemon.reset()?;
        Ok(daemon)
    }

    /// Allocate a fresh shared region sized exactly to the active shapes
    /// and arm. Any previous region file is removed first.
    pub fn reset(&mut self) -> Result<(), DaemonError> {
        self.discard_region();
        self.region_serial += 1;
        let dir = self
            .config
            .shm_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let path = dir.join(format!(
            "cortexlink-{}-{}.shm",
            std::process::id(),
            self.region_serial
        ));
        let region = SharedResultRegion::create(&path, self.labels.len(), self.frame_shape)?;
        self.region = Some(region);
        self.shm_path = Some(path);
        self.state = DaemonState::Armed;
        Ok(())
    }

    /// Spawn the worker process and wait boundedly for it to come up. A
    /// start on a running daemon is a logged no-op.
    pub fn start(&mut self) -> Result<(), DaemonError> {
        if self.state == DaemonState::Running {
            tracing::warn!("decoder daemon already running; start ignored");
            return Ok(());
        }
        if self.state == DaemonState::Stopped {
            self.reset()?;
        }
        let shm_path = self.shm_path.clone().expect("armed daemon has a region");
        let spec = WorkerSpec {
            shm_path,
            setup: self.config.setup.clone(),
            buffer_seconds: self.config.buffer_seconds,
        };
        let spec_json = serde_json::to_string(&spec)?;
        let exe = match &self.config.worker_exe {
            Some(exe) => exe.clone(),
            None => std::env::current_exe().map_err(DaemonError::Spawn)?,
        };

        let mut child = Command::new(&exe)
            .arg("decode-worker")
            .arg("--spec")
            .arg(&spec_json)
            .stdin(Stdio::null())
            .spawn()
            .map_err(DaemonError::Spawn)?;

        // The worker raises the running flag once its decoder initialized;
        // if it dies first, surface that as a start failure instead of a
        // silent crash.
        let deadline = Instant::now() + self.config.start_timeout;
        loop {
            if self.region().is_running() {
                break;
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.state = DaemonState::Armed;
                    return Err(DaemonError::WorkerStart(format!(
                        "worker exited during startup: {status}"
                    )));
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    return Err(DaemonError::Spawn(e));
                }
            }
            if Instant::now() > deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DaemonError::WorkerStart(format!(
                    "worker did not come up within {:?}",
                    self.config.start_timeout
                )));
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        self.worker = Some(child);
        self.state = DaemonState::Running;
        tracing::info!(pid = self.worker.as_ref().map(|c| c.id()), "decoder daemon started");
        Ok(())
    }

    /// Request a cooperative stop, join the worker boundedly, then re-arm
    /// with a fresh region. A stop on a stopped daemon is a logged no-op.
    pub fn stop(&mut self) -> Result<(), DaemonError> {
        if self.state != DaemonState::Running {
            tracing::warn!("decoder daemon already stopped; stop ignored");
            return Ok(());
        }
        self.region().set_running(false);

        if let Some(mut child) = self.worker.take() {
            let deadline = Instant::now() + self.config.stop_timeout;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() > deadline => {
                        tracing::warn!("decode worker ignored the stop flag; killing it");
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    Ok(None) => std::thread::sleep(Duration::from_millis(5)),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to poll decode worker exit");
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                }
            }
        }

        self.state = DaemonState::Stopped;
        self.reset()?;
        tracing::info!("decoder daemon stopped");
        Ok(())
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn frame_shape(&self) -> Option<FrameShape> {
        self.frame_shape
    }

    /// Non-blocking: true only while a worker holds the running flag high.
    /// Safe to call in any state, including before the first start.
    pub fn is_running(&self) -> bool {
        self.region.as_ref().is_some_and(|r| r.is_running())
    }

    /// Snapshot the newest published probability vector and mark it read.
    /// Never blocks; before the first publication this is the uniform prior.
    pub fn probability(&self) -> Vec<f64> {
        self.region().read_probability()
    }

    /// `None` once the current value has been consumed — lets a watchdog
    /// tell "no new classification yet" from "classifier logically idle".
    pub fn probability_if_unread(&self) -> Option<Vec<f64>> {
        self.region().read_probability_if_unread()
    }

    /// Ask the worker for its latest feature frame and poll until served.
    /// The one blocking reader call; bounded by the worker's cycle latency.
    /// Callers needing strict timeouts must wrap it externally.
    pub fn feature_frame(&self) -> Result<Vec<f64>, DaemonError> {
        if !self.region().has_frame_slot() {
            return Err(DaemonError::NoFeatureSlot);
        }
        if !self.is_running() {
            return Err(DaemonError::NotRunning);
        }
        self.region().request_frame();
        while self.region().frame_request_pending() {
            if !self.region().is_running() {
                return Err(DaemonError::NotRunning);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(self.region().read_frame())
    }

    fn region(&self) -> &SharedResultRegion {
        self.region.as_ref().expect("daemon always holds a region")
    }

    fn discard_region(&mut self) {
        self.region = None;
        if let Some(path) = self.shm_path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for DecoderDaemon {
    fn drop(&mut self) {
        if let Some(mut child) = self.worker.take() {
            if let Some(region) = &self.region {
                region.set_running(false);
            }
            let _ = child.kill();
            let _ = child.wait();
        }
        self.discard_region();
    }
}

/// Build the decoder a worker runs, from plain configuration.
pub fn build_decoder(
    setup: &DecoderSetup,
    buffer_seconds: f64,
) -> Result<Box<dyn ProbabilityDecoder>, DecodeError> {
    match setup {
        DecoderSetup::Mock { labels } => Ok(Box::new(MockDecoder::new(labels)?)),
        DecoderSetup::Model { artifact, source } => {
            let artifact_path = artifact.as_path();
            let source: Box<dyn WindowSource> = match source {
                SourceConfig::Simulated(cfg) => {
                    let window_frames = window_frames_for(artifact_path)?;
                    Box::new(SimulatedSource::new(cfg.clone(), window_frames))
                }
            };
            Ok(Box::new(Decoder::new(artifact_path, source, buffer_seconds)?))
        }
    }
}

fn window_frames_for(artifact_path: &Path) -> Result<usize, DecodeError> {
    Ok(crate::model::ModelArtifact::load(artifact_path)?.window_frames)
}

/// Worker-process entry point: map the region, build the decoder, decode
/// until the running flag drops. Initialization failures propagate before
/// the flag ever rises, which the spawning daemon reports as a start error.
pub fn run_worker(spec: &WorkerSpec) -> Result<(), DaemonError> {
    let mut region = SharedResultRegion::open(&spec.shm_path)?;
    let mut decoder = build_decoder(&spec.setup, spec.buffer_seconds)?;

    if decoder.labels().len() != region.n_labels() {
        return Err(DaemonError::ShapeMismatch(format!(
            "{} labels vs region slot for {}",
            decoder.labels().len(),
            region.n_labels()
        )));
    }
    if decoder.frame_shape() != region.frame_shape() {
        return Err(DaemonError::ShapeMismatch(format!(
            "frame shape {:?} vs region {:?}",
            decoder.frame_shape(),
            region.frame_shape()
        )));
    }

    region.set_running(true);
    tracing::info!("decode worker running");
    let result = worker_loop(&mut region, decoder.as_mut());
    region.set_running(false);
    tracing::info!("decode worker exiting");
    result
}

/// The decode loop proper, separated so tests can drive it on a thread over
/// a shared file. No fixed period: it runs as fast as the cycle permits,
/// checking the running flag once per cycle.
pub fn worker_loop(
    region: &mut SharedResultRegion,
    decoder: &mut dyn ProbabilityDecoder,
) -> Result<(), DaemonError> {
    while region.is_running() {
        let probs = decoder.next_probability()?;
        region.publish_probability(&probs);

        // Feature frames are copied out only on demand; the request flag
        // doubles as the completion signal for the polling reader.
        if region.has_frame_slot() && region.frame_request_pending() {
            let frame = decoder.latest_feature_frame()?;
            region.publish_frame(&frame);
        }
    }
    Ok(())
}
