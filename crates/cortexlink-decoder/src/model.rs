//! Model artifact loading and the immutable decoder model.
//!
//! The artifact is a JSON file produced by the offline training pipeline.
//! Everything in it is plain data: channel lists are model-time channel
//! *names* and are resolved against the live stream's channel ordering at
//! load time, never by index. The loaded [`DecoderModel`] is immutable for
//! the lifetime of the process.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use cortexlink_stream::resolve_channels;
use cortexlink_stream::SampleWindow;
use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifierModel, LinearClassifier};
use crate::error::DecodeError;
use crate::features::{BandPowerExtractor, FeatureExtractor, FrameShape};
use crate::filters::{Biquad, PreprocessChain, Rereference};

/// The fixed, ordered label vocabulary: integer codes paired with
/// human-readable names, aligned index-for-index with every probability
/// vector the model produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    codes: Vec<i32>,
    names: Vec<String>,
}

impl LabelSet {
    pub fn new(codes: Vec<i32>, names: Vec<String>) -> Self {
        assert_eq!(codes.len(), names.len(), "one name per label code");
        Self { codes, names }
    }

    /// Labels from names alone, codes assigned positionally. Used by the
    /// mock decoding path, which has no trained vocabulary.
    pub fn from_names(names: &[String]) -> Self {
        Self::new((0..names.len() as i32).collect(), names.to_vec())
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn codes(&self) -> &[i32] {
        &self.codes
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_notch_q() -> f64 {
    30.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// Channel that was the recording reference, to be recovered. Optional:
    /// some montages only subtract the new reference.
    #[serde(default)]
    pub old: Option<String>,
    pub new: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialSpec {
    /// Only "car" (common average reference) is currently understood.
    pub kind: String,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralSpec {
    pub low_hz: f64,
    pub high_hz: f64,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotchSpec {
    pub center_hz: f64,
    #[serde(default = "default_notch_q")]
    pub q: f64,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Only "bandpower" is currently understood.
    pub kind: String,
    pub bands: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSpec {
    pub code: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSpec {
    /// Only "linear" is currently understood.
    pub kind: String,
    /// labels x features weight matrix.
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

/// On-disk model artifact. All channel lists are model-time names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub sample_rate: f64,
    pub window_seconds: f64,
    pub window_frames: usize,
    /// Cadence the training windows were stepped at; concrete sources use
    /// it to pace delivery.
    pub step_frames: usize,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    pub channels: Vec<String>,
    pub picks: Vec<String>,
    #[serde(default)]
    pub reference: Option<ReferenceSpec>,
    #[serde(default)]
    pub spatial: Option<SpatialSpec>,
    #[serde(default)]
    pub spectral: Option<SpectralSpec>,
    #[serde(default)]
    pub notch: Option<NotchSpec>,
    pub features: FeatureSpec,
    pub labels: Vec<LabelSpec>,
    pub classifier: ClassifierSpec,
}

impl ModelArtifact {
    pub fn load(path: &Path) -> Result<Self, DecodeError> {
        let raw = fs::read_to_string(path).map_err(|source| DecodeError::ArtifactIo {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&raw).map_err(|source| DecodeError::ArtifactFormat {
                path: path.to_path_buf(),
                source,
            })?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.window_frames < 2 {
            return Err(DecodeError::ModelInvalid(format!(
                "window of {} frames is too short",
                self.window_frames
            )));
        }
        let expected = (self.sample_rate * self.window_seconds).round() as usize;
        if expected != self.window_frames {
            return Err(DecodeError::ModelInvalid(format!(
                "sample_rate * window_seconds = {} does not equal window_frames {}",
                expected, self.window_frames
            )));
        }
        if self.step_frames == 0 {
            return Err(DecodeError::ModelInvalid("step_frames is zero".into()));
        }
        if self.labels.len() < 2 {
            return Err(DecodeError::ModelInvalid(format!(
                "{} labels; a classifier needs at least two",
                self.labels.len()
            )));
        }
        if self.picks.is_empty() {
            return Err(DecodeError::ModelInvalid("no channel picks".into()));
        }

        let check_subset = |list: &[String], what: &str| -> Result<(), DecodeError> {
            match list.iter().find(|name| !self.channels.contains(name)) {
                Some(name) => Err(DecodeError::ModelInvalid(format!(
                    "{what} channel {name:?} is not a model channel"
                ))),
                None => Ok(()),
            }
        };
        check_subset(&self.picks, "pick")?;
        if let Some(spatial) = &self.spatial {
            if spatial.kind != "car" {
                return Err(DecodeError::ModelInvalid(format!(
                    "unknown spatial filter kind {:?}",
                    spatial.kind
                )));
            }
            check_subset(&spatial.channels, "spatial")?;
        }
        if let Some(spectral) = &self.spectral {
            if spectral.low_hz <= 0.0 || spectral.high_hz <= spectral.low_hz {
                return Err(DecodeError::ModelInvalid(format!(
                    "spectral band {}-{} Hz is not a band",
                    spectral.low_hz, spectral.high_hz
                )));
            }
            check_subset(&spectral.channels, "spectral")?;
        }
        if let Some(notch) = &self.notch {
            check_subset(&notch.channels, "notch")?;
        }
        if let Some(reference) = &self.reference {
            if !self.channels.contains(&reference.new) {
                return Err(DecodeError::ModelInvalid(format!(
                    "reference channel {:?} is not a model channel",
                    reference.new
                )));
            }
            if let Some(old) = &reference.old {
                if !self.channels.contains(old) {
                    return Err(DecodeError::ModelInvalid(format!(
                        "old reference channel {old:?} is not a model channel"
                    )));
                }
            }
        }

        if self.features.kind != "bandpower" {
            return Err(DecodeError::ModelInvalid(format!(
                "unknown feature kind {:?}",
                self.features.kind
            )));
        }
        if self.features.bands.is_empty() {
            return Err(DecodeError::ModelInvalid("no frequency bands".into()));
        }
        if self.classifier.kind != "linear" {
            return Err(DecodeError::ModelInvalid(format!(
                "unknown classifier kind {:?}",
                self.classifier.kind
            )));
        }
        if self.classifier.weights.len() != self.labels.len() {
            return Err(DecodeError::ModelInvalid(format!(
                "{} weight rows for {} labels",
                self.classifier.weights.len(),
                self.labels.len()
            )));
        }
        let n_features = self.picks.len() * self.features.bands.len();
        if self
            .classifier
            .weights
            .iter()
            .any(|row| row.len() != n_features)
        {
            return Err(DecodeError::ModelInvalid(format!(
                "classifier weight rows must have {n_features} columns (picks x bands)"
            )));
        }
        Ok(())
    }

    pub fn label_set(&self) -> LabelSet {
        LabelSet::new(
            self.labels.iter().map(|l| l.code).collect(),
            self.labels.iter().map(|l| l.name.clone()).collect(),
        )
    }
}

/// Shape information needed to size shared slots without opening a stream.
#[derive(Debug, Clone)]
pub struct ModelProbe {
    pub labels: LabelSet,
    pub frame_shape: FrameShape,
}

/// The loaded, immutable model: scalars, resolved live channel indices, the
/// preprocessing chain, and the opaque extractor/classifier handles.
pub struct DecoderModel {
    pub sample_rate: f64,
    pub window_seconds: f64,
    pub window_frames: usize,
    pub step_frames: usize,
    pub labels: LabelSet,
    /// Live-stream indices of the trained channel picks, in pick order.
    pub picks: Vec<usize>,
    pub chain: PreprocessChain,
    pub extractor: Arc<dyn FeatureExtractor>,
    pub classifier: Arc<dyn ClassifierModel>,
    pub frame_shape: FrameShape,
}

impl std::fmt::Debug for DecoderModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderModel")
            .field("sample_rate", &self.sample_rate)
            .field("window_seconds", &self.window_seconds)
            .field("window_frames", &self.window_frames)
            .field("step_frames", &self.step_frames)
            .field("labels", &self.labels)
            .field("picks", &self.picks)
            .field("frame_shape", &self.frame_shape)
            .finish_non_exhaustive()
    }
}

impl DecoderModel {
    /// Load an artifact and bind it to a live stream layout. Fails fatally
    /// on a sampling-rate mismatch: there is no resampling path.
    pub fn load(path: &Path, live_channels: &[String], live_rate: f64) -> Result<Self, DecodeError> {
        let artifact = ModelArtifact::load(path)?;
        if live_rate != artifact.sample_rate {
            return Err(DecodeError::SampleRateMismatch {
                stream: live_rate,
                model: artifact.sample_rate,
            });
        }

        let picks = resolve_channels(&artifact.picks, live_channels)?;
        let reference = match &artifact.reference {
            Some(spec) => Some(Rereference {
                old: match &spec.old {
                    Some(old) => Some(resolve_channels(std::slice::from_ref(old), live_channels)?[0]),
                    None => None,
                },
                new: resolve_channels(std::slice::from_ref(&spec.new), live_channels)?[0],
            }),
            None => None,
        };
        let spatial_channels = match &artifact.spatial {
            Some(spec) => Some(resolve_channels(&spec.channels, live_channels)?),
            None => None,
        };
        let spectral = match &artifact.spectral {
            Some(spec) => Some((
                Biquad::bandpass(artifact.sample_rate, spec.low_hz, spec.high_hz),
                resolve_channels(&spec.channels, live_channels)?,
            )),
            None => None,
        };
        let notch = match &artifact.notch {
            Some(spec) => Some((
                Biquad::notch(artifact.sample_rate, spec.center_hz, spec.q),
                resolve_channels(&spec.channels, live_channels)?,
            )),
            None => None,
        };

        let chain = PreprocessChain {
            multiplier: (artifact.multiplier != 1.0).then_some(artifact.multiplier as f32),
            reference,
            spatial_channels,
            spectral,
            notch,
        };

        let (labels, extractor, classifier, frame_shape) = Self::build_parts(&artifact)?;

        Ok(Self {
            sample_rate: artifact.sample_rate,
            window_seconds: artifact.window_seconds,
            window_frames: artifact.window_frames,
            step_frames: artifact.step_frames,
            labels,
            picks,
            chain,
            extractor,
            classifier,
            frame_shape,
        })
    }

    /// Shapes only, without a live stream. Used by the daemon to size its
    /// shared region before spawning the worker.
    pub fn probe(path: &Path) -> Result<ModelProbe, DecodeError> {
        let artifact = ModelArtifact::load(path)?;
        let (labels, _, _, frame_shape) = Self::build_parts(&artifact)?;
        Ok(ModelProbe {
            labels,
            frame_shape,
        })
    }

    fn build_parts(
        artifact: &ModelArtifact,
    ) -> Result<
        (
            LabelSet,
            Arc<dyn FeatureExtractor>,
            Arc<dyn ClassifierModel>,
            FrameShape,
        ),
        DecodeError,
    > {
        let extractor: Arc<dyn FeatureExtractor> = Arc::new(BandPowerExtractor::new(
            artifact.sample_rate,
            artifact.window_frames,
            artifact.features.bands.clone(),
        ));
        let classifier: Arc<dyn ClassifierModel> = Arc::new(LinearClassifier::new(
            artifact.classifier.weights.clone(),
            artifact.classifier.intercepts.clone(),
        )?);

        // The frame shape comes from a zero-filled probe call, not from
        // arithmetic over the spec, so alternative extractors stay free to
        // choose their own layout.
        let probe_window = SampleWindow::zeros(artifact.picks.len(), artifact.window_frames);
        let frame_shape = extractor.extract(&probe_window).shape();

        Ok((artifact.label_set(), extractor, classifier, frame_shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn test_artifact() -> ModelArtifact {
        let n_features = 3 * 2; // 3 picks x 2 bands
        ModelArtifact {
            sample_rate: 512.0,
            window_seconds: 0.5,
            window_frames: 256,
            step_frames: 32,
            multiplier: 1.0,
            channels: ["Cz", "C3", "C4", "Fp1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            picks: ["C3", "C4", "Cz"].iter().map(|s| s.to_string()).collect(),
            reference: None,
            spatial: Some(SpatialSpec {
                kind: "car".into(),
                channels: ["C3", "C4", "Cz"].iter().map(|s| s.to_string()).collect(),
            }),
            spectral: Some(SpectralSpec {
                low_hz: 4.0,
                high_hz: 30.0,
                channels: ["C3", "C4", "Cz"].iter().map(|s| s.to_string()).collect(),
            }),
            notch: None,
            features: FeatureSpec {
                kind: "bandpower".into(),
                bands: vec![(8.0, 13.0), (13.0, 30.0)],
            },
            labels: vec![
                LabelSpec {
                    code: 11,
                    name: "LEFT_GO".into(),
                },
                LabelSpec {
                    code: 9,
                    name: "RIGHT_GO".into(),
                },
            ],
            classifier: ClassifierSpec {
                kind: "linear".into(),
                weights: vec![vec![0.1; n_features], vec![-0.1; n_features]],
                intercepts: vec![0.0, 0.0],
            },
        }
    }

    pub(crate) fn write_artifact(artifact: &ModelArtifact) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(artifact).unwrap().as_bytes())
            .unwrap();
        file
    }

    fn live_channels() -> Vec<String> {
        ["Cz", "C3", "C4", "Fp1"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn window_arithmetic_must_be_exact() {
        let mut artifact = test_artifact();
        artifact.window_frames = 255;
        assert!(matches!(
            artifact.validate(),
            Err(DecodeError::ModelInvalid(_))
        ));
    }

    #[test]
    fn sampling_rate_mismatch_is_fatal() {
        let file = write_artifact(&test_artifact());
        let err = DecoderModel::load(file.path(), &live_channels(), 500.0).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::SampleRateMismatch {
                stream,
                model
            } if stream == 500.0 && model == 512.0
        ));
    }

    #[test]
    fn picks_resolve_against_live_ordering() {
        let file = write_artifact(&test_artifact());
        // live stream reports a different channel ordering than the model
        let live: Vec<String> = ["Cz", "C3", "C4", "Fp1"].iter().map(|s| s.to_string()).collect();
        let model = DecoderModel::load(file.path(), &live, 512.0).unwrap();
        assert_eq!(model.picks, vec![1, 2, 0]);
    }

    #[test]
    fn missing_live_channel_fails_load() {
        let file = write_artifact(&test_artifact());
        let live: Vec<String> = ["C3", "C4"].iter().map(|s| s.to_string()).collect();
        assert!(DecoderModel::load(file.path(), &live, 512.0).is_err());
    }

    #[test]
    fn probe_reports_label_count_and_frame_shape() {
        let file = write_artifact(&test_artifact());
        let probe = DecoderModel::probe(file.path()).unwrap();
        assert_eq!(probe.labels.len(), 2);
        assert_eq!(probe.labels.codes(), &[11, 9]);
        assert_eq!(probe.frame_shape, FrameShape { rows: 3, cols: 2 });
    }

    #[test]
    fn weight_width_must_match_picks_times_bands() {
        let mut artifact = test_artifact();
        artifact.classifier.weights = vec![vec![0.1; 4], vec![-0.1; 4]];
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn fewer_than_two_labels_rejected() {
        let mut artifact = test_artifact();
        artifact.labels.truncate(1);
        artifact.classifier.weights.truncate(1);
        artifact.classifier.intercepts.truncate(1);
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn missing_artifact_file_reports_io() {
        let err = ModelArtifact::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, DecodeError::ArtifactIo { .. }));
    }
}
