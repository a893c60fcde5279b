use std::io::Write;

use cortexlink_decoder::model::{
    ClassifierSpec, FeatureSpec, LabelSpec, ModelArtifact, SpatialSpec, SpectralSpec,
};

/// A small but complete artifact: four channels, three picks, two bands,
/// two labels, matched to the simulated source's default layout and rate.
pub fn test_artifact() -> ModelArtifact {
    let n_features = 3 * 2;
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

pub fn write_artifact(artifact: &ModelArtifact) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(artifact).unwrap().as_bytes())
        .unwrap();
    file.flush().unwrap();
    file
}
