//! Persistence of the fitted feature transform and the trained scorer.
//!
//! The two are always written and read together: the transform's output
//! columns are the scorer's input columns, so a mismatched pair is useless.

use crate::feature_transform::FeatureTransform;
use crate::models::gbm::GradientBoostingClassifier;
use crate::models::scorer::Scorer;
use crate::types::frame::Frame;
use crate::types::transaction::FIELD_NAMES;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Scorer blob file name
pub const MODEL_FILE: &str = "model.json";
/// Feature transform blob file name
pub const FEATURE_ENGINEER_FILE: &str = "feature_engineer.json";

const FORMAT_VERSION: u32 = 1;

/// Errors raised while saving or loading artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("corrupt artifact {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("refusing to use an unfitted feature transform")]
    UnfittedTransform,

    #[error("artifacts do not fit the transaction schema: {0}")]
    Incompatible(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A type that can be stored as an artifact blob
pub trait Artifact: Serialize + DeserializeOwned {
    /// Payload type tag written into the envelope
    const KIND: &'static str;
}

impl Artifact for FeatureTransform {
    const KIND: &'static str = "feature_transform";
}

impl Artifact for GradientBoostingClassifier {
    const KIND: &'static str = "gradient_boosting_classifier";
}

/// Self-describing wrapper around every blob
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    format_version: u32,
    kind: String,
    created_at: DateTime<Utc>,
    payload: T,
}

/// The matched transform/scorer pair held by the serving process
#[derive(Clone)]
pub struct ModelArtifacts {
    pub transform: FeatureTransform,
    pub scorer: Arc<dyn Scorer>,
}

impl ModelArtifacts {
    /// Pair a fitted transform with a scorer that accepts its output
    pub fn new(transform: FeatureTransform, scorer: Arc<dyn Scorer>) -> Result<Self, ArtifactError> {
        if !transform.is_fitted() {
            return Err(ArtifactError::UnfittedTransform);
        }
        let artifacts = Self { transform, scorer };
        artifacts.check_serving_schema()?;
        Ok(artifacts)
    }

    /// Transform an empty request-shaped frame and compare its columns with
    /// the scorer's inputs
    fn check_serving_schema(&self) -> Result<(), ArtifactError> {
        let request = Frame::from_columns(&FIELD_NAMES, Vec::new())
            .map_err(|e| ArtifactError::Incompatible(e.to_string()))?;
        let features = self
            .transform
            .transform(&request)
            .map_err(|e| ArtifactError::Incompatible(e.to_string()))?;

        match self.scorer.feature_names() {
            Some(expected) if expected != features.columns() => Err(ArtifactError::Incompatible(format!(
                "model expects features {:?}, transform produces {:?}",
                expected,
                features.columns()
            ))),
            _ => Ok(()),
        }
    }
}

/// Source of model artifacts for the serving process
pub trait ArtifactLoader {
    /// Load both artifacts, or fail without exposing either
    fn load_artifacts(&self) -> Result<ModelArtifacts, ArtifactError>;
}

/// Directory-backed artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn feature_engineer_path(&self) -> PathBuf {
        self.dir.join(FEATURE_ENGINEER_FILE)
    }

    /// Write both artifacts, creating the directory and replacing existing files
    pub fn save<S: Artifact>(
        &self,
        transform: &FeatureTransform,
        scorer: &S,
    ) -> Result<(), ArtifactError> {
        if !transform.is_fitted() {
            return Err(ArtifactError::UnfittedTransform);
        }

        // Serialize both before touching the filesystem
        let model_blob = encode(scorer)?;
        let transform_blob = encode(transform)?;

        fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Stage both files before replacing either
        let targets = [self.model_path(), self.feature_engineer_path()];
        let mut staged = Vec::with_capacity(targets.len());
        for (path, blob) in targets.iter().zip([&model_blob, &transform_blob]) {
            let tmp = temp_path(path);
            if let Err(source) = fs::write(&tmp, blob) {
                staged.push(tmp.clone());
                discard(&staged);
                return Err(ArtifactError::Io { path: tmp, source });
            }
            staged.push(tmp);
        }

        for (path, tmp) in targets.iter().zip(&staged) {
            if let Err(source) = fs::rename(tmp, path) {
                discard(&staged);
                return Err(ArtifactError::Io {
                    path: path.clone(),
                    source,
                });
            }
        }

        info!(dir = %self.dir.display(), "Saved model artifacts");
        Ok(())
    }

    /// Read both artifacts
    pub fn load<S: Artifact>(&self) -> Result<(FeatureTransform, S), ArtifactError> {
        let model_path = self.model_path();
        let transform_path = self.feature_engineer_path();

        for path in [&model_path, &transform_path] {
            if !path.is_file() {
                return Err(ArtifactError::NotFound(path.clone()));
            }
        }

        let scorer: S = decode(&model_path)?;
        let transform: FeatureTransform = decode(&transform_path)?;

        if !transform.is_fitted() {
            return Err(ArtifactError::Corrupt {
                path: transform_path,
                reason: "feature transform is not fitted".to_string(),
            });
        }

        info!(dir = %self.dir.display(), "Loaded model artifacts");
        Ok((transform, scorer))
    }
}

impl ArtifactLoader for ArtifactStore {
    fn load_artifacts(&self) -> Result<ModelArtifacts, ArtifactError> {
        let (transform, scorer) = self.load::<GradientBoostingClassifier>()?;
        scorer.validate().map_err(|e| ArtifactError::Corrupt {
            path: self.model_path(),
            reason: e.to_string(),
        })?;

        ModelArtifacts::new(transform, Arc::new(scorer)).map_err(|e| match e {
            ArtifactError::Incompatible(reason) => ArtifactError::Corrupt {
                path: self.dir.clone(),
                reason,
            },
            other => other,
        })
    }
}

fn encode<T: Artifact>(value: &T) -> Result<Vec<u8>, ArtifactError> {
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        kind: T::KIND.to_string(),
        created_at: Utc::now(),
        payload: value,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

fn decode<T: Artifact>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ArtifactError::NotFound(path.to_path_buf()),
        _ => ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let corrupt = |reason: String| ArtifactError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let envelope: Envelope<serde_json::Value> =
        serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

    if envelope.format_version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {}",
            envelope.format_version
        )));
    }
    if envelope.kind != T::KIND {
        return Err(corrupt(format!(
            "expected {} artifact, found {}",
            T::KIND,
            envelope.kind
        )));
    }

    serde_json::from_value(envelope.payload).map_err(|e| corrupt(e.to_string()))
}

/// Sibling file a blob is written to before it is renamed over the target
fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                warn!(path = %path.display(), error = %e, "Failed to remove staged artifact")
            }
            _ => {}
        }
    }
}
