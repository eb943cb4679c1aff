//! Local experiment tracking.
//!
//! Each run is a directory `<tracking_dir>/<experiment>/<run_id>/` holding
//! `meta.json`, `params.json`, `metrics.json` and an `artifacts/` copy of
//! the saved model files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const META_FILE: &str = "meta.json";
const PARAMS_FILE: &str = "params.json";
const METRICS_FILE: &str = "metrics.json";
const ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize run data: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> TrackingError + '_ {
    move |source| TrackingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// Contents of `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: Uuid,
    pub experiment: String,
    pub registered_model_name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// File-backed tracker for one experiment
#[derive(Debug, Clone)]
pub struct ExperimentTracker {
    dir: PathBuf,
    experiment: String,
}

impl ExperimentTracker {
    pub fn new<P: AsRef<Path>>(tracking_dir: P, experiment: &str) -> Self {
        Self {
            dir: tracking_dir.as_ref().join(experiment),
            experiment: experiment.to_string(),
        }
    }

    pub fn experiment_dir(&self) -> &Path {
        &self.dir
    }

    /// Create the run directory and record it as running
    pub fn start_run(&self, registered_model_name: &str) -> Result<Run, TrackingError> {
        let run_id = Uuid::new_v4();
        let dir = self.dir.join(run_id.to_string());
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let run = Run {
            dir,
            meta: RunMeta {
                run_id,
                experiment: self.experiment.clone(),
                registered_model_name: registered_model_name.to_string(),
                status: RunStatus::Running,
                start_time: Utc::now(),
                end_time: None,
            },
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
        };
        run.write_json(META_FILE, &run.meta)?;

        info!(run_id = %run_id, experiment = %self.experiment, "Started tracking run");
        Ok(run)
    }
}

/// An open tracking run. Close it with [`Run::finish`].
#[derive(Debug)]
pub struct Run {
    dir: PathBuf,
    meta: RunMeta,
    params: BTreeMap<String, Value>,
    metrics: BTreeMap<String, f64>,
}

impl Run {
    pub fn id(&self) -> Uuid {
        self.meta.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_param<V: Serialize>(&mut self, key: &str, value: V) -> Result<(), TrackingError> {
        self.params
            .insert(key.to_string(), serde_json::to_value(value)?);
        self.write_json(PARAMS_FILE, &self.params)
    }

    /// Log every field of a serializable struct as a parameter
    pub fn log_params<T: Serialize>(&mut self, params: &T) -> Result<(), TrackingError> {
        match serde_json::to_value(params)? {
            Value::Object(fields) => self.params.extend(fields),
            other => {
                self.params.insert("params".to_string(), other);
            }
        }
        self.write_json(PARAMS_FILE, &self.params)
    }

    pub fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<(), TrackingError> {
        self.metrics
            .extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        self.write_json(METRICS_FILE, &self.metrics)
    }

    /// Copy the files of `source` into the run's `artifacts/` directory
    pub fn log_artifacts<P: AsRef<Path>>(&self, source: P) -> Result<usize, TrackingError> {
        let source = source.as_ref();
        let target = self.dir.join(ARTIFACTS_DIR);
        fs::create_dir_all(&target).map_err(io_error(&target))?;

        let mut copied = 0;
        for entry in fs::read_dir(source).map_err(io_error(source))? {
            let path = entry.map_err(io_error(source))?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name() {
                let dest = target.join(name);
                fs::copy(&path, &dest).map_err(io_error(&dest))?;
                debug!(artifact = %dest.display(), "Logged artifact");
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Close the run with the given status
    pub fn finish(mut self, status: RunStatus) -> Result<RunMeta, TrackingError> {
        self.meta.status = status;
        self.meta.end_time = Some(Utc::now());
        self.write_json(META_FILE, &self.meta)?;

        info!(run_id = %self.meta.run_id, status = ?status, "Finished tracking run");
        Ok(self.meta)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), TrackingError> {
        let path = self.dir.join(file);
        let bytes = serde_json::to_vec_pretty(value)?;
        fs::write(&path, bytes).map_err(io_error(&path))
    }
}
