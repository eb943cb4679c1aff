//! Configuration for the prediction service and the training pipeline.
//!
//! Both documents are TOML files read through the `config` crate. Any key can
//! be overridden from the environment as `FRAUD__<SECTION>__<KEY>`, e.g.
//! `FRAUD__SERVER__PORT=9000`.

use crate::feature_transform::DEFAULT_SCALE_FEATURES;
use crate::models::gbm::GbmParams;
use crate::models::inference::DEFAULT_THRESHOLD;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat, Source};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the service configuration
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
/// Default location of the training configuration
pub const DEFAULT_TRAINING_CONFIG_PATH: &str = "config/training.toml";

const ENV_PREFIX: &str = "FRAUD";
const ENV_SEPARATOR: &str = "__";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub detection: DetectionConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Artifact location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory containing `model.json` and `feature_engineer.json`
    pub models_dir: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// A transaction is flagged when its probability is strictly above this
    pub threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Periodic metrics summary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between log summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load `config/config.toml` if present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config: Self = build(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(false))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = build(File::from(path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.detection.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("detection.threshold must lie in [0, 1], got {}", threshold);
        }
        Ok(())
    }
}

/// Training pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub data: DataConfig,
    pub features: FeaturesConfig,
    pub model: ModelConfig,
    pub training: TrackingConfig,
    pub logging: LoggingConfig,
}

/// Input dataset and split
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// CSV file with a header row
    pub source: PathBuf,
    /// Fraction of each class held out for evaluation
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("data/creditcard.csv"),
            test_size: 0.2,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Label column
    pub target: String,
    /// Columns standardized by the feature transform
    pub scale_features: Vec<String>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            target: "Class".to_string(),
            scale_features: DEFAULT_SCALE_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub params: GbmParams,
}

/// Experiment tracking and artifact output
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub experiment_name: String,
    pub tracking_dir: PathBuf,
    /// Where `model.json` and `feature_engineer.json` are written
    pub output_dir: PathBuf,
    pub registered_model_name: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            experiment_name: "fraud-detection".to_string(),
            tracking_dir: PathBuf::from("mlruns"),
            output_dir: PathBuf::from("models"),
            registered_model_name: "fraud-detection-model".to_string(),
        }
    }
}

impl TrainingConfig {
    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = build(File::from(path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let test_size = self.data.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            bail!("data.test_size must lie in (0, 1), got {}", test_size);
        }
        if self.features.target.is_empty() {
            bail!("features.target must not be empty");
        }
        self.model
            .params
            .validate()
            .context("invalid model.params")?;
        Ok(())
    }
}

fn build<T, S>(file: S) -> Result<T>
where
    T: serde::de::DeserializeOwned,
    S: Source + Send + Sync + 'static,
{
    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.models.models_dir, PathBuf::from("models"));
        assert_eq!(config.detection.threshold, 0.5);
        assert_eq!(config.metrics.report_interval_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_toml(
            r#"
            [server]
            port = 9100

            [logging]
            format = "json"
            "#,
        );
        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.detection.threshold, 0.5);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let file = write_toml("[detection]\nthreshold = 1.5\n");
        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("detection.threshold"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_toml("[metrics]\nreport_interval_secs = 30\n");
        std::env::set_var("FRAUD__METRICS__REPORT_INTERVAL_SECS", "5");
        let loaded = AppConfig::load_from_path(file.path());
        std::env::remove_var("FRAUD__METRICS__REPORT_INTERVAL_SECS");

        assert_eq!(loaded.unwrap().metrics.report_interval_secs, 5);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load_from_path("does/not/exist.toml").is_err());
    }

    #[test]
    fn test_training_config() {
        let file = write_toml(
            r#"
            [data]
            source = "data/sample.csv"
            test_size = 0.25

            [model.params]
            n_estimators = 50
            max_depth = 4

            [training]
            experiment_name = "nightly"
            "#,
        );
        let config = TrainingConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.data.source, PathBuf::from("data/sample.csv"));
        assert_eq!(config.data.test_size, 0.25);
        assert_eq!(config.data.random_state, 42);
        assert_eq!(config.features.target, "Class");
        assert_eq!(config.features.scale_features, vec!["Amount".to_string()]);
        assert_eq!(config.model.params.n_estimators, 50);
        assert_eq!(config.model.params.max_depth, 4);
        assert_eq!(config.model.params.learning_rate, GbmParams::default().learning_rate);
        assert_eq!(config.training.experiment_name, "nightly");
        assert_eq!(config.training.registered_model_name, "fraud-detection-model");
    }

    #[test]
    fn test_training_config_rejects_bad_test_size() {
        let file = write_toml("[data]\ntest_size = 1.0\n");
        assert!(TrainingConfig::load_from_path(file.path()).is_err());
    }
}
