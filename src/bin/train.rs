//! Model training entry point
//!
//! Trains the fraud scorer from a CSV dataset, writes the artifacts the
//! service loads, and records the run in the local experiment tracker.

use anyhow::{Context, Result};
use clap::Parser;
use fraud_detection_service::{
    config::{TrainingConfig, DEFAULT_TRAINING_CONFIG_PATH},
    logging,
    training::TrainingPipeline,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the fraud detection model")]
struct Args {
    /// Training configuration file
    #[arg(short, long, default_value = DEFAULT_TRAINING_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = TrainingConfig::load_from_path(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    logging::init(&config.logging)?;
    info!(
        source = %config.data.source.display(),
        experiment = %config.training.experiment_name,
        "Starting training run"
    );

    let outcome = TrainingPipeline::new(config)
        .run()
        .context("training failed")?;

    info!(
        run_id = %outcome.run_id,
        artifacts = %outcome.artifacts_dir.display(),
        f1 = outcome.metrics.f1,
        roc_auc = ?outcome.metrics.roc_auc,
        "Training complete"
    );
    Ok(())
}
