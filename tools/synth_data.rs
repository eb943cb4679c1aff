//! Synthetic Dataset Generator
//!
//! Writes a creditcard-shaped CSV (`Time, V1..V28, Amount, Class`) so the
//! training pipeline can be exercised without the public dataset.

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tracing::info;

/// Components whose distribution differs for fraud rows, with the mean shift
const FRAUD_SHIFTS: [(usize, f64); 6] = [
    (3, -2.5),  // V3
    (4, 2.0),   // V4
    (10, -3.0), // V10
    (12, -2.5), // V12
    (14, -4.0), // V14
    (17, -3.0), // V17
];

#[derive(Parser, Debug)]
#[command(name = "synth-data", about = "Generate a synthetic card transaction dataset")]
struct Args {
    /// Output CSV path
    #[arg(short, long, default_value = "data/creditcard.csv")]
    output: PathBuf,

    /// Number of rows
    #[arg(short = 'n', long, default_value_t = 50_000)]
    rows: usize,

    /// Fraction of fraudulent rows
    #[arg(long, default_value_t = 0.01)]
    fraud_rate: f64,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Row generator for the synthetic dataset
struct TransactionGenerator {
    rng: StdRng,
    elapsed_secs: f64,
}

impl TransactionGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            elapsed_secs: 0.0,
        }
    }

    /// Approximately standard normal via the sum of twelve uniforms
    fn normal(&mut self) -> f64 {
        (0..12).map(|_| self.rng.gen::<f64>()).sum::<f64>() - 6.0
    }

    fn generate(&mut self, fraud: bool) -> Vec<f64> {
        self.elapsed_secs += self.rng.gen_range(0.0..4.0);

        let mut row = Vec::with_capacity(31);
        row.push(self.elapsed_secs.floor());
        for v in 1..=28 {
            let shift = if fraud {
                FRAUD_SHIFTS
                    .iter()
                    .find(|(idx, _)| *idx == v)
                    .map_or(0.0, |(_, s)| *s)
            } else {
                0.0
            };
            row.push(self.normal() + shift);
        }

        // Legitimate amounts are mostly small; fraud skews either tiny or large
        let amount = if fraud {
            if self.rng.gen_bool(0.5) {
                self.rng.gen_range(0.0..5.0)
            } else {
                self.rng.gen_range(200.0..2500.0)
            }
        } else {
            (self.normal() * 1.2 + 3.5).exp().min(25_000.0)
        };
        row.push((amount * 100.0).round() / 100.0);
        row.push(if fraud { 1.0 } else { 0.0 });
        row
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.fraud_rate),
        "fraud rate must lie in [0, 1]"
    );

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("failed to open {}", args.output.display()))?;

    let mut header = vec!["Time".to_string()];
    header.extend((1..=28).map(|v| format!("V{}", v)));
    header.push("Amount".to_string());
    header.push("Class".to_string());
    writer.write_record(&header)?;

    let mut generator = TransactionGenerator::new(args.seed);
    let mut fraud_count = 0;
    for _ in 0..args.rows {
        let fraud = generator.rng.gen_bool(args.fraud_rate);
        if fraud {
            fraud_count += 1;
        }
        let row = generator.generate(fraud);
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;

    info!(
        output = %args.output.display(),
        rows = args.rows,
        fraud = fraud_count,
        "Dataset written"
    );
    Ok(())
}
