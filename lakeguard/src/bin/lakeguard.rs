//! Lakeguard command-line interface.
//!
//! Validates a CSV dataset against a JSON suite definition and reports the
//! quality assessment. Exit codes: 0 when quality is acceptable, 1 when the
//! assessed severity is High or Critical, 2 when execution itself failed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use sha2::{Digest, Sha256};
use tracing::Level;

use lakeguard::checks::SuiteSpec;
use lakeguard::core::{Dataset, EngineConfig, Layer, PipelineOutcome, ValidationContext};
use lakeguard::error::{GuardError, Result};
use lakeguard::executor::ExecutorConfig;
use lakeguard::logging::{init_logging, LoggingConfig};
use lakeguard::sample::Sampler;
use lakeguard::sources::{CsvSource, DataSource, MemorySource};
use lakeguard::thresholds::{Severity, ThresholdConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Data quality validation for layered data stores", long_about = None)]
struct Cli {
    /// Engine configuration as a JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

/// How much of the suite to run, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Every expectation in the suite, unconditionally
    Full,
    /// Critical expectations only
    Lightweight,
    /// Every expectation, but skip when change detection sees no difference
    Selective,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a CSV dataset against a suite definition
    Validate {
        /// Store layer the dataset belongs to (bronze, silver, gold)
        #[arg(long)]
        layer: Layer,

        /// Dataset name within the layer
        #[arg(long)]
        dataset: String,

        /// Path to the CSV file
        #[arg(long)]
        data_path: PathBuf,

        /// Path to the suite definition JSON
        #[arg(long)]
        suite: PathBuf,

        #[arg(long, value_enum, default_value_t = Mode::Full)]
        mode: Mode,

        /// Threshold policy JSON, overriding the engine configuration
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
    /// Validate with the change-gated, sampled, cached path enabled
    Optimize {
        /// Store layer the dataset belongs to (bronze, silver, gold)
        #[arg(long)]
        layer: Layer,

        /// Dataset name within the layer
        #[arg(long)]
        dataset: String,

        /// Path to the CSV file
        #[arg(long)]
        data_path: PathBuf,

        /// Path to the suite definition JSON
        #[arg(long)]
        suite: PathBuf,

        /// Threshold policy JSON, overriding the engine configuration
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
    /// Show the sampling plan the engine would use for a dataset size
    Plan {
        /// Dataset size in rows
        #[arg(long)]
        rows: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig::default()
        .with_level(cli.log_level)
        .with_json_format(cli.json_logs);
    if let Err(err) = init_logging(logging) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::from(2);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<EngineConfig>(&raw)?
        }
        None => EngineConfig {
            executor: ExecutorConfig::with_host_parallelism(),
            ..Default::default()
        },
    };

    match cli.command {
        Command::Plan { rows } => {
            let sampler = Sampler::new(config.sampler);
            let plan = sampler.plan(rows);
            println!("rows:        {rows}");
            println!("method:      {}", plan.method);
            println!("fraction:    {:.4}", plan.fraction);
            println!("sample rows: {}", plan.sample_rows);
            println!("seed:        {}", plan.seed);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate {
            layer,
            dataset,
            data_path,
            suite,
            mode,
            thresholds,
        } => validate(config, layer, dataset, data_path, suite, mode, thresholds).await,
        Command::Optimize {
            layer,
            dataset,
            data_path,
            suite,
            thresholds,
        } => validate(config, layer, dataset, data_path, suite, Mode::Selective, thresholds).await,
    }
}

async fn validate(
    mut config: EngineConfig,
    layer: Layer,
    dataset: String,
    data_path: PathBuf,
    suite: PathBuf,
    mode: Mode,
    thresholds: Option<PathBuf>,
) -> Result<ExitCode> {
    if let Some(path) = thresholds {
        let raw = std::fs::read_to_string(&path)?;
        config.thresholds = ThresholdConfig::from_json(&raw)?;
    }
    // Change gating only applies in selective mode; plain validation runs
    // even when the snapshot looks unchanged
    config.detector.enabled = mode == Mode::Selective;

    let raw_suite = std::fs::read_to_string(&suite)?;
    let mut validation_suite = SuiteSpec::from_json(&raw_suite)?.into_suite(layer, &dataset)?;
    if mode == Mode::Lightweight {
        validation_suite = validation_suite.critical_only();
    }

    let (ds, source) = load_dataset(layer, &dataset, &data_path).await?;

    let engine = ValidationContext::new(config)?;
    engine.start().await;
    let outcome = engine.validate(&ds, source, &validation_suite).await;
    engine.shutdown().await;

    report(outcome?)
}

/// Materializes the CSV once to fingerprint it, and serves the batches from
/// memory so validation does not re-read the file.
async fn load_dataset(
    layer: Layer,
    name: &str,
    path: &Path,
) -> Result<(Dataset, Arc<dyn DataSource>)> {
    let bytes = std::fs::read(path).map_err(|e| {
        GuardError::data_access_with_source(
            path.display().to_string(),
            "Failed to read dataset file",
            e,
        )
    })?;
    let content_hash = hex::encode(Sha256::digest(&bytes));

    let csv = CsvSource::new(path);
    let batches = csv
        .chunks(&lakeguard::sample::SampleDescriptor::full(0, 0))
        .await?;

    let schema_hash = match batches.first() {
        Some(batch) => {
            let mut hasher = Sha256::new();
            for field in batch.schema().fields() {
                hasher.update(field.name().as_bytes());
                hasher.update(field.data_type().to_string().as_bytes());
            }
            hex::encode(hasher.finalize())
        }
        None => String::from("empty"),
    };

    let source = MemorySource::new(batches);
    let dataset = Dataset::new(
        layer,
        name,
        path.display().to_string(),
        source.row_count(),
        content_hash,
        schema_hash,
    );
    Ok((dataset, Arc::new(source)))
}

fn report(outcome: PipelineOutcome) -> Result<ExitCode> {
    match outcome {
        PipelineOutcome::Skipped { change } => {
            println!("skipped: dataset unchanged ({change:?})");
            Ok(ExitCode::SUCCESS)
        }
        PipelineOutcome::Validated {
            run,
            assessment,
            alert,
            from_cache,
            ..
        } => {
            println!("run:          {}", run.id);
            println!("status:       {:?}", run.status);
            println!(
                "success rate: {:.1}% ({}/{} expectations)",
                run.success_rate * 100.0,
                run.total_expectations() - run.failed_expectations(),
                run.total_expectations()
            );
            println!("sample:       {} ({} rows)", run.sample.method, run.sample.sample_rows);
            println!("duration:     {} ms{}", run.duration_ms, if from_cache { " (cached)" } else { "" });
            println!("severity:     {}", assessment.severity);

            for outcome in run.outcomes.iter().filter(|o| o.status.is_failed()) {
                let detail = outcome.detail.as_deref().unwrap_or("no detail");
                println!("  [{:?}] {}: {detail}", outcome.status, outcome.id);
            }
            for breach in &assessment.breaches {
                println!("  breach: {breach}");
            }
            if let Some(alert) = alert {
                println!("alert:        {} (level {})", alert.id, alert.escalation_level);
            }

            if assessment.severity >= Severity::High {
                Ok(ExitCode::from(1))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_validate_accepts_selective_mode() {
        let cli = Cli::parse_from([
            "lakeguard", "validate",
            "--layer", "gold",
            "--dataset", "fact_sales",
            "--data-path", "/data/gold/fact_sales.csv",
            "--suite", "suite.json",
            "--mode", "selective",
        ]);
        assert!(matches!(
            cli.command,
            Command::Validate { mode: Mode::Selective, .. }
        ));
    }

    #[test]
    fn test_optimize_subcommand_parses() {
        let cli = Cli::parse_from([
            "lakeguard", "optimize",
            "--layer", "silver",
            "--dataset", "orders",
            "--data-path", "/data/silver/orders.csv",
            "--suite", "suite.json",
        ]);
        assert!(matches!(cli.command, Command::Optimize { .. }));
    }
}
