use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;

use relipredict::config::{Config, LoggingConfig};
use relipredict::models::{resolve_algorithms, FitEngine, FitOutcome, WalkForward};
use relipredict::narrative::{ChatNarrativeClient, NarrativeService};
use relipredict::preprocess::{
    preprocess, MissingStrategy, NormalizationMethod, OutlierMethod, PreprocessConfig,
};
use relipredict::report::{export, run_analysis, AnalysisReport, FitRequest, NarrativeStatus, ReportAggregator};
use relipredict::series::{tabular, FailureRecord};
use relipredict::trend::{analyze_trend, TrendVerdict};

#[derive(Parser)]
#[command(
    name = "relipredict",
    about = "Software reliability prediction from time-between-failures data",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults: $RELIPREDICT_CONFIG, then /etc/relipredict/relipredict.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Clean a TBF column and print summary statistics
    Preprocess {
        /// CSV file with a `tbf` column
        input: PathBuf,

        #[command(flatten)]
        cleaning: CleaningArgs,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run the trend test and fit models to an already clean series
    Predict {
        /// CSV file with a `tbf` column
        input: PathBuf,

        #[command(flatten)]
        fitting: FittingArgs,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Full analysis: preprocess, trend, fit, and report
    Report {
        /// CSV file with a `tbf` column
        input: PathBuf,

        #[command(flatten)]
        cleaning: CleaningArgs,

        #[command(flatten)]
        fitting: FittingArgs,

        /// Request a generated narrative (needs the API key variable set)
        #[arg(long)]
        narrative: bool,

        /// Also write the prediction table as CSV
        #[arg(long)]
        export: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct CleaningArgs {
    /// Missing value handling: drop, mean, median or interpolate
    #[arg(long, default_value = "mean", value_parser = parse_choice::<MissingStrategy>)]
    missing: MissingStrategy,

    /// Outlier removal: none, zscore or iqr
    #[arg(long, default_value = "zscore", value_parser = parse_choice::<OutlierMethod>)]
    outliers: OutlierMethod,

    /// Normalise the processed series
    #[arg(long)]
    normalize: bool,

    /// Normalisation method: zscore or minmax
    #[arg(long, default_value = "zscore", value_parser = parse_choice::<NormalizationMethod>)]
    normalization: NormalizationMethod,
}

impl CleaningArgs {
    fn to_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            missing_strategy: self.missing,
            outlier_method: self.outliers,
            normalize: self.normalize,
            normalization_method: self.normalization,
            ..Default::default()
        }
    }
}

#[derive(Args)]
struct FittingArgs {
    /// Fraction of records used for training (config default when omitted)
    #[arg(long)]
    train_ratio: Option<f64>,

    /// Comma-separated model ids: GO, JM, YS, GM, Statistical, Bayesian, BP
    #[arg(long, value_delimiter = ',')]
    algorithms: Vec<String>,

    /// Also score each model by expanding-window walk-forward validation
    #[arg(long)]
    walk_forward: bool,

    /// Cumulative times predicted per walk-forward fold
    #[arg(long, default_value_t = 1)]
    cv_horizon: usize,

    /// Attach normal-approximation prediction intervals at this level (0.05 = 95%)
    #[arg(long)]
    interval_alpha: Option<f64>,
}

impl FittingArgs {
    fn to_request(&self, config: &Config) -> Result<FitRequest> {
        let ids = if self.algorithms.is_empty() {
            &config.fitting.algorithms
        } else {
            &self.algorithms
        };
        let mut options = config.fitting.fit_options();
        if self.walk_forward {
            options.walk_forward = Some(WalkForward {
                horizon: self.cv_horizon,
                ..options.walk_forward.unwrap_or_default()
            });
        }
        if self.interval_alpha.is_some() {
            options.interval_alpha = self.interval_alpha;
        }
        Ok(FitRequest {
            train_ratio: self.train_ratio.unwrap_or(config.fitting.train_ratio),
            algorithms: resolve_algorithms(ids)?,
            options,
        })
    }
}

/// Accept the same lowercase names the JSON API uses.
fn parse_choice<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
        .map_err(|_| format!("unsupported value '{}'", s))
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_input(path: &Path) -> Result<Vec<Option<f64>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(tabular::read_tbf(file)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            tracing::info!(%bind, "Starting relipredict server");
            relipredict::serve(&config, &bind).await?;
        }
        Commands::Preprocess {
            input,
            cleaning,
            json,
        } => {
            let raw = read_input(&input)?;
            let result = preprocess(&raw, &cleaning.to_config())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\nPreprocessing Summary");
                println!("{:<20} : {}", "Original records", result.stats.original_count);
                println!("{:<20} : {}", "Processed records", result.stats.processed_count);
                println!("{:<20} : {:.4}", "Mean TBF", result.stats.mean);
                println!("{:<20} : {:.4}", "Std deviation", result.stats.std_dev);
                if let Some(n) = &result.normalization {
                    println!("{:<20} : {:?} (offset {:.4}, scale {:.4})", "Normalization", n.method, n.offset, n.scale);
                }
                println!();
            }
        }
        Commands::Predict {
            input,
            fitting,
            json,
        } => {
            let raw = read_input(&input)?;
            let values = raw
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    v.with_context(|| {
                        format!("record {} is missing; run `relipredict preprocess` or `report` instead", i + 1)
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            let series = FailureRecord::new(values)?;
            let request = fitting.to_request(&config)?;
            let engine = FitEngine::new(Some(config.fitting.workers));
            let outcome = engine
                .fit(&series, request.train_ratio, &request.algorithms, &request.options)
                .await?;
            let trend = analyze_trend(&series);

            if json {
                let payload = serde_json::json!({ "trend": trend, "fit": outcome });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_trend(&trend);
                print_fits(&outcome);
                println!();
            }
        }
        Commands::Report {
            input,
            cleaning,
            fitting,
            narrative,
            export: export_path,
            json,
        } => {
            let raw = read_input(&input)?;
            let request = fitting.to_request(&config)?;
            let engine = FitEngine::new(Some(config.fitting.workers));
            let analysis = run_analysis(&engine, &raw, &cleaning.to_config(), &request).await?;

            let service: Option<Arc<dyn NarrativeService>> = if narrative {
                match ChatNarrativeClient::from_config(&config.narrative) {
                    Ok(client) => Some(Arc::new(client)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Narrative unavailable");
                        None
                    }
                }
            } else {
                None
            };
            let aggregator =
                ReportAggregator::new(service, Duration::from_secs(config.narrative.timeout_secs));
            let report = aggregator.assemble(analysis, narrative).await;

            if let Some(path) = export_path {
                let csv = export::to_csv(&report)?;
                std::fs::write(&path, csv)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                tracing::info!(path = %path.display(), "Prediction table exported");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

fn print_trend(trend: &TrendVerdict) {
    println!("\n=== Trend Analysis ===");
    println!("Laplace factor : {:.4}", trend.laplace_score);
    println!("Status         : {:?}", trend.status);
    println!("Assessment     : {}", trend.assessment);
}

fn print_fits(outcome: &FitOutcome) {
    println!(
        "\n=== Model Fits (train {} / test {}) ===",
        outcome.split.train_len, outcome.split.test_len
    );
    println!("{:<30} | {:>12} | {:>12}", "Model", "RMSE", "MAE");
    println!("{:-<30}-|-{:->12}-|-{:->12}", "", "", "");
    for fit in &outcome.results {
        println!("{:<30} | {:>12.4} | {:>12.4}", fit.name, fit.rmse, fit.mae);
        if let Some(cv) = &fit.cross_validation {
            match (cv.rmse, cv.mae) {
                (Some(rmse), Some(mae)) => println!(
                    "{:<30} | {:>12.4} | {:>12.4}",
                    format!("  walk-forward ({}/{} folds)", cv.used, cv.attempted),
                    rmse,
                    mae
                ),
                _ => println!("{:<30} | no usable folds", "  walk-forward"),
            }
        }
    }
    for failure in &outcome.failures {
        println!("{:<30} | FAILED: {}", failure.name, failure.reason);
    }
}

fn print_report(report: &AnalysisReport) {
    println!("\n=== Reliability Analysis Report ===");
    println!("Report id      : {}", report.id);
    println!("Generated      : {}", report.generated_at.to_rfc3339());
    println!(
        "Records        : {} submitted, {} after preprocessing",
        report.preprocess.stats.original_count, report.preprocess.stats.processed_count
    );
    println!("Total time     : {:.2}", report.diagnostics.total_time);
    print_trend(&report.trend);

    let outcome = FitOutcome {
        split: report.split,
        results: report.fits.clone(),
        failures: report.failures.clone(),
    };
    print_fits(&outcome);

    match &report.best_model {
        Some(best) => println!("\nBest model: {} (RMSE {:.4})", best.name, best.rmse),
        None => println!("\nBest model: none"),
    }
    match &report.narrative_status {
        NarrativeStatus::Generated => {
            if let Some(text) = &report.narrative {
                println!("\n=== Narrative ===\n{}", text);
            }
        }
        NarrativeStatus::Degraded { reason } => println!("Narrative unavailable: {}", reason),
        NarrativeStatus::NotRequested => {}
    }
    println!();
}
