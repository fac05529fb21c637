use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use energydash::config::{DashboardConfig, LoggingConfig};
use energydash::pipeline::{self, ParameterOverrides, PipelineError};
use energydash::simulate::{self, SimulationPlan};
use energydash::storage;

#[derive(Parser)]
#[command(
    name = "energydash",
    about = "Live energy-consumption dashboard with inactivity detection and forecasting",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard server (API + static UI + background refresh)
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the analysis once and print the result
    Report {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Append a synthetic meter series to the database
    Simulate {
        /// Number of events to generate
        #[arg(long, default_value = "500")]
        events: usize,

        /// Mean seconds between events
        #[arg(long, default_value = "5")]
        interval_secs: f64,

        /// Probability of a flagged spike per event
        #[arg(long, default_value = "0.02")]
        anomaly_rate: f64,
    },
}

#[derive(Args, Default)]
struct ParamArgs {
    /// Forecast window in seconds (10-120)
    #[arg(long)]
    horizon: Option<u32>,

    /// Forecast sampling step in seconds (1, 5 or 10)
    #[arg(long)]
    step: Option<u32>,

    /// Inactivity energy floor in Wh (0.01-1.0)
    #[arg(long)]
    energy_threshold: Option<f64>,

    /// Inactivity time floor in seconds (5-120)
    #[arg(long)]
    time_threshold: Option<f64>,

    /// Rows in the event tables (10-200)
    #[arg(long)]
    rows: Option<usize>,
}

impl From<ParamArgs> for ParameterOverrides {
    fn from(args: ParamArgs) -> Self {
        ParameterOverrides {
            prediction_horizon_seconds: args.horizon,
            prediction_step_seconds: args.step,
            energy_threshold: args.energy_threshold,
            time_threshold: args.time_threshold,
            table_row_count: args.rows,
            ..ParameterOverrides::default()
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config warnings are emitted before the configured subscriber exists.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || {
        DashboardConfig::load_or_default(cli.config.as_deref())
    })?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting energydash server");
            energydash::serve(config).await?;
        }
        Commands::Report { json, params } => {
            let params = ParameterOverrides::from(params).apply(&config.defaults);
            params.validate()?;

            let source = storage::SqliteEventSource::deferred(config.storage.clone());

            let report = match pipeline::run(&source, &params).await {
                Ok(report) => report,
                Err(PipelineError::DataUnavailable { detail }) => {
                    tracing::error!(%detail, "event store unavailable");
                    anyhow::bail!("energy data is unavailable");
                }
                Err(e @ PipelineError::InsufficientData { .. }) => {
                    println!("{}", e);
                    return Ok(());
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let s = &report.summary;
                let m = &report.model;
                println!("\nenergydash Report ({})", report.generated_at.to_rfc3339());
                println!("{:<28} | Value", "Metric");
                println!("{:-<28}-|-{:-<20}", "", "");
                println!("{:<28} | {:.2} Wh", "Total energy", s.total_energy_wh);
                println!("{:<28} | {:.2} Wh", "Mean event energy", s.mean_event_energy_wh);
                println!("{:<28} | {}", "Anomalies", s.anomaly_count);
                println!("{:<28} | {}", "Inactive events", s.inactive_count);
                println!("{:<28} | {}", "Events", s.event_count);
                println!("\n=== Model (polynomial degree {}) ===", m.degree);
                println!("R2:   {:.4}", m.r2);
                println!("RMSE: {:.4} Wh", m.rmse);
                println!("MAE:  {:.4} Wh", m.mae);
                println!("\n=== Forecast ===");
                for p in &report.consumption.forecast {
                    println!("t={:>10.1}s : {:.4} Wh", p.elapsed_seconds, p.predicted_energy_wh);
                }
                println!();
            }
        }
        Commands::Simulate {
            events,
            interval_secs,
            anomaly_rate,
        } => {
            let pool = storage::open_pool(&config.storage)?;
            let previous = storage::latest_event(&pool)?;
            let plan = SimulationPlan {
                events,
                interval_secs,
                anomaly_rate,
                ..SimulationPlan::default()
            };

            let series = simulate::generate(
                previous.as_ref(),
                chrono::Utc::now(),
                &plan,
                &mut rand::thread_rng(),
            );
            storage::save_events(&pool, &series)?;
            tracing::info!(
                events = series.len(),
                db = %config.storage.db_path.display(),
                "Simulated events written"
            );
            println!("Wrote {} events to {}", series.len(), config.storage.db_path.display());
        }
    }

    Ok(())
}
