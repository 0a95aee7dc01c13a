//! # Resilience Load Test CLI
//!
//! Command-line interface for running resilience scenarios against the images API.
//!
//! ## Usage
//!
//! ```bash
//! # Verify every endpoint answers
//! resilience-loadtest smoke --target http://localhost:8080
//!
//! # Observe circuit breakers while ramping to 50 actors
//! resilience-loadtest circuit-breaker
//!
//! # Custom scenario, JSON report on stdout
//! resilience-loadtest --json run --config harness.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use resilience_loadtest::{
    scenarios, EmptyResultPolicy, HarnessConfig, HarnessError, RunReport, ScenarioDriver,
    ThresholdReport,
};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "resilience-loadtest")]
#[command(version)]
#[command(about = "Load testing tool for observing resilience patterns of the images API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target base URL (defaults to the scenario's own target)
    #[arg(short, long, global = true, env = "RESILIENCE_TARGET")]
    target: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    request_timeout: Option<u64>,

    /// How empty lists and empty pages are counted
    #[arg(long, global = true, value_enum)]
    empty_results: Option<EmptyResults>,

    /// Print the report as JSON instead of the text layout
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// One actor checking every endpoint for 15s
    Smoke,

    /// Ramp to 50 actors over the circuit-breaker protected endpoints
    CircuitBreaker,

    /// Login at 25 requests/s to trigger the rate limiter
    RateLimiter,

    /// Rate limiter and circuit breakers together, up to 100 actors
    Combined,

    /// Run a scenario described in a TOML file
    Run {
        /// Scenario file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmptyResults {
    /// Empty results count as fallbacks
    Fallback,
    /// Empty results count as successes
    Success,
}

impl From<EmptyResults> for EmptyResultPolicy {
    fn from(value: EmptyResults) -> Self {
        match value {
            EmptyResults::Fallback => EmptyResultPolicy::Fallback,
            EmptyResults::Success => EmptyResultPolicy::Success,
        }
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    report: &'a RunReport,
    thresholds: &'a ThresholdReport,
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so the report on stdout stays clean
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<HarnessConfig, HarnessError> {
    let mut config = match &cli.command {
        Commands::Smoke => scenarios::smoke(),
        Commands::CircuitBreaker => scenarios::circuit_breaker(),
        Commands::RateLimiter => scenarios::rate_limiter(),
        Commands::Combined => scenarios::combined(),
        Commands::Run { config } => HarnessConfig::from_file(config)?,
    };

    if let Some(target) = &cli.target {
        config.target_url = target.clone();
    }
    if let Some(timeout) = cli.request_timeout {
        config.request_timeout_secs = timeout;
    }
    if let Some(policy) = cli.empty_results {
        config.empty_result_policy = policy.into();
    }

    config.validate()?;
    Ok(config)
}

async fn run(config: HarnessConfig, json: bool) -> anyhow::Result<bool> {
    let thresholds = config.thresholds;
    let driver = ScenarioDriver::new(config)?;

    let report = driver.run().await;
    let verdict = report.evaluate(&thresholds);

    if json {
        let document = JsonDocument {
            report: &report,
            thresholds: &verdict,
        };
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        report.print_report();
        verdict.print_report();
    }

    Ok(verdict.passes)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Resilience Load Test Tool v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    match run(config, cli.json).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
