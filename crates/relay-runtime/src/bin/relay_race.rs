//! relay-race: run a relay race experiment in-process.
//!
//! ```text
//! relay-race 5 1 2 --teams 2 --runners 4 --latency-ms 3 --jitter-ms 2
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use relay_core::{ExperimentConfig, RelayResult};
use relay_runtime::{
    init_logging, DriverConfig, ExperimentDriver, ExperimentResults, RaceBuilder, RunnerConfig,
};
use relay_transport::{InMemoryDirectory, LatencyModel, SimulatedRelocator};

#[derive(Parser, Debug)]
#[command(name = "relay-race", version, about = "Relay race benchmark for mobile runners")]
struct Cli {
    /// Number of trials to run
    num_attempts: String,

    /// Laps in the first trial
    init_laps: String,

    /// Laps added per trial
    step: String,

    /// Number of teams racing at once
    #[arg(long = "teams", default_value_t = 1)]
    teams: usize,

    /// Runners per team (at least 2)
    #[arg(long = "runners", default_value_t = 3)]
    runners: usize,

    /// Base relocation latency in milliseconds
    #[arg(long = "latency-ms", default_value_t = 1)]
    latency_ms: u64,

    /// Uniform jitter added to each relocation, in milliseconds
    #[arg(long = "jitter-ms", default_value_t = 0)]
    jitter_ms: u32,

    /// Seed for the latency generator
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,

    /// Abort a trial that runs longer than this (e.g. "30s")
    #[arg(long = "trial-timeout", value_parser = humantime::parse_duration)]
    trial_timeout: Option<Duration>,

    /// Kill a runner whose hand-off is not acknowledged in time (e.g. "500ms")
    #[arg(long = "ack-timeout", value_parser = humantime::parse_duration)]
    ack_timeout: Option<Duration>,

    /// Print results as JSON instead of a table
    #[arg(long = "json")]
    json: bool,

    /// Log as JSON lines
    #[arg(long = "log-json")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(&cli).await {
        Ok(results) => {
            if cli.json {
                match results.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("error: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print!("{}", results);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "experiment failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> RelayResult<ExperimentResults> {
    let directory = Arc::new(InMemoryDirectory::new());
    let latency = LatencyModel::uniform(Duration::from_millis(cli.latency_ms), cli.jitter_ms);
    let relocator = Arc::new(SimulatedRelocator::new(latency, cli.seed));

    // Validate the experiment before any runner exists
    let driver = ExperimentDriver::with_config(
        ExperimentConfig::from_args(&[&cli.num_attempts, &cli.init_laps, &cli.step])?,
        DriverConfig {
            trial_timeout: cli.trial_timeout,
            ..DriverConfig::default()
        },
        Arc::clone(&directory),
    )?;

    let mut builder = RaceBuilder::new(Arc::clone(&directory), relocator).runner_config(RunnerConfig {
        ack_timeout: cli.ack_timeout,
    });
    for team in 0..cli.teams {
        builder = builder.team(&format!("team{}", team), cli.runners);
    }
    let race = builder.spawn()?;

    let captains = race.captains();
    let results = driver.with_captains(captains).run_all().await;

    for (runner, outcome) in race.shutdown().await {
        match outcome {
            Ok(stats) => tracing::debug!(%runner, ?stats, "runner stopped"),
            Err(e) => tracing::warn!(%runner, error = %e, "runner failed"),
        }
    }
    results
}
