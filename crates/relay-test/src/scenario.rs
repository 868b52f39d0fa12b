//! Whole-race scenarios
//!
//! A scenario wires up everything a race needs in one process: directory,
//! simulated relocator, the teams and the judge. It runs the experiment,
//! stops every runner and checks the recorded events.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{ExperimentConfig, Location, RelayResult, RunnerId};
use relay_runtime::{
    event_channel, DriverConfig, ExperimentDriver, ExperimentResults, RaceBuilder, RunnerConfig,
    RunnerStats, Team,
};
use relay_transport::{InMemoryDirectory, LatencyModel, SimulatedRelocator};

use crate::EventRecorder;

// ============================================================================
// SCENARIO CONFIGURATION
// ============================================================================

/// Configuration of a race scenario
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Number of teams racing at once
    pub teams: usize,

    /// Runners per team
    pub runners: usize,

    /// Trials and their lap counts
    pub experiment: ExperimentConfig,

    /// Relocation latency
    pub latency: LatencyModel,

    /// Seed for the latency generator
    pub seed: u64,

    pub trial_timeout: Option<Duration>,
    pub ack_timeout: Option<Duration>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            teams: 1,
            runners: 3,
            experiment: ExperimentConfig::new(2, 1, 2),
            latency: LatencyModel::instant(),
            seed: 0,
            trial_timeout: None,
            ack_timeout: None,
        }
    }
}

impl ScenarioConfig {
    /// Smallest race that still hands off: one lap on a ring of two
    pub fn minimal() -> Self {
        Self {
            runners: 2,
            experiment: ExperimentConfig::new(1, 1, 0),
            ..Self::default()
        }
    }

    pub fn standard() -> Self {
        Self::default()
    }

    /// Several teams sharing containers, with jittered relocation
    pub fn stress() -> Self {
        Self {
            teams: 4,
            runners: 6,
            experiment: ExperimentConfig::new(5, 1, 3),
            latency: LatencyModel::uniform(Duration::from_millis(1), 2),
            seed: 42,
            ..Self::default()
        }
    }

    pub fn with_teams(mut self, teams: usize, runners: usize) -> Self {
        self.teams = teams;
        self.runners = runners;
        self
    }

    pub fn with_experiment(mut self, experiment: ExperimentConfig) -> Self {
        self.experiment = experiment;
        self
    }

    pub fn with_latency(mut self, latency: LatencyModel) -> Self {
        self.latency = latency;
        self
    }
}

// ============================================================================
// SCENARIO RESULT
// ============================================================================

/// Outcome of a scenario run
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Timings reported by the judge
    pub results: ExperimentResults,

    /// Teams as formed at setup
    pub teams: Vec<Team>,

    /// Everything the runners published
    pub events: EventRecorder,

    /// Counters of runners that stopped cleanly
    pub stats: Vec<(RunnerId, RunnerStats)>,

    /// Where each runner resided once the last trial finished
    pub final_locations: Vec<(RunnerId, Location)>,

    /// Runners that stopped with an error
    pub failures: Vec<(RunnerId, String)>,

    /// Successful relocations
    pub relocations: u64,

    /// Specific invariant violations
    pub invariant_violations: Vec<String>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.invariant_violations.is_empty()
    }

    /// Sum of a counter over every runner
    pub fn total(&self, counter: impl Fn(&RunnerStats) -> u64) -> u64 {
        self.stats.iter().map(|(_, s)| counter(s)).sum()
    }
}

// ============================================================================
// SCENARIO HARNESS
// ============================================================================

/// Runs a race scenario end to end
pub struct ScenarioHarness {
    config: ScenarioConfig,
}

impl ScenarioHarness {
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Run the experiment, stop the race and verify the recorded events
    pub async fn run(&self) -> RelayResult<ScenarioResult> {
        let config = &self.config;
        let directory = Arc::new(InMemoryDirectory::new());
        let relocator = Arc::new(SimulatedRelocator::new(config.latency.clone(), config.seed));
        let (sink, stream) = event_channel();

        let driver = ExperimentDriver::with_config(
            config.experiment,
            DriverConfig {
                trial_timeout: config.trial_timeout,
                ..DriverConfig::default()
            },
            Arc::clone(&directory),
        )?;

        let mut builder = RaceBuilder::new(Arc::clone(&directory), Arc::clone(&relocator))
            .runner_config(RunnerConfig {
                ack_timeout: config.ack_timeout,
            })
            .events(sink);
        for team in 0..config.teams {
            builder = builder.team(&format!("team{}", team), config.runners);
        }
        let race = builder.spawn()?;
        let teams = race.teams().to_vec();

        let outcome = driver.with_captains(race.captains()).run_all().await;
        let final_locations = race.locations();

        let mut stats = Vec::new();
        let mut failures = Vec::new();
        for (runner, stopped) in race.shutdown().await {
            match stopped {
                Ok(s) => stats.push((runner, s)),
                Err(e) => failures.push((runner, e.to_string())),
            }
        }
        let events = EventRecorder::collect(stream).await;

        let results = outcome?;
        let invariant_violations = events.check(&teams, &results);

        Ok(ScenarioResult {
            results,
            teams,
            events,
            stats,
            final_locations,
            failures,
            relocations: relocator.relocations(),
            invariant_violations,
        })
    }
}
