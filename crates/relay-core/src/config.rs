//! Bootstrap configuration for the judge and the runners
//!
//! Both entities receive their parameters as plain string arguments.
//! Anything malformed is a configuration error and the entity never
//! starts.

use crate::{RelayError, RelayResult, Role, RunnerId};

/// Experiment parameters given to the judge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExperimentConfig {
    /// Total number of attempts to run
    pub num_attempts: u32,
    /// Laps in the first attempt
    pub init_laps: u32,
    /// Laps added per attempt
    pub step: u32,
}

impl ExperimentConfig {
    pub fn new(num_attempts: u32, init_laps: u32, step: u32) -> Self {
        ExperimentConfig {
            num_attempts,
            init_laps,
            step,
        }
    }

    /// Parse `numAttempts initLaps step`
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> RelayResult<Self> {
        if args.len() != 3 {
            return Err(RelayError::Config(format!(
                "expected 3 arguments (numAttempts initLaps step), got {}",
                args.len()
            )));
        }

        let num_attempts = parse_count("numAttempts", args[0].as_ref())?;
        let init_laps = parse_count("initLaps", args[1].as_ref())?;
        let step = parse_count("step", args[2].as_ref())?;
        let config = ExperimentConfig::new(num_attempts, init_laps, step);
        config.validate()?;

        tracing::info!(
            attempts = num_attempts,
            init_laps,
            step,
            "init experiment"
        );
        Ok(config)
    }

    /// Reject schedules whose last attempt would overflow the lap counter
    pub fn validate(&self) -> RelayResult<()> {
        if self.num_attempts > 0 {
            self.laps_for_attempt(self.num_attempts - 1)?;
        }
        Ok(())
    }

    /// Laps run in attempt `k`: `initLaps + k * step`
    pub fn laps_for_attempt(&self, attempt: u32) -> RelayResult<u32> {
        attempt
            .checked_mul(self.step)
            .and_then(|extra| extra.checked_add(self.init_laps))
            .ok_or_else(|| {
                RelayError::Config(format!("lap count of attempt {} overflows", attempt))
            })
    }

    /// `(attempt, laps)` for every attempt, in order
    pub fn schedule(&self) -> impl Iterator<Item = (u32, u32)> {
        let config = *self;
        (0..config.num_attempts).map(move |k| {
            // exact once validate() has passed
            (k, config.init_laps.saturating_add(k.saturating_mul(config.step)))
        })
    }
}

/// Bootstrap arguments of a runner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerArgs {
    pub role: Role,
    pub target: RunnerId,
}

impl RunnerArgs {
    /// Parse `isCaptain targetName`
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> RelayResult<Self> {
        if args.len() != 2 {
            return Err(RelayError::Config(format!(
                "expected 2 arguments (isCaptain targetName), got {}",
                args.len()
            )));
        }

        let role = Role::from_flag(args[0].as_ref());
        let target = args[1].as_ref().trim();
        if target.is_empty() {
            return Err(RelayError::Config("incorrect target runner".into()));
        }

        Ok(RunnerArgs {
            role,
            target: RunnerId::new(target),
        })
    }
}

fn parse_count(name: &str, raw: &str) -> RelayResult<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|e| RelayError::Config(format!("{} must be a non-negative integer: {:?} ({})", name, raw, e)))
}
