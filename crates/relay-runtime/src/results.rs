//! Trial timings collected by the judge

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Outcome of one trial
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TrialResult {
    pub attempt: u32,
    pub laps: u32,
    /// From the first start signal to the last completion
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl TrialResult {
    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

/// All trials of an experiment, in attempt order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExperimentResults {
    trials: Vec<TrialResult>,
}

impl ExperimentResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trial: TrialResult) {
        self.trials.push(trial);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrialResult> {
        self.trials.iter()
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Sum of all trial durations
    pub fn total(&self) -> Duration {
        self.trials.iter().map(|t| t.elapsed).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl<'a> IntoIterator for &'a ExperimentResults {
    type Item = &'a TrialResult;
    type IntoIter = std::slice::Iter<'a, TrialResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.trials.iter()
    }
}

impl fmt::Display for ExperimentResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>8} {:>8} {:>12}", "attempt", "laps", "time (ms)")?;
        for trial in &self.trials {
            writeln!(
                f,
                "{:>8} {:>8} {:>12}",
                trial.attempt,
                trial.laps,
                trial.elapsed_millis()
            )?;
        }
        Ok(())
    }
}
