//! Runner roles and hand-off states
//!
//! Captains and plain runners share the whole hand-off protocol. The role
//! only decides whether lap counting runs after an arrival.

use std::fmt;

/// Role of a race participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Counts laps and reports completion to the judge
    Captain,
    /// Relocates and hands off, nothing else
    #[default]
    Runner,
    /// Runs the experiment; never part of a ring
    Judge,
}

impl Role {
    /// Parse the bootstrap captain flag (`true`, any case, means captain)
    pub fn from_flag(flag: &str) -> Self {
        if flag.eq_ignore_ascii_case("true") {
            Role::Captain
        } else {
            Role::Runner
        }
    }

    /// Directory service type this role registers under
    pub fn service_type(self) -> &'static str {
        match self {
            Role::Captain => "RAc",
            Role::Runner => "RA",
            Role::Judge => "JA",
        }
    }

    #[inline]
    pub fn is_captain(self) -> bool {
        matches!(self, Role::Captain)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_type())
    }
}

/// Hand-off state machine of a runner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RunnerState {
    /// Resident at a location, not carrying the baton
    #[default]
    Waiting,
    /// Migration in flight, suspended until arrival
    Relocating,
    /// Just arrived, deciding the next step
    Evaluating,
    /// Request sent to the target, awaiting its acknowledgement
    HandingOff,
    /// Fatal error, deregistered
    Dead,
}
