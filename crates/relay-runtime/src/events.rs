//! Race events published by runners for observers

use tokio::sync::mpsc;

use relay_core::{Location, RelayError, RunnerId};

/// Something observable that happened during a race
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RaceEvent {
    /// A captain accepted a start signal
    Started { captain: RunnerId, laps: u32 },
    /// A runner finished a relocation
    Arrived { runner: RunnerId, location: Location },
    /// A captain closed a lap by arriving back at its origin
    LapCompleted {
        captain: RunnerId,
        completed: u32,
        of: u32,
        origin: Location,
    },
    /// A hand-off request was sent
    HandedOff { from: RunnerId, to: RunnerId },
    /// A captain reported completion to the judge; `location` is the
    /// origin of its next trial
    Completed {
        captain: RunnerId,
        laps: u32,
        location: Location,
    },
    /// A runner died
    Failed { runner: RunnerId, reason: String },
}

impl RaceEvent {
    pub(crate) fn failed(runner: &RunnerId, error: &RelayError) -> Self {
        RaceEvent::Failed {
            runner: runner.clone(),
            reason: error.to_string(),
        }
    }
}

/// Publishing side of the event stream
pub type EventSink = mpsc::UnboundedSender<RaceEvent>;

/// Receiving side of the event stream
pub type EventStream = mpsc::UnboundedReceiver<RaceEvent>;

/// Create an event channel
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}
