//! Relocation service
//!
//! Moving a runner is a logical transition: the service takes some time
//! and then reports the location the runner arrived at. Completion of the
//! returned future is the arrival callback and happens at most once.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;

use relay_core::{Location, RelayError, RelayResult, RunnerId};

use crate::LatencyModel;

/// Moves a runner's execution context between locations
pub trait Relocator: Send + Sync + 'static {
    /// Relocate `runner` to `destination`, resolving to the arrival location
    fn relocate(
        &self,
        runner: &RunnerId,
        destination: &Location,
    ) -> impl Future<Output = RelayResult<Location>> + Send;
}

/// In-process relocation with simulated travel time
pub struct SimulatedRelocator {
    latency: LatencyModel,
    rng: Mutex<StdRng>,
    /// Locations that exist; empty means any location exists
    known: HashSet<Location>,
    /// Locations that currently refuse arrivals
    blocked: RwLock<HashSet<Location>>,
    relocations: AtomicU64,
}

impl SimulatedRelocator {
    pub fn new(latency: LatencyModel, seed: u64) -> Self {
        SimulatedRelocator {
            latency,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            known: HashSet::new(),
            blocked: RwLock::new(HashSet::new()),
            relocations: AtomicU64::new(0),
        }
    }

    /// Restrict destinations to a fixed set of locations
    pub fn with_locations(mut self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.known = locations.into_iter().collect();
        self
    }

    /// Make arrivals at `location` fail until unblocked
    pub fn block(&self, location: Location) {
        self.blocked.write().insert(location);
    }

    pub fn unblock(&self, location: &Location) {
        self.blocked.write().remove(location);
    }

    /// Completed relocations so far
    pub fn relocations(&self) -> u64 {
        self.relocations.load(Ordering::Relaxed)
    }

    fn admit(&self, runner: &RunnerId, destination: &Location) -> RelayResult<Location> {
        let reason = if !self.known.is_empty() && !self.known.contains(destination) {
            Some("unknown location")
        } else if self.blocked.read().contains(destination) {
            Some("location unreachable")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(RelayError::Relocation {
                runner: runner.clone(),
                destination: destination.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(destination.clone()),
        }
    }
}

impl Default for SimulatedRelocator {
    fn default() -> Self {
        Self::new(LatencyModel::default(), 0)
    }
}

impl Relocator for SimulatedRelocator {
    fn relocate(
        &self,
        runner: &RunnerId,
        destination: &Location,
    ) -> impl Future<Output = RelayResult<Location>> + Send {
        let delay = self.latency.sample(&mut self.rng.lock());
        let outcome = self.admit(runner, destination);
        if outcome.is_ok() {
            self.relocations.fetch_add(1, Ordering::Relaxed);
        }

        async move {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }
            outcome
        }
    }
}
