//! Teams and race setup
//!
//! A team is not stored anywhere: it is the cycle formed by following
//! `target` from a captain. Setup checks that every runner sits on exactly
//! one such cycle before anything is registered or spawned.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinHandle;

use relay_core::{Location, RelayError, RelayResult, RunnerArgs, RunnerId};
use relay_transport::{mailbox, Directory, Handle, Registry, Relocator};

use crate::{EventSink, Runner, RunnerConfig, RunnerStats};

/// Creation parameters of one runner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerSpec {
    pub id: RunnerId,
    pub args: RunnerArgs,
    /// Location the runner is created at
    pub post: Location,
}

impl RunnerSpec {
    pub fn new(id: impl Into<RunnerId>, args: RunnerArgs, post: Location) -> Self {
        RunnerSpec {
            id: id.into(),
            args,
            post,
        }
    }

    /// Build from raw bootstrap arguments (`isCaptain targetName`)
    pub fn from_args<S: AsRef<str>>(
        id: impl Into<RunnerId>,
        post: Location,
        args: &[S],
    ) -> RelayResult<Self> {
        let id = id.into();
        let args = RunnerArgs::from_args(args).map_err(|e| {
            tracing::error!(runner = %id, error = %e, "bad runner arguments");
            e
        })?;
        Ok(RunnerSpec::new(id, args, post))
    }
}

/// Specs of a ring of `size` runners named `{name}-{i}`
///
/// Runner 0 is the captain, runner `i` targets runner `i + 1` and the last
/// one closes the ring on the captain. Runner `i` is created in
/// `Container-i`, so teams of the same size share containers.
pub fn ring(name: &str, size: usize) -> Vec<RunnerSpec> {
    (0..size)
        .map(|i| {
            let flag = if i == 0 { "true" } else { "false" };
            let target = format!("{}-{}", name, (i + 1) % size);
            RunnerSpec::new(
                format!("{}-{}", name, i),
                RunnerArgs {
                    role: relay_core::Role::from_flag(flag),
                    target: RunnerId::new(target),
                },
                Location::container(i),
            )
        })
        .collect()
}

/// A ring of runners, in baton order starting at the captain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Team {
    pub captain: RunnerId,
    pub members: Vec<RunnerId>,
}

impl Team {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Group specs into teams, rejecting anything that is not a set of
/// disjoint rings with exactly one captain each and at least two members
pub fn form_teams(specs: &[RunnerSpec]) -> RelayResult<Vec<Team>> {
    let mut by_id: HashMap<&RunnerId, &RunnerSpec> = HashMap::with_capacity(specs.len());
    for spec in specs {
        if by_id.insert(&spec.id, spec).is_some() {
            return Err(RelayError::Config(format!("duplicate runner {}", spec.id)));
        }
    }

    for spec in specs {
        if !by_id.contains_key(&spec.args.target) {
            return Err(RelayError::Config(format!(
                "target {} of runner {} does not resolve",
                spec.args.target, spec.id
            )));
        }
    }

    let mut teams = Vec::new();
    let mut seated: HashSet<&RunnerId> = HashSet::new();

    for captain in specs.iter().filter(|s| s.args.role.is_captain()) {
        let mut members = vec![captain.id.clone()];
        seated.insert(&captain.id);
        let mut current = &captain.args.target;

        while *current != captain.id {
            let spec = by_id[current];
            if spec.args.role.is_captain() {
                return Err(RelayError::Config(format!(
                    "captains {} and {} share a ring",
                    captain.id, spec.id
                )));
            }
            if !seated.insert(&spec.id) {
                return Err(RelayError::Config(format!(
                    "ring of captain {} does not close (loops at {})",
                    captain.id, spec.id
                )));
            }
            members.push(spec.id.clone());
            current = &spec.args.target;
        }

        if members.len() < 2 {
            return Err(RelayError::Config(format!(
                "team of captain {} needs at least two runners",
                captain.id
            )));
        }
        teams.push(Team {
            captain: captain.id.clone(),
            members,
        });
    }

    if let Some(stray) = specs.iter().find(|s| !seated.contains(&s.id)) {
        return Err(RelayError::Config(format!(
            "runner {} is not on any captain's ring",
            stray.id
        )));
    }

    Ok(teams)
}

/// Registers and spawns the runners of a race
pub struct RaceBuilder<D, R> {
    directory: Arc<D>,
    relocator: Arc<R>,
    specs: Vec<RunnerSpec>,
    config: RunnerConfig,
    events: Option<EventSink>,
}

impl<D, R> RaceBuilder<D, R>
where
    D: Registry + 'static,
    R: Relocator,
{
    pub fn new(directory: Arc<D>, relocator: Arc<R>) -> Self {
        RaceBuilder {
            directory,
            relocator,
            specs: Vec::new(),
            config: RunnerConfig::default(),
            events: None,
        }
    }

    /// Add a generated ring of `size` runners
    pub fn team(mut self, name: &str, size: usize) -> Self {
        self.specs.extend(ring(name, size));
        self
    }

    /// Add a single runner
    pub fn runner(mut self, spec: RunnerSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn runner_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Validate the rings, register every runner and start them
    pub fn spawn(self) -> RelayResult<Race<D>> {
        let teams = form_teams(&self.specs)?;

        let mut mailboxes = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let (postbox, mb) = mailbox(spec.id.clone());
            let handle = Handle::new(spec.id.clone(), spec.args.role, spec.post.clone(), postbox);
            if let Err(e) = self.directory.register(handle) {
                for registered in self.specs.iter().take(mailboxes.len()) {
                    self.directory.deregister(&registered.id);
                }
                return Err(e);
            }
            mailboxes.push(mb);
        }

        let tasks = self
            .specs
            .into_iter()
            .zip(mailboxes)
            .map(|(spec, mb)| {
                let mut runner = Runner::new(
                    spec.id.clone(),
                    spec.args,
                    spec.post,
                    mb,
                    Arc::clone(&self.directory),
                    Arc::clone(&self.relocator),
                )
                .with_config(self.config.clone());
                if let Some(sink) = &self.events {
                    runner = runner.with_events(sink.clone());
                }
                (spec.id, runner.spawn())
            })
            .collect();

        tracing::info!(teams = teams.len(), "race ready");
        Ok(Race {
            directory: self.directory,
            teams,
            tasks,
        })
    }
}

/// Running race: the spawned runners of every team
pub struct Race<D: Registry> {
    directory: Arc<D>,
    teams: Vec<Team>,
    tasks: Vec<(RunnerId, JoinHandle<RelayResult<RunnerStats>>)>,
}

impl<D: Registry> Race<D> {
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn captains(&self) -> Vec<RunnerId> {
        self.teams.iter().map(|t| t.captain.clone()).collect()
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    /// Where every runner currently resides, as the directory last saw it
    ///
    /// Runners that are no longer registered are left out.
    pub fn locations(&self) -> Vec<(RunnerId, Location)> {
        self.tasks
            .iter()
            .filter_map(|(id, _)| {
                self.directory
                    .resolve(id)
                    .ok()
                    .map(|handle| (id.clone(), handle.location))
            })
            .collect()
    }

    /// Deregister every runner and wait for them to stop
    pub async fn shutdown(self) -> Vec<(RunnerId, RelayResult<RunnerStats>)> {
        for (id, _) in &self.tasks {
            self.directory.deregister(id);
        }

        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (id, task) in self.tasks {
            let outcome = match task.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(runner = %id, error = %e, "runner task aborted");
                    Err(RelayError::Shutdown(id.clone()))
                }
            };
            outcomes.push((id, outcome));
        }
        outcomes
    }
}
