//! Experiment driver (the judge)
//!
//! Runs `numAttempts` trials one after another. Trial `k` starts every
//! registered captain with `initLaps + k * step` laps and ends when each of
//! them has reported completion. Trials never overlap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use relay_core::{
    ConversationId, Envelope, ExperimentConfig, Location, MessageKind, RelayError, RelayResult,
    Role, RunnerId, Template,
};
use relay_transport::{mailbox, Handle, Mailbox, Registry};

use crate::{ExperimentResults, TrialResult};

/// Judge settings
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Name the judge registers under
    pub name: RunnerId,
    pub post: Location,
    /// Bound on a single trial; `None` waits forever
    pub trial_timeout: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            name: RunnerId::new("judge"),
            post: Location::new("Main-Container"),
            trial_timeout: None,
        }
    }
}

/// Drives the trials of an experiment and times them
pub struct ExperimentDriver<D: Registry> {
    experiment: ExperimentConfig,
    config: DriverConfig,
    directory: Arc<D>,
    mailbox: Mailbox,
    captains: Option<Vec<RunnerId>>,
}

impl<D: Registry> ExperimentDriver<D> {
    pub fn new(experiment: ExperimentConfig, directory: Arc<D>) -> RelayResult<Self> {
        Self::with_config(experiment, DriverConfig::default(), directory)
    }

    /// Register the judge in `directory`
    pub fn with_config(
        experiment: ExperimentConfig,
        config: DriverConfig,
        directory: Arc<D>,
    ) -> RelayResult<Self> {
        experiment.validate()?;

        let (postbox, mailbox) = mailbox(config.name.clone());
        directory.register(Handle::new(
            config.name.clone(),
            Role::Judge,
            config.post.clone(),
            postbox,
        ))?;

        Ok(ExperimentDriver {
            experiment,
            config,
            directory,
            mailbox,
            captains: None,
        })
    }

    /// Parse `numAttempts initLaps step`; nothing is registered on error
    pub fn from_args<S: AsRef<str>>(args: &[S], directory: Arc<D>) -> RelayResult<Self> {
        let experiment = ExperimentConfig::from_args(args).map_err(|e| {
            tracing::error!(error = %e, "bad experiment arguments");
            e
        })?;
        Self::new(experiment, directory)
    }

    /// Start exactly these captains instead of searching the directory
    ///
    /// A captain listed twice is started once.
    pub fn with_captains(mut self, captains: Vec<RunnerId>) -> Self {
        self.captains = Some(captains);
        self
    }

    pub fn experiment(&self) -> &ExperimentConfig {
        &self.experiment
    }

    /// Run every trial and return their timings
    ///
    /// The judge is deregistered when this returns, whatever the outcome.
    pub async fn run_all(mut self) -> RelayResult<ExperimentResults> {
        let mut captains = match self.captains.take() {
            Some(captains) => captains,
            None => self.directory.search(Role::Captain),
        };
        let listed = captains.len();
        let mut seen = HashSet::with_capacity(listed);
        captains.retain(|c| seen.insert(c.clone()));
        if captains.len() != listed {
            tracing::warn!(listed, distinct = captains.len(), "duplicate captains ignored");
        }
        if captains.is_empty() {
            return Err(RelayError::Config("no captains to start".into()));
        }

        let experiment = self.experiment;
        let mut results = ExperimentResults::new();
        for (attempt, laps) in experiment.schedule() {
            let elapsed = self.run_trial(attempt, laps, &captains).await?;
            tracing::info!(
                attempt,
                laps,
                elapsed_ms = elapsed.as_millis() as u64,
                "trial finished"
            );
            results.push(TrialResult {
                attempt,
                laps,
                elapsed,
            });
        }
        Ok(results)
    }

    async fn run_trial(
        &mut self,
        attempt: u32,
        laps: u32,
        captains: &[RunnerId],
    ) -> RelayResult<Duration> {
        let start = Instant::now();
        for captain in captains {
            self.directory.resolve(captain)?.postbox.send(Envelope::start(
                self.config.name.clone(),
                captain.clone(),
                laps,
            ))?;
        }
        tracing::debug!(attempt, laps, teams = captains.len(), "trial started");

        let template =
            Template::conversation(ConversationId::COMPLETION).with_kind(MessageKind::Completion);
        let deadline = self.config.trial_timeout.map(|t| start + t);
        let mut pending: HashSet<&RunnerId> = captains.iter().collect();

        while !pending.is_empty() {
            let envelope = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.mailbox.receive(&template)).await {
                        Ok(received) => received?,
                        Err(_) => {
                            return Err(RelayError::TrialTimedOut {
                                attempt,
                                waited: start.elapsed(),
                            })
                        }
                    }
                }
                None => self.mailbox.receive(&template).await?,
            };

            if !pending.remove(&envelope.sender) {
                tracing::warn!(from = %envelope.sender, attempt, "unexpected completion");
                continue;
            }
            match envelope.laps() {
                Ok(reported) if reported != laps => {
                    tracing::warn!(captain = %envelope.sender, reported, expected = laps, "lap count mismatch")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(captain = %envelope.sender, error = %e, "bad completion payload"),
            }
        }

        Ok(start.elapsed())
    }
}

impl<D: Registry> Drop for ExperimentDriver<D> {
    fn drop(&mut self) {
        self.directory.deregister(&self.config.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_transport::{Directory, InMemoryDirectory};

    fn captain(dir: &InMemoryDirectory, name: &str) -> Mailbox {
        let (postbox, mb) = mailbox(RunnerId::new(name));
        dir.register(Handle::new(
            RunnerId::new(name),
            Role::Captain,
            Location::container(0),
            postbox,
        ))
        .unwrap();
        mb
    }

    /// Stands in for a captain: answers every start immediately
    fn echo(dir: Arc<InMemoryDirectory>, mut mb: Mailbox) -> tokio::task::JoinHandle<Vec<u32>> {
        tokio::spawn(async move {
            let template = Template::conversation(ConversationId::RUNNING).with_kind(MessageKind::Start);
            let mut seen = Vec::new();
            while let Ok(start) = mb.receive(&template).await {
                let laps = start.laps().unwrap();
                seen.push(laps);
                let Ok(judge) = dir.resolve(&start.sender) else { break };
                let _ = judge
                    .postbox
                    .send(Envelope::completion(mb.owner().clone(), start.sender, laps));
            }
            seen
        })
    }

    #[test]
    fn test_bad_arguments_register_nothing() {
        let dir = Arc::new(InMemoryDirectory::new());
        assert!(ExperimentDriver::from_args(&["2", "1"], Arc::clone(&dir)).is_err());
        assert!(ExperimentDriver::from_args(&["2", "x", "1"], Arc::clone(&dir)).is_err());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_judge_registers_until_dropped() {
        let dir = Arc::new(InMemoryDirectory::new());
        let driver = ExperimentDriver::from_args(&["1", "1", "1"], Arc::clone(&dir)).unwrap();
        assert_eq!(dir.search(Role::Judge), vec![RunnerId::new("judge")]);
        drop(driver);
        assert!(dir.is_empty());
    }

    #[tokio::test]
    async fn test_schedule_sent_to_captains() {
        let dir = Arc::new(InMemoryDirectory::new());
        let mb = captain(&dir, "red-0");
        let task = echo(Arc::clone(&dir), mb);

        let driver = ExperimentDriver::from_args(&["3", "2", "5"], Arc::clone(&dir)).unwrap();
        let results = driver.run_all().await.unwrap();

        let laps: Vec<u32> = results.iter().map(|t| t.laps).collect();
        assert_eq!(laps, vec![2, 7, 12]);
        let attempts: Vec<u32> = results.iter().map(|t| t.attempt).collect();
        assert_eq!(attempts, vec![0, 1, 2]);
        assert!(dir.search(Role::Judge).is_empty());

        dir.deregister(&RunnerId::new("red-0"));
        assert_eq!(task.await.unwrap(), vec![2, 7, 12]);
    }

    #[tokio::test]
    async fn test_trial_waits_for_every_captain() {
        let dir = Arc::new(InMemoryDirectory::new());
        let a = echo(Arc::clone(&dir), captain(&dir, "a-0"));
        let b = echo(Arc::clone(&dir), captain(&dir, "b-0"));

        let results = ExperimentDriver::new(ExperimentConfig::new(2, 1, 1), Arc::clone(&dir))
            .unwrap()
            .run_all()
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        dir.deregister(&RunnerId::new("a-0"));
        dir.deregister(&RunnerId::new("b-0"));
        assert_eq!(a.await.unwrap(), vec![1, 2]);
        assert_eq!(b.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_duplicate_captain_started_once_per_trial() {
        let dir = Arc::new(InMemoryDirectory::new());
        let task = echo(Arc::clone(&dir), captain(&dir, "red-0"));
        let red = RunnerId::new("red-0");

        let results = ExperimentDriver::new(ExperimentConfig::new(2, 1, 2), Arc::clone(&dir))
            .unwrap()
            .with_captains(vec![red.clone(), red.clone()])
            .run_all()
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        dir.deregister(&red);
        assert_eq!(task.await.unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_zero_attempts() {
        let dir = Arc::new(InMemoryDirectory::new());
        let _mb = captain(&dir, "red-0");
        let results = ExperimentDriver::new(ExperimentConfig::new(0, 1, 1), Arc::clone(&dir))
            .unwrap()
            .run_all()
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_no_captains() {
        let dir = Arc::new(InMemoryDirectory::new());
        let result = ExperimentDriver::new(ExperimentConfig::new(1, 1, 1), Arc::clone(&dir))
            .unwrap()
            .run_all()
            .await;
        assert!(matches!(result, Err(RelayError::Config(_))));
        assert!(dir.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_timeout() {
        let dir = Arc::new(InMemoryDirectory::new());
        // registered but never answers
        let _mb = captain(&dir, "red-0");

        let config = DriverConfig {
            trial_timeout: Some(Duration::from_secs(5)),
            ..DriverConfig::default()
        };
        let result = ExperimentDriver::with_config(ExperimentConfig::new(2, 1, 1), config, Arc::clone(&dir))
            .unwrap()
            .run_all()
            .await;
        assert!(matches!(result, Err(RelayError::TrialTimedOut { attempt: 0, .. })));
        assert!(dir.search(Role::Judge).is_empty());
    }
}
