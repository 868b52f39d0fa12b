//! Runner - the baton hand-off state machine
//!
//! ```text
//!            start / hand-off request
//!   WAITING ─────────────────────────► RELOCATING
//!      ▲                                   │ arrival
//!      │ ack                               ▼
//!  HANDING_OFF ◄──────────────────────  EVALUATING ──► WAITING
//!                 lap not finished          (captain, all laps done)
//! ```
//!
//! A runner owns all of its state. Nothing is shared with other runners
//! except what travels in messages, so the only suspension points are the
//! relocation and the acknowledgement wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use relay_core::{
    ConversationId, Envelope, Location, MessageKind, RelayError, RelayResult, Role, RunnerArgs,
    RunnerId, RunnerState, Template,
};
use relay_transport::{Mailbox, Registry, Relocator};

use crate::{EventSink, RaceEvent};

/// Runner tuning
#[derive(Clone, Debug, Default)]
pub struct RunnerConfig {
    /// Bound on the acknowledgement wait; `None` waits forever
    pub ack_timeout: Option<Duration>,
}

/// Counters a runner returns when it stops
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunnerStats {
    pub handoffs_sent: u64,
    pub handoffs_received: u64,
    pub relocations: u64,
    pub laps_completed: u64,
    pub completions: u64,
}

/// A member of a ring
pub struct Runner<D, R> {
    id: RunnerId,
    role: Role,
    target: RunnerId,
    state: RunnerState,
    /// Captured at the first arrival; re-anchored at every completion
    origin: Option<Location>,
    location: Location,
    /// Judge of the current trial (captains only)
    judge: Option<RunnerId>,
    racing: bool,
    /// The next arrival is the departure leg of a fresh trial
    departing: bool,
    completed_laps: u32,
    num_laps: u32,
    mailbox: Mailbox,
    directory: Arc<D>,
    relocator: Arc<R>,
    config: RunnerConfig,
    events: Option<EventSink>,
    stats: RunnerStats,
}

impl<D, R> Runner<D, R>
where
    D: Registry + 'static,
    R: Relocator,
{
    pub fn new(
        id: RunnerId,
        args: RunnerArgs,
        post: Location,
        mailbox: Mailbox,
        directory: Arc<D>,
        relocator: Arc<R>,
    ) -> Self {
        Runner {
            id,
            role: args.role,
            target: args.target,
            state: RunnerState::Waiting,
            origin: None,
            location: post,
            judge: None,
            racing: false,
            departing: false,
            completed_laps: 0,
            num_laps: 0,
            mailbox,
            directory,
            relocator,
            config: RunnerConfig::default(),
            events: None,
            stats: RunnerStats::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish race events to `sink`
    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Run on the tokio runtime
    pub fn spawn(self) -> JoinHandle<RelayResult<RunnerStats>> {
        tokio::spawn(self.run())
    }

    /// Serve the mailbox until it closes or a fatal error occurs
    ///
    /// A closed mailbox is a clean stop. Fatal errors deregister the
    /// runner and are returned.
    pub async fn run(mut self) -> RelayResult<RunnerStats> {
        let running = Template::conversation(ConversationId::RUNNING);
        tracing::info!(runner = %self.id, role = %self.role, target = %self.target, "runner ready");

        loop {
            let envelope = match self.mailbox.receive(&running).await {
                Ok(envelope) => envelope,
                Err(RelayError::Shutdown(_)) => break,
                Err(e) => return Err(self.die(e)),
            };

            match self.handle(envelope).await {
                Ok(()) => {}
                Err(RelayError::Shutdown(_)) => break,
                Err(e) if e.is_fatal() => return Err(self.die(e)),
                Err(e) => {
                    tracing::warn!(runner = %self.id, error = %e, "message dropped");
                    self.state = RunnerState::Waiting;
                }
            }
        }

        tracing::debug!(runner = %self.id, "mailbox closed, stopping");
        Ok(self.stats)
    }

    async fn handle(&mut self, envelope: Envelope) -> RelayResult<()> {
        match envelope.kind {
            MessageKind::Start => self.on_start(&envelope).await,
            MessageKind::HandoffRequest => self.on_handoff_request(&envelope).await,
            MessageKind::HandoffAck | MessageKind::Completion => {
                tracing::warn!(
                    runner = %self.id,
                    kind = ?envelope.kind,
                    from = %envelope.sender,
                    "unexpected message while waiting"
                );
                Ok(())
            }
        }
    }

    async fn on_start(&mut self, envelope: &Envelope) -> RelayResult<()> {
        if !self.role.is_captain() {
            tracing::warn!(runner = %self.id, from = %envelope.sender, "start signal sent to a non-captain");
            return Ok(());
        }

        if self.racing {
            tracing::warn!(
                runner = %self.id,
                from = %envelope.sender,
                completed = self.completed_laps,
                of = self.num_laps,
                "start signal during a race ignored"
            );
            return Ok(());
        }

        let laps = envelope.laps()?;
        self.num_laps = laps;
        self.completed_laps = 0;
        self.judge = Some(envelope.sender.clone());
        self.racing = true;
        self.departing = true;

        tracing::info!(runner = %self.id, laps, "start");
        self.publish(RaceEvent::Started {
            captain: self.id.clone(),
            laps,
        });
        self.run_leg().await
    }

    async fn on_handoff_request(&mut self, envelope: &Envelope) -> RelayResult<()> {
        self.stats.handoffs_received += 1;

        self.directory
            .resolve(&envelope.sender)?
            .postbox
            .send(Envelope::handoff_ack(self.id.clone(), envelope.sender.clone()))?;

        tracing::trace!(runner = %self.id, from = %envelope.sender, "baton taken");
        self.run_leg().await
    }

    /// Relocate to the target's post, then evaluate the arrival
    async fn run_leg(&mut self) -> RelayResult<()> {
        self.state = RunnerState::Relocating;
        let post = self.directory.resolve(&self.target)?.post;
        let arrived = self.relocator.relocate(&self.id, &post).await?;
        self.stats.relocations += 1;
        self.on_arrival(arrived).await
    }

    async fn on_arrival(&mut self, location: Location) -> RelayResult<()> {
        self.state = RunnerState::Evaluating;
        self.directory.update_location(&self.id, location.clone())?;
        self.location = location;
        if self.origin.is_none() {
            self.origin = Some(self.location.clone());
        }

        tracing::debug!(runner = %self.id, location = %self.location, "reached new location");
        self.publish(RaceEvent::Arrived {
            runner: self.id.clone(),
            location: self.location.clone(),
        });

        if self.role.is_captain() && self.lap_check() {
            return self.complete();
        }
        self.hand_off().await
    }

    /// Lap bookkeeping after a captain's arrival; true once the trial is over
    fn lap_check(&mut self) -> bool {
        if !self.racing {
            return false;
        }

        // The departure leg never closes a lap
        if std::mem::take(&mut self.departing) {
            return self.num_laps == 0;
        }

        if self.origin.as_ref() != Some(&self.location) {
            return false;
        }

        self.completed_laps += 1;
        self.stats.laps_completed += 1;
        tracing::info!(
            runner = %self.id,
            completed = self.completed_laps,
            of = self.num_laps,
            "new lap completed"
        );
        self.publish(RaceEvent::LapCompleted {
            captain: self.id.clone(),
            completed: self.completed_laps,
            of: self.num_laps,
            origin: self.location.clone(),
        });

        self.completed_laps >= self.num_laps
    }

    /// Report to the judge and re-arm for the next trial
    fn complete(&mut self) -> RelayResult<()> {
        let laps = self.num_laps;
        tracing::info!(runner = %self.id, laps, location = %self.location, "all laps completed");

        self.completed_laps = 0;
        self.racing = false;
        self.origin = Some(self.location.clone());
        self.stats.completions += 1;
        self.state = RunnerState::Waiting;
        self.publish(RaceEvent::Completed {
            captain: self.id.clone(),
            laps,
            location: self.location.clone(),
        });

        if let Some(judge) = &self.judge {
            self.directory
                .resolve(judge)?
                .postbox
                .send(Envelope::completion(self.id.clone(), judge.clone(), laps))?;
        }
        Ok(())
    }

    /// Pass the baton and block until the target acknowledges it
    async fn hand_off(&mut self) -> RelayResult<()> {
        self.state = RunnerState::HandingOff;
        // Resolved per hand-off; the handle is not kept past the send
        let target = self.directory.resolve(&self.target)?;

        self.publish(RaceEvent::HandedOff {
            from: self.id.clone(),
            to: self.target.clone(),
        });
        target
            .postbox
            .send(Envelope::handoff_request(self.id.clone(), self.target.clone()))?;
        drop(target);
        self.stats.handoffs_sent += 1;
        tracing::debug!(
            runner = %self.id,
            to = %self.target,
            deferred = self.mailbox.deferred_len(),
            "relay given"
        );

        let ack = Template::conversation(ConversationId::RUNNING)
            .with_kind(MessageKind::HandoffAck)
            .with_sender(self.target.clone());
        match self.config.ack_timeout {
            None => {
                self.mailbox.receive(&ack).await?;
            }
            Some(waited) => {
                if self.mailbox.receive_timeout(&ack, waited).await?.is_none() {
                    return Err(RelayError::ProtocolStalled {
                        runner: self.id.clone(),
                        target: self.target.clone(),
                        waited,
                    });
                }
            }
        }

        self.state = RunnerState::Waiting;
        Ok(())
    }

    fn die(&mut self, error: RelayError) -> RelayError {
        tracing::error!(runner = %self.id, state = ?self.state, error = %error, "runner failed, deregistering");
        self.state = RunnerState::Dead;
        self.directory.deregister(&self.id);
        self.publish(RaceEvent::failed(&self.id, &error));
        error
    }

    fn publish(&self, event: RaceEvent) {
        if let Some(sink) = &self.events {
            // Observers may go away before the race ends
            let _ = sink.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_transport::{mailbox, Directory, Handle, InMemoryDirectory, LatencyModel, SimulatedRelocator};

    struct Fixture {
        directory: Arc<InMemoryDirectory>,
        relocator: Arc<SimulatedRelocator>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                directory: Arc::new(InMemoryDirectory::new()),
                relocator: Arc::new(SimulatedRelocator::new(LatencyModel::instant(), 3)),
            }
        }

        /// Register a participant driven by the test itself
        fn peer(&self, name: &str, role: Role, post: usize) -> Mailbox {
            let (postbox, mb) = mailbox(RunnerId::new(name));
            self.directory
                .register(Handle::new(RunnerId::new(name), role, Location::container(post), postbox))
                .unwrap();
            mb
        }

        fn runner(
            &self,
            name: &str,
            role: Role,
            target: &str,
            post: usize,
        ) -> Runner<InMemoryDirectory, SimulatedRelocator> {
            let id = RunnerId::new(name);
            let (postbox, mb) = mailbox(id.clone());
            self.directory
                .register(Handle::new(id.clone(), role, Location::container(post), postbox))
                .unwrap();
            Runner::new(
                id,
                RunnerArgs {
                    role,
                    target: RunnerId::new(target),
                },
                Location::container(post),
                mb,
                Arc::clone(&self.directory),
                Arc::clone(&self.relocator),
            )
        }

        fn send(&self, envelope: Envelope) {
            self.directory
                .resolve(&envelope.receiver)
                .unwrap()
                .postbox
                .send(envelope)
                .unwrap();
        }
    }

    fn any_running() -> Template {
        Template::conversation(ConversationId::RUNNING)
    }

    #[tokio::test]
    async fn test_runner_acks_relocates_and_hands_off() {
        let fx = Fixture::new();
        let mut prev = fx.peer("prev", Role::Runner, 0);
        let mut next = fx.peer("next", Role::Runner, 2);
        let task = fx.runner("mid", Role::Runner, "next", 1).spawn();

        fx.send(Envelope::handoff_request("prev".into(), "mid".into()));

        let ack = prev.receive(&any_running()).await.unwrap();
        assert_eq!(ack.kind, MessageKind::HandoffAck);
        assert_eq!(ack.sender, RunnerId::new("mid"));

        let req = next.receive(&any_running()).await.unwrap();
        assert_eq!(req.kind, MessageKind::HandoffRequest);
        assert_eq!(req.sender, RunnerId::new("mid"));

        // Runner moved to its target's post
        let moved_to = fx.directory.resolve(&RunnerId::new("mid")).unwrap().location;
        assert_eq!(moved_to, Location::container(2));

        fx.send(Envelope::handoff_ack("next".into(), "mid".into()));
        fx.directory.deregister(&RunnerId::new("mid"));

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.handoffs_received, 1);
        assert_eq!(stats.handoffs_sent, 1);
        assert_eq!(stats.relocations, 1);
    }

    #[tokio::test]
    async fn test_captain_zero_laps_completes_without_handoff() {
        let fx = Fixture::new();
        let mut judge = fx.peer("judge", Role::Judge, 9);
        let mut partner = fx.peer("r1", Role::Runner, 1);
        let task = fx.runner("captain", Role::Captain, "r1", 0).spawn();

        fx.send(Envelope::start("judge".into(), "captain".into(), 0));

        let done = judge
            .receive(&Template::conversation(ConversationId::COMPLETION))
            .await
            .unwrap();
        assert_eq!(done.sender, RunnerId::new("captain"));
        assert_eq!(done.laps().unwrap(), 0);
        assert!(partner.try_receive(&any_running()).is_none());

        fx.directory.deregister(&RunnerId::new("captain"));
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.handoffs_sent, 0);
        assert_eq!(stats.completions, 1);
        assert_eq!(stats.laps_completed, 0);
    }

    #[tokio::test]
    async fn test_start_during_race_is_ignored() {
        let fx = Fixture::new();
        let mut judge = fx.peer("judge", Role::Judge, 9);
        let mut partner = fx.peer("r1", Role::Runner, 1);
        let (sink, mut events) = crate::event_channel();
        let task = fx
            .runner("captain", Role::Captain, "r1", 0)
            .with_events(sink)
            .spawn();
        let request = any_running().with_kind(MessageKind::HandoffRequest);

        fx.send(Envelope::start("judge".into(), "captain".into(), 1));
        partner.receive(&request).await.unwrap();

        // Deferred behind the ack wait, then seen while still racing
        fx.send(Envelope::start("judge".into(), "captain".into(), 1));
        fx.send(Envelope::handoff_ack("r1".into(), "captain".into()));
        fx.send(Envelope::handoff_request("r1".into(), "captain".into()));

        let done = judge
            .receive(&Template::conversation(ConversationId::COMPLETION))
            .await
            .unwrap();
        assert_eq!(done.laps().unwrap(), 1);
        assert!(partner.try_receive(&request).is_none());

        fx.directory.deregister(&RunnerId::new("captain"));
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.handoffs_sent, 1);
        assert_eq!(stats.completions, 1);

        let mut started = 0;
        while let Some(event) = events.recv().await {
            match event {
                RaceEvent::Started { .. } => started += 1,
                RaceEvent::LapCompleted { origin, .. } => assert_eq!(origin, Location::container(1)),
                RaceEvent::Completed { location, .. } => assert_eq!(location, Location::container(1)),
                _ => {}
            }
        }
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_non_captain_ignores_start() {
        let fx = Fixture::new();
        let mut next = fx.peer("next", Role::Runner, 1);
        let _judge = fx.peer("judge", Role::Judge, 9);
        let task = fx.runner("r0", Role::Runner, "next", 0).spawn();

        fx.send(Envelope::start("judge".into(), "r0".into(), 3));
        tokio::task::yield_now().await;
        assert!(next.try_receive(&any_running()).is_none());

        fx.directory.deregister(&RunnerId::new("r0"));
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.relocations, 0);
    }

    #[tokio::test]
    async fn test_unresolvable_target_is_fatal() {
        let fx = Fixture::new();
        let _prev = fx.peer("prev", Role::Runner, 0);
        let (sink, mut events) = crate::event_channel();
        let task = fx
            .runner("lonely", Role::Runner, "nobody", 1)
            .with_events(sink)
            .spawn();

        fx.send(Envelope::handoff_request("prev".into(), "lonely".into()));

        let result = task.await.unwrap();
        assert!(matches!(result, Err(RelayError::NotFound(ref id)) if id.as_str() == "nobody"));
        assert!(fx.directory.resolve(&RunnerId::new("lonely")).is_err());
        assert!(matches!(events.recv().await, Some(RaceEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn test_relocation_failure_is_fatal() {
        let fx = Fixture::new();
        let _prev = fx.peer("prev", Role::Runner, 0);
        let _next = fx.peer("next", Role::Runner, 2);
        fx.relocator.block(Location::container(2));
        let task = fx.runner("mid", Role::Runner, "next", 1).spawn();

        fx.send(Envelope::handoff_request("prev".into(), "mid".into()));

        assert!(matches!(
            task.await.unwrap(),
            Err(RelayError::Relocation { .. })
        ));
        assert!(fx.directory.resolve(&RunnerId::new("mid")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ack_stalls_with_timeout() {
        let fx = Fixture::new();
        let _prev = fx.peer("prev", Role::Runner, 0);
        let _silent = fx.peer("silent", Role::Runner, 2);
        let task = fx
            .runner("mid", Role::Runner, "silent", 1)
            .with_config(RunnerConfig {
                ack_timeout: Some(Duration::from_millis(250)),
            })
            .spawn();

        fx.send(Envelope::handoff_request("prev".into(), "mid".into()));

        match task.await.unwrap() {
            Err(RelayError::ProtocolStalled { runner, target, waited }) => {
                assert_eq!(runner, RunnerId::new("mid"));
                assert_eq!(target, RunnerId::new("silent"));
                assert_eq!(waited, Duration::from_millis(250));
            }
            other => panic!("expected stall, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_during_handoff_is_deferred() {
        let fx = Fixture::new();
        let mut prev = fx.peer("prev", Role::Runner, 0);
        let mut next = fx.peer("next", Role::Runner, 2);
        let task = fx.runner("mid", Role::Runner, "next", 1).spawn();

        fx.send(Envelope::handoff_request("prev".into(), "mid".into()));
        next.receive(&any_running()).await.unwrap();

        // A second request lands while mid still waits for its ack
        fx.send(Envelope::handoff_request("prev".into(), "mid".into()));
        tokio::task::yield_now().await;
        assert!(next.try_receive(&any_running()).is_none());

        fx.send(Envelope::handoff_ack("next".into(), "mid".into()));
        let second = next.receive(&any_running()).await.unwrap();
        assert_eq!(second.kind, MessageKind::HandoffRequest);

        // Both requests were acknowledged
        for _ in 0..2 {
            let ack = prev.receive(&any_running()).await.unwrap();
            assert_eq!(ack.kind, MessageKind::HandoffAck);
        }

        fx.send(Envelope::handoff_ack("next".into(), "mid".into()));
        fx.directory.deregister(&RunnerId::new("mid"));
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.handoffs_sent, 2);
    }
}
