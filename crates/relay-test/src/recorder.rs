//! Race event recording and verification

use std::collections::HashMap;

use relay_core::{Location, RunnerId};
use relay_runtime::{EventStream, ExperimentResults, RaceEvent, Team};

/// Everything the runners published during a race, in publication order
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Vec<RaceEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<RaceEvent>) -> Self {
        Self { events }
    }

    /// Read the stream until every publisher is gone
    pub async fn collect(mut stream: EventStream) -> Self {
        let mut recorder = Self::new();
        while let Some(event) = stream.recv().await {
            recorder.record(event);
        }
        recorder
    }

    pub fn record(&mut self, event: RaceEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[RaceEvent] {
        &self.events
    }

    /// Total hand-offs across all teams
    pub fn handoffs(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, RaceEvent::HandedOff { .. }))
            .count()
    }

    /// Hand-offs between members of `team`
    pub fn handoffs_in(&self, team: &Team) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, RaceEvent::HandedOff { from, .. } if team.members.contains(from)))
            .count()
    }

    /// Hand-offs of `team` per trial, split at the captain's start signals
    pub fn handoffs_per_trial(&self, team: &Team) -> Vec<usize> {
        let mut per_trial = Vec::new();
        for event in &self.events {
            match event {
                RaceEvent::Started { captain, .. } if *captain == team.captain => per_trial.push(0),
                RaceEvent::HandedOff { from, .. } if team.members.contains(from) => {
                    if let Some(current) = per_trial.last_mut() {
                        *current += 1;
                    }
                }
                _ => {}
            }
        }
        per_trial
    }

    /// Lap counts reported by `captain`, in order
    pub fn completions(&self, captain: &RunnerId) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RaceEvent::Completed { captain: c, laps, .. } if c == captain => Some(*laps),
                _ => None,
            })
            .collect()
    }

    /// Where `captain` stood at each completion, in order
    pub fn finish_locations(&self, captain: &RunnerId) -> Vec<&Location> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RaceEvent::Completed { captain: c, location, .. } if c == captain => Some(location),
                _ => None,
            })
            .collect()
    }

    /// Origin of every lap `captain` closed, in order
    pub fn lap_origins(&self, captain: &RunnerId) -> Vec<&Location> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RaceEvent::LapCompleted { captain: c, origin, .. } if c == captain => Some(origin),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<(&RunnerId, &str)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RaceEvent::Failed { runner, reason } => Some((runner, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Check the race against the teams and the judge's results
    ///
    /// Returns one message per violation; empty means the race was sound.
    pub fn check(&self, teams: &[Team], results: &ExperimentResults) -> Vec<String> {
        let mut violations = Vec::new();

        for (runner, reason) in self.failures() {
            violations.push(format!("runner {} failed: {}", runner, reason));
        }

        let scheduled: Vec<u32> = results.iter().map(|t| t.laps).collect();
        for team in teams {
            self.check_team(team, &scheduled, &mut violations);
        }

        violations
    }

    fn check_team(&self, team: &Team, scheduled: &[u32], violations: &mut Vec<String>) {
        let captain = &team.captain;

        let reported = self.completions(captain);
        if reported != scheduled {
            violations.push(format!(
                "captain {} reported {:?}, judge scheduled {:?}",
                captain, reported, scheduled
            ));
        }

        // Lap bookkeeping; the origin holds across trials
        let mut last = 0;
        let mut origin: Option<&Location> = None;
        for event in &self.events {
            let seen_at = match event {
                RaceEvent::Started { captain: c, .. } if c == captain => {
                    last = 0;
                    None
                }
                RaceEvent::LapCompleted {
                    captain: c,
                    completed,
                    of,
                    origin: at,
                } if c == captain => {
                    if *completed != last + 1 || *completed > *of {
                        violations.push(format!(
                            "captain {} counted lap {} of {} after lap {}",
                            captain, completed, of, last
                        ));
                    }
                    last = *completed;
                    Some(at)
                }
                RaceEvent::Completed {
                    captain: c,
                    laps,
                    location,
                } if c == captain => {
                    if last != *laps {
                        violations.push(format!(
                            "captain {} completed {} laps after counting {}",
                            captain, laps, last
                        ));
                    }
                    Some(location)
                }
                _ => None,
            };
            if let Some(at) = seen_at {
                match origin {
                    Some(expected) if expected != at => violations.push(format!(
                        "captain {} origin moved from {} to {}",
                        captain, expected, at
                    )),
                    _ => origin = Some(at),
                }
            }
        }

        // Single baton following the ring
        let size = team.members.len();
        let successor: HashMap<&RunnerId, &RunnerId> = team
            .members
            .iter()
            .enumerate()
            .map(|(i, m)| (m, &team.members[(i + 1) % size]))
            .collect();
        let mut holder = captain;
        for event in &self.events {
            let RaceEvent::HandedOff { from, to } = event else {
                continue;
            };
            let Some(expected) = successor.get(from) else {
                continue;
            };
            if from != holder {
                violations.push(format!("{} handed off while {} held the baton", from, holder));
            }
            if to != *expected {
                violations.push(format!("{} handed off to {} instead of {}", from, to, expected));
            }
            holder = to;
        }

        let expected = size as u64 * scheduled.iter().map(|&l| l as u64).sum::<u64>();
        let actual = self.handoffs_in(team) as u64;
        if actual != expected {
            violations.push(format!(
                "team of {} made {} hand-offs, expected {}",
                captain, actual, expected
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use relay_runtime::TrialResult;
    use std::time::Duration;

    fn team(size: usize) -> Team {
        Team {
            captain: RunnerId::new("t-0"),
            members: (0..size).map(|i| RunnerId::new(format!("t-{}", i))).collect(),
        }
    }

    fn results(laps: &[u32]) -> ExperimentResults {
        let mut results = ExperimentResults::new();
        for (attempt, &laps) in laps.iter().enumerate() {
            results.push(TrialResult {
                attempt: attempt as u32,
                laps,
                elapsed: Duration::from_millis(1),
            });
        }
        results
    }

    /// Events of a correct race
    fn ideal(team: &Team, trials: &[u32]) -> Vec<RaceEvent> {
        let n = team.members.len();
        let mut events = Vec::new();
        for &laps in trials {
            events.push(RaceEvent::Started {
                captain: team.captain.clone(),
                laps,
            });
            for lap in 1..=laps {
                for i in 0..n {
                    events.push(RaceEvent::HandedOff {
                        from: team.members[i].clone(),
                        to: team.members[(i + 1) % n].clone(),
                    });
                }
                events.push(RaceEvent::LapCompleted {
                    captain: team.captain.clone(),
                    completed: lap,
                    of: laps,
                    origin: Location::container(1),
                });
            }
            events.push(RaceEvent::Completed {
                captain: team.captain.clone(),
                laps,
                location: Location::container(1),
            });
        }
        events
    }

    #[test]
    fn test_ideal_race_passes() {
        let t = team(3);
        let recorder = EventRecorder::from_events(ideal(&t, &[1, 3]));
        assert!(recorder.check(&[t.clone()], &results(&[1, 3])).is_empty());
        assert_eq!(recorder.handoffs_per_trial(&t), vec![3, 9]);
    }

    #[test]
    fn test_baton_jump_detected() {
        let t = team(3);
        let mut events = ideal(&t, &[1]);
        // t-2 hands off before t-1 did
        events.swap(1, 2);
        let violations = EventRecorder::from_events(events).check(&[t], &results(&[1]));
        assert!(violations.iter().any(|v| v.contains("held the baton")));
    }

    #[test]
    fn test_wrong_target_detected() {
        let t = team(3);
        let mut events = ideal(&t, &[1]);
        events[1] = RaceEvent::HandedOff {
            from: RunnerId::new("t-0"),
            to: RunnerId::new("t-2"),
        };
        let violations = EventRecorder::from_events(events).check(&[t], &results(&[1]));
        assert!(violations.iter().any(|v| v.contains("instead of")));
    }

    #[test]
    fn test_extra_lap_detected() {
        let t = team(2);
        let mut events = ideal(&t, &[1]);
        let done = events.pop().unwrap();
        events.push(RaceEvent::LapCompleted {
            captain: t.captain.clone(),
            completed: 2,
            of: 1,
            origin: Location::container(1),
        });
        events.push(done);
        let violations = EventRecorder::from_events(events).check(&[t], &results(&[1]));
        assert!(!violations.is_empty());
    }

    #[test]
    fn test_moved_origin_detected() {
        let t = team(2);
        let mut events = ideal(&t, &[1, 1]);
        let last = events.len() - 1;
        events[last] = RaceEvent::Completed {
            captain: t.captain.clone(),
            laps: 1,
            location: Location::container(0),
        };
        let recorder = EventRecorder::from_events(events);
        let violations = recorder.check(&[t.clone()], &results(&[1, 1]));
        assert!(violations.iter().any(|v| v.contains("origin moved")));
        assert_eq!(recorder.lap_origins(&t.captain).len(), 2);
    }

    #[test]
    fn test_missing_completion_detected() {
        let t = team(2);
        let recorder = EventRecorder::from_events(ideal(&t, &[1]));
        let violations = recorder.check(&[t], &results(&[1, 2]));
        assert!(violations.iter().any(|v| v.contains("reported")));
    }

    #[test]
    fn test_failure_reported() {
        let t = team(2);
        let mut events = ideal(&t, &[0]);
        events.push(RaceEvent::Failed {
            runner: RunnerId::new("t-1"),
            reason: "boom".into(),
        });
        let violations = EventRecorder::from_events(events).check(&[t], &results(&[0]));
        assert_eq!(violations, vec!["runner t-1 failed: boom".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_ideal_races_are_sound(size in 2usize..7, trials in prop::collection::vec(0u32..5, 0..5)) {
            let t = team(size);
            let recorder = EventRecorder::from_events(ideal(&t, &trials));
            prop_assert!(recorder.check(&[t.clone()], &results(&trials)).is_empty());
            let expected: Vec<usize> = trials.iter().map(|&l| l as usize * size).collect();
            prop_assert_eq!(recorder.handoffs_per_trial(&t), expected);
        }
    }
}
