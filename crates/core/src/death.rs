//! Incapacitation gate, evaluated first in every tick.
//!
//! While the gate reports anything but [`GateOutcome::Proceed`] the control
//! loop must not detect, track, explore or click.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{secs, Config, DeathResponse};
use crate::error::ActionError;
use crate::platform::ActionSink;
use crate::probes::SignalProbes;
use crate::sleep::sleep_unless_stopped;
use crate::state::{DeathWriter, RunControl, SharedState};
use crate::types::{DeathState, Point};

/// Waits between steps of a response. Returns false if the run is stopping.
pub type Sleeper = Box<dyn FnMut(Duration) -> bool + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// Alive: the tick may go on.
    Proceed,
    /// Incapacitated and nothing to do this tick.
    Suspended,
    /// The response ran this tick. An error leaves the gate Alive so the
    /// next tick probes again.
    Handled(Result<DeathResponse, ActionError>),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Click(Point),
    Key(String),
    Wait(Duration),
}

pub struct DeathGate {
    death: DeathWriter,
    run: RunControl,
    response: DeathResponse,
    center: Point,
    grace: Duration,
    settle: Duration,
    res_scroll_slot: String,
    inventory_key: String,
    game_key: String,
    started: Option<Instant>,
    sleeper: Sleeper,
}

impl DeathGate {
    pub fn new(config: &Config, death: DeathWriter, run: RunControl) -> Self {
        let state: Arc<SharedState> = Arc::clone(run.shared());
        let d = &config.death;
        death.set(DeathState::Alive);
        Self {
            death,
            run,
            response: d.response,
            center: config.center(),
            grace: secs(d.grace_secs),
            settle: secs(d.settle_secs),
            res_scroll_slot: d.res_scroll_slot.clone(),
            inventory_key: d.inventory_key.clone(),
            game_key: d.game_key.clone(),
            started: None,
            sleeper: Box::new(move |dur| sleep_unless_stopped(dur, &state)),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Start the grace period. Without this the first evaluation starts it.
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn state(&self) -> DeathState {
        self.death.get()
    }

    pub fn evaluate(
        &mut self,
        probes: &mut dyn SignalProbes,
        actions: &mut dyn ActionSink,
        now: Instant,
    ) -> GateOutcome {
        let started = *self.started.get_or_insert(now);
        if now.saturating_duration_since(started) < self.grace {
            return GateOutcome::Proceed;
        }

        let dead = probes.incapacitated().unwrap_or_else(|e| {
            warn!("incapacitation probe failed, treating as alive: {}", e);
            false
        });

        match (self.death.get(), dead) {
            (DeathState::Alive, false) => GateOutcome::Proceed,
            (DeathState::Incapacitated, true) => GateOutcome::Suspended,
            (DeathState::Incapacitated, false) => {
                self.death.set(DeathState::Alive);
                info!("incapacitation cleared, resuming");
                GateOutcome::Proceed
            }
            (DeathState::Alive, true) => {
                self.death.set(DeathState::Incapacitated);
                warn!("incapacitated, responding with {}", self.response);
                self.respond(actions)
            }
        }
    }

    /// Run the probe once and report, without touching the death state.
    pub fn test_probe(&self, probes: &mut dyn SignalProbes) -> bool {
        match probes.incapacitated() {
            Ok(dead) => {
                info!("death test: {}", if dead { "incapacitated" } else { "alive" });
                dead
            }
            Err(e) => {
                warn!("death test failed: {}", e);
                false
            }
        }
    }

    fn steps(&self) -> Vec<Step> {
        match self.response {
            DeathResponse::RespawnTown => {
                vec![Step::Click(self.center.offset(-150, 200)), Step::Wait(self.settle)]
            }
            DeathResponse::WaitHelp => vec![
                Step::Click(self.center.offset(150, 200)),
                Step::Wait(Duration::from_secs(2)),
                Step::Key(self.inventory_key.clone()),
                Step::Wait(Duration::from_secs(1)),
                Step::Key(self.res_scroll_slot.clone()),
                Step::Wait(Duration::from_secs(2)),
                Step::Key(self.inventory_key.clone()),
                Step::Wait(Duration::from_secs(1)),
                Step::Key(self.game_key.clone()),
                Step::Wait(Duration::from_millis(500)),
            ],
            DeathResponse::Manual => Vec::new(),
        }
    }

    fn respond(&mut self, actions: &mut dyn ActionSink) -> GateOutcome {
        if self.response == DeathResponse::Manual {
            warn!("manual death response, waiting for the indicator to clear");
            return GateOutcome::Suspended;
        }

        for step in self.steps() {
            let result = match step {
                Step::Click(at) => actions.click(at),
                Step::Key(key) => actions.key(&key),
                Step::Wait(d) => {
                    if !(self.sleeper)(d) {
                        return GateOutcome::Suspended;
                    }
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!("death response failed: {}", e);
                self.death.set(DeathState::Alive);
                return GateOutcome::Handled(Err(e));
            }
        }

        self.death.set(DeathState::Alive);
        if self.response == DeathResponse::RespawnTown {
            self.run.park();
            info!("respawned, run paused until resumed");
        } else {
            info!("revived, resuming");
        }
        GateOutcome::Handled(Ok(self.response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::fakes::{Action, ScriptedProbes, SpyActionSink};
    use crate::types::RunState;

    struct Harness {
        state: Arc<SharedState>,
        gate: DeathGate,
        waits: Arc<Mutex<Vec<Duration>>>,
        t0: Instant,
    }

    fn harness(response: DeathResponse) -> Harness {
        let mut config = Config::default();
        config.death.response = response;
        let (state, w) = SharedState::new();
        w.run.toggle();
        let t0 = Instant::now();
        let waits = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&waits);
        let mut gate = DeathGate::new(&config, w.death, w.run).with_sleeper(Box::new(move |d| {
            recorded.lock().unwrap().push(d);
            true
        }));
        gate.start(t0);
        Harness { state, gate, waits, t0 }
    }

    fn after_grace(h: &Harness) -> Instant {
        h.t0 + Duration::from_secs(6)
    }

    #[test]
    fn probe_is_ignored_during_grace() {
        let mut h = harness(DeathResponse::RespawnTown);
        let mut probes = ScriptedProbes::default().dead([true]);
        let mut sink = SpyActionSink::default();
        assert_eq!(h.gate.evaluate(&mut probes, &mut sink, h.t0 + Duration::from_secs(1)), GateOutcome::Proceed);
        assert_eq!(probes.dead_calls, 0);
    }

    #[test]
    fn grace_runs_from_the_first_evaluation_when_not_started() {
        let mut config = Config::default();
        config.death.response = DeathResponse::Manual;
        let (_state, w) = SharedState::new();
        let mut gate = DeathGate::new(&config, w.death, w.run);
        let mut probes = ScriptedProbes::default().dead([true]);
        let mut sink = SpyActionSink::default();

        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(gate.evaluate(&mut probes, &mut sink, later), GateOutcome::Proceed);
        assert_eq!(gate.evaluate(&mut probes, &mut sink, later + Duration::from_secs(4)), GateOutcome::Proceed);
        assert_eq!(probes.dead_calls, 0);
        assert_eq!(gate.evaluate(&mut probes, &mut sink, later + Duration::from_secs(5)), GateOutcome::Suspended);
    }

    #[test]
    fn respawn_clicks_settles_and_parks() {
        let mut h = harness(DeathResponse::RespawnTown);
        let mut probes = ScriptedProbes::default().dead([true]);
        let mut sink = SpyActionSink::default();
        let now = after_grace(&h);

        let outcome = h.gate.evaluate(&mut probes, &mut sink, now);
        assert_eq!(outcome, GateOutcome::Handled(Ok(DeathResponse::RespawnTown)));
        assert_eq!(sink.actions(), vec![Action::Click(Point::new(810, 740))]);
        assert_eq!(*h.waits.lock().unwrap(), vec![Duration::from_secs(3)]);
        assert_eq!(h.gate.state(), DeathState::Alive);
        assert_eq!(h.state.run_state(), RunState::Paused);
    }

    #[test]
    fn wait_help_uses_the_revive_item_and_resumes() {
        let mut h = harness(DeathResponse::WaitHelp);
        let mut probes = ScriptedProbes::default().dead([true]);
        let mut sink = SpyActionSink::default();

        let outcome = h.gate.evaluate(&mut probes, &mut sink, after_grace(&h));
        assert_eq!(outcome, GateOutcome::Handled(Ok(DeathResponse::WaitHelp)));
        assert_eq!(sink.clicks(), vec![Point::new(1110, 740)]);
        assert_eq!(sink.keys(), vec!["f4", "0", "f4", "f1"]);
        assert_eq!(h.waits.lock().unwrap().len(), 5);
        assert_eq!(h.state.run_state(), RunState::Running);
        assert!(h.state.is_active());
    }

    #[test]
    fn manual_stays_suspended_until_the_indicator_clears() {
        let mut h = harness(DeathResponse::Manual);
        let mut probes = ScriptedProbes::default().dead([true, true, false]);
        let mut sink = SpyActionSink::default();
        let now = after_grace(&h);

        assert_eq!(h.gate.evaluate(&mut probes, &mut sink, now), GateOutcome::Suspended);
        assert!(!h.state.is_active());
        assert_eq!(h.gate.evaluate(&mut probes, &mut sink, now), GateOutcome::Suspended);
        assert_eq!(h.gate.evaluate(&mut probes, &mut sink, now), GateOutcome::Proceed);
        assert_eq!(h.gate.state(), DeathState::Alive);
        assert!(sink.actions().is_empty());
    }

    #[test]
    fn failed_response_leaves_gate_alive_for_next_tick() {
        let mut h = harness(DeathResponse::RespawnTown);
        let mut probes = ScriptedProbes::default().dead([true]);
        let mut sink = SpyActionSink { fail_clicks: true, ..SpyActionSink::default() };

        let outcome = h.gate.evaluate(&mut probes, &mut sink, after_grace(&h));
        assert!(matches!(outcome, GateOutcome::Handled(Err(ActionError::Click { .. }))));
        assert_eq!(h.gate.state(), DeathState::Alive);
        assert_eq!(h.state.run_state(), RunState::Running);
    }

    #[test]
    fn probe_error_counts_as_alive() {
        let mut h = harness(DeathResponse::RespawnTown);
        let mut probes = ScriptedProbes { fail_dead: true, ..ScriptedProbes::default() };
        let mut sink = SpyActionSink::default();
        assert_eq!(h.gate.evaluate(&mut probes, &mut sink, after_grace(&h)), GateOutcome::Proceed);
    }

    #[test]
    fn test_probe_does_not_change_state() {
        let h = harness(DeathResponse::RespawnTown);
        let mut probes = ScriptedProbes::default().dead([true]);
        assert!(h.gate.test_probe(&mut probes));
        assert_eq!(h.gate.state(), DeathState::Alive);
    }
}
