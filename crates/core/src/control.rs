//! The hunt loop: one tick is gate, capture, detect, filter, then either
//! engage a target or explore.

use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{secs, Config, DeathResponse, ZonePreset};
use crate::death::{DeathGate, GateOutcome, Sleeper};
use crate::detect::{DetectParams, Detector};
use crate::error::{ActionError, CollaboratorError};
use crate::explore::ExplorationPlanner;
use crate::platform::{ActionSink, FrameSource};
use crate::probes::SignalProbes;
use crate::sleep::{sleep_remainder, sleep_unless_stopped};
use crate::state::{RunControl, SharedState, TelemetryWriter, Writers};
use crate::tracker::TargetTracker;
use crate::types::{CaptureRect, Command, Detection, Point, RunState};
use crate::zone;

const PET_CHECK_DELAY: Duration = Duration::from_millis(200);
const REPORT_EVERY: u64 = 30;

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    NotRunning,
    /// The death gate holds the tick.
    Incapacitated,
    DeathHandled(DeathResponse),
    /// Combat-locked: no positional action.
    Hold,
    Clicked(Point),
    Explored(Point),
    /// Nothing in the zone, and exploration is not due yet.
    Waiting,
}

/// Per-tick result. Errors never stop the loop; they only say why a tick
/// fell back to what it did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Success(TickAction),
    /// Capture or detection failed; the tick ran as if nothing was detected.
    CollaboratorError { error: CollaboratorError, fallback: TickAction },
    ActionError { error: ActionError },
}

impl TickOutcome {
    pub fn action(&self) -> Option<&TickAction> {
        match self {
            TickOutcome::Success(a) => Some(a),
            TickOutcome::CollaboratorError { fallback, .. } => Some(fallback),
            TickOutcome::ActionError { .. } => None,
        }
    }
}

/// Everything the loop talks to outside the process.
pub struct Collaborators {
    pub frames: Box<dyn FrameSource>,
    pub detector: Box<dyn Detector>,
    pub probes: Box<dyn SignalProbes>,
    pub actions: Box<dyn ActionSink>,
}

pub struct ControlLoop {
    state: Arc<SharedState>,
    run: RunControl,
    telemetry: TelemetryWriter,
    commands: mpsc::Receiver<Command>,
    c: Collaborators,

    tracker: TargetTracker,
    planner: ExplorationPlanner,
    gate: DeathGate,

    center: Point,
    capture: CaptureRect,
    params: DetectParams,
    preset: ZonePreset,
    custom_radius: f64,
    period: Duration,
    idle_poll: Duration,
    check_pet_card: bool,
    pause: Sleeper,

    viewpoint_adjusts: u64,
    report_frames: u64,
    report_started: Option<Instant>,
}

impl ControlLoop {
    pub fn new(
        config: &Config,
        collaborators: Collaborators,
        writers: Writers,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let state = Arc::clone(writers.run.shared());
        let gate = DeathGate::new(config, writers.death, writers.run.clone());
        let sleeper_state = Arc::clone(&state);
        let lp = Self {
            run: writers.run,
            telemetry: writers.telemetry,
            commands,
            c: collaborators,
            tracker: TargetTracker::new(writers.lock, config.tracker.reidentify_radius),
            planner: ExplorationPlanner::new(config),
            gate,
            center: config.center(),
            capture: config.capture_rect(),
            params: DetectParams::from(&config.detector),
            preset: config.zone.preset,
            custom_radius: config.zone.custom_radius,
            period: config.tick_period(),
            idle_poll: secs(config.keys.idle_poll),
            check_pet_card: config.death.check_pet_card,
            pause: Box::new(move |d| sleep_unless_stopped(d, &sleeper_state)),
            viewpoint_adjusts: 0,
            report_frames: 0,
            report_started: None,
            state,
        };
        lp.publish_zone();
        lp
    }

    /// Replace every wait inside a tick (death response, pet check).
    pub fn with_sleeper(mut self, make: impl Fn() -> Sleeper) -> Self {
        self.pause = make();
        self.gate = self.gate.with_sleeper(make());
        self
    }

    pub fn radius(&self) -> f64 {
        self.preset.radius().unwrap_or(self.custom_radius)
    }

    pub fn tracker(&self) -> &TargetTracker {
        &self.tracker
    }

    pub fn planner(&self) -> &ExplorationPlanner {
        &self.planner
    }

    /// Run until a stop is requested or the command channel closes.
    pub fn run(mut self) {
        self.gate.start(Instant::now());
        info!("hunt loop started, {:.0} fps, zone {} {:.0}px", 1.0 / self.period.as_secs_f64(), self.preset, self.radius());
        while !self.state.stop_requested() {
            let started = Instant::now();
            if !self.process_commands() {
                break;
            }
            let outcome = self.tick(started);
            if outcome == TickOutcome::Success(TickAction::NotRunning) {
                self.report_started = None;
                sleep_unless_stopped(self.idle_poll, &self.state);
            } else {
                sleep_remainder(started, self.period);
            }
        }
        self.tracker.clear_target();
        info!("hunt loop stopped");
    }

    /// Apply pending operator commands. Returns false once the sender is gone.
    pub fn process_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::CycleZone) => {
                    self.preset = self.preset.next();
                    info!("zone {} ({:.0}px)", self.preset, self.radius());
                    self.publish_zone();
                }
                Ok(Command::TestDeath) => {
                    self.gate.test_probe(self.c.probes.as_mut());
                }
                Ok(Command::Toggle) | Ok(Command::Quit) => {}
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// One pass of the loop at time `now`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.state.run_state() != RunState::Running {
            return self.record(TickOutcome::Success(TickAction::NotRunning));
        }
        self.count_frame(now);

        let outcome = match self.gate.evaluate(self.c.probes.as_mut(), self.c.actions.as_mut(), now) {
            GateOutcome::Proceed => self.hunt(now),
            GateOutcome::Suspended => TickOutcome::Success(TickAction::Incapacitated),
            GateOutcome::Handled(Ok(response)) => {
                self.tracker.clear_target();
                TickOutcome::Success(TickAction::DeathHandled(response))
            }
            GateOutcome::Handled(Err(error)) => TickOutcome::ActionError { error },
        };
        self.record(outcome)
    }

    fn hunt(&mut self, now: Instant) -> TickOutcome {
        let (detections, failure) = match self.detect() {
            Ok(d) => (d, None),
            Err(e) => {
                warn!("{}, treating as no detections", e);
                (Vec::new(), Some(e))
            }
        };
        let in_zone = zone::filter(&detections, self.center, self.radius());

        match (self.act(&in_zone, now), failure) {
            (Err(error), _) => {
                warn!("{}", error);
                TickOutcome::ActionError { error }
            }
            (Ok(fallback), Some(error)) => TickOutcome::CollaboratorError { error, fallback },
            (Ok(action), None) => TickOutcome::Success(action),
        }
    }

    fn detect(&mut self) -> Result<Vec<Detection>, CollaboratorError> {
        let frame = self.c.frames.capture(self.capture)?;
        self.c.detector.detect(&frame, self.capture.origin(), &self.params)
    }

    fn act(&mut self, in_zone: &[Detection], now: Instant) -> Result<TickAction, ActionError> {
        if !in_zone.is_empty() {
            self.planner.confirm_detection();
            let target = self.tracker.decide(in_zone, self.c.probes.as_mut(), now);
            // The lock check always comes before a click.
            if !self.tracker.switch_allowed() {
                return Ok(TickAction::Hold);
            }
            let Some(target) = target else {
                return Ok(TickAction::Hold);
            };
            let at = target.action_position;
            self.c.actions.click(at)?;
            debug!("clicked target at {}", at);
            self.reject_companion();
            return Ok(TickAction::Clicked(at));
        }

        if !self.tracker.should_switch(self.c.probes.as_mut(), now) {
            return Ok(TickAction::Hold);
        }
        self.tracker.clear_target();

        let Some(to) = self.planner.plan(now) else {
            return Ok(TickAction::Waiting);
        };
        self.c.actions.click(to)?;
        if let Some(drag) = self.planner.maybe_adjust_viewpoint() {
            self.c.actions.drag(drag.from, drag.to, drag.duration)?;
            self.viewpoint_adjusts += 1;
        }
        Ok(TickAction::Explored(to))
    }

    /// A click that opened a companion's card did not select a hostile.
    fn reject_companion(&mut self) {
        if !self.check_pet_card || !(self.pause)(PET_CHECK_DELAY) {
            return;
        }
        match self.c.probes.pet_card() {
            Ok(true) => {
                info!("clicked a companion, dropping target");
                self.tracker.clear_target();
            }
            Ok(false) => {}
            Err(e) => warn!("pet card probe failed: {}", e),
        }
    }

    fn count_frame(&mut self, now: Instant) {
        let Some(since) = self.report_started else {
            self.report_started = Some(now);
            self.report_frames = 0;
            return;
        };
        self.report_frames += 1;
        if self.report_frames < REPORT_EVERY {
            return;
        }
        let elapsed = now.saturating_duration_since(since).as_secs_f64();
        let fps = if elapsed > 0.0 { self.report_frames as f64 / elapsed } else { 0.0 };
        info!("{:.1} fps over {} frames", fps, self.report_frames);
        self.telemetry.update(|t| t.fps = fps);
        self.report_started = Some(now);
        self.report_frames = 0;
    }

    fn publish_zone(&self) {
        let (preset, radius) = (self.preset, self.radius());
        self.telemetry.update(|t| {
            t.zone_preset = Some(preset);
            t.zone_radius = radius;
        });
    }

    fn record(&mut self, outcome: TickOutcome) -> TickOutcome {
        let target = self.tracker.current().map(|c| c.detection.screen_position);
        let adjusts = self.viewpoint_adjusts;
        let snapshot = outcome.clone();
        self.telemetry.update(|t| {
            t.ticks += 1;
            match &snapshot {
                TickOutcome::Success(a) | TickOutcome::CollaboratorError { fallback: a, .. } => match a {
                    TickAction::Clicked(_) => t.clicks += 1,
                    TickAction::Explored(_) => t.moves += 1,
                    _ => {}
                },
                TickOutcome::ActionError { .. } => t.action_errors += 1,
            }
            if matches!(snapshot, TickOutcome::CollaboratorError { .. }) {
                t.collaborator_errors += 1;
            }
            t.viewpoint_adjusts = adjusts;
            t.target = target;
            t.last_outcome = Some(snapshot);
        });
        outcome
    }
}
