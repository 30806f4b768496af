//! Cross-thread state shared by the control loop, the key worker, the
//! hotkey switch and the TUI.
//!
//! Readers go through [`SharedState`]. Each field has exactly one writer
//! handle, handed out once by [`SharedState::new`]:
//!
//! | field          | writer             | owner                      |
//! |----------------|--------------------|----------------------------|
//! | run state      | [`RunControl`]     | hotkey switch, control loop |
//! | death state    | [`DeathWriter`]    | death gate                 |
//! | combat lock    | [`LockWriter`]     | target tracker             |
//! | telemetry      | [`TelemetryWriter`]| control loop               |
//!
//! The stop flag is a latch: anyone may raise it, nobody lowers it.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ZonePreset;
use crate::control::TickOutcome;
use crate::types::{DeathState, Point, RunState};

/// Snapshot of loop progress for display.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub ticks: u64,
    pub clicks: u64,
    pub moves: u64,
    pub viewpoint_adjusts: u64,
    pub collaborator_errors: u64,
    pub action_errors: u64,
    pub last_outcome: Option<TickOutcome>,
    pub target: Option<Point>,
    pub zone_preset: Option<ZonePreset>,
    pub zone_radius: f64,
    pub fps: f64,
}

#[derive(Debug)]
pub struct SharedState {
    run: AtomicU8,
    incapacitated: AtomicBool,
    locked: AtomicBool,
    stop: AtomicBool,
    telemetry: Mutex<Telemetry>,
}

/// The single set of writer handles for a [`SharedState`].
pub struct Writers {
    pub run: RunControl,
    pub death: DeathWriter,
    pub lock: LockWriter,
    pub telemetry: TelemetryWriter,
}

impl SharedState {
    pub fn new() -> (Arc<SharedState>, Writers) {
        let state = Arc::new(SharedState {
            run: AtomicU8::new(RunState::Idle as u8),
            incapacitated: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            telemetry: Mutex::new(Telemetry::default()),
        });
        let writers = Writers {
            run: RunControl { state: Arc::clone(&state) },
            death: DeathWriter { state: Arc::clone(&state) },
            lock: LockWriter { state: Arc::clone(&state) },
            telemetry: TelemetryWriter { state: Arc::clone(&state) },
        };
        (state, writers)
    }

    pub fn run_state(&self) -> RunState {
        RunState::from_u8(self.run.load(Ordering::Acquire))
    }

    pub fn death_state(&self) -> DeathState {
        if self.incapacitated.load(Ordering::Acquire) {
            DeathState::Incapacitated
        } else {
            DeathState::Alive
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Running and alive: background input may fire.
    pub fn is_active(&self) -> bool {
        self.run_state() == RunState::Running && self.death_state() == DeathState::Alive
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Ask every periodic task to exit. Safe to call any number of times.
    /// Returns true only for the call that raised the flag.
    pub fn request_stop(&self) -> bool {
        !self.stop.swap(true, Ordering::AcqRel)
    }

    pub fn telemetry(&self) -> Telemetry {
        lock_ignoring_poison(&self.telemetry).clone()
    }
}

fn lock_ignoring_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run/pause transitions. Cloned between the hotkey switch and the control loop;
/// every change is a compare-and-swap so the two never overwrite each other.
#[derive(Clone)]
pub struct RunControl {
    state: Arc<SharedState>,
}

impl RunControl {
    /// Move `from` -> `to` if the state is still `from`.
    pub fn transition(&self, from: RunState, to: RunState) -> bool {
        self.state
            .run
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Idle -> Running, Running -> Paused, Paused -> Running. Returns (before, after).
    pub fn toggle(&self) -> (RunState, RunState) {
        loop {
            let current = self.state.run_state();
            let next = match current {
                RunState::Idle | RunState::Paused => RunState::Running,
                RunState::Running => RunState::Paused,
            };
            if self.transition(current, next) {
                return (current, next);
            }
        }
    }

    /// Running -> Paused; the operator has to resume.
    pub fn park(&self) -> bool {
        self.transition(RunState::Running, RunState::Paused)
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.state
    }
}

pub struct DeathWriter {
    state: Arc<SharedState>,
}

impl DeathWriter {
    pub fn set(&self, death: DeathState) {
        self.state
            .incapacitated
            .store(death == DeathState::Incapacitated, Ordering::Release);
    }

    pub fn get(&self) -> DeathState {
        self.state.death_state()
    }
}

pub struct LockWriter {
    state: Arc<SharedState>,
}

impl LockWriter {
    pub fn set(&self, locked: bool) {
        self.state.locked.store(locked, Ordering::Release);
    }

    pub fn get(&self) -> bool {
        self.state.is_locked()
    }
}

pub struct TelemetryWriter {
    state: Arc<SharedState>,
}

impl TelemetryWriter {
    pub fn update(&self, f: impl FnOnce(&mut Telemetry)) {
        f(&mut lock_ignoring_poison(&self.state.telemetry));
    }
}
