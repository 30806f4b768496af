//! Operator commands. The first toggle launches the hunt loop and the key
//! worker on their own threads; later toggles only flip run/pause.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use crate::control::ControlLoop;
use crate::platform::hotkey::HotkeyFlags;
use crate::state::{RunControl, SharedState};
use crate::types::{Command, RunState};
use crate::worker::RepetitiveInputWorker;

pub struct HotkeySwitch {
    state: Arc<SharedState>,
    run: RunControl,
    commands: mpsc::Sender<Command>,
    pending: Option<(ControlLoop, RepetitiveInputWorker)>,
    handles: Vec<JoinHandle<()>>,
}

impl HotkeySwitch {
    /// `commands` feeds the receiver owned by `control`.
    pub fn new(
        run: RunControl,
        commands: mpsc::Sender<Command>,
        control: ControlLoop,
        worker: RepetitiveInputWorker,
    ) -> Self {
        Self {
            state: Arc::clone(run.shared()),
            run,
            commands,
            pending: Some((control, worker)),
            handles: Vec::new(),
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn is_started(&self) -> bool {
        self.pending.is_none()
    }

    /// Drain the global hotkey latches.
    pub fn poll_hotkeys(&mut self, flags: &HotkeyFlags) {
        for cmd in flags.drain() {
            self.handle(cmd);
        }
    }

    pub fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Toggle => {
                self.toggle();
            }
            Command::CycleZone | Command::TestDeath => {
                if self.commands.send(cmd).is_err() {
                    error!("hunt loop is gone, dropping {:?}", cmd);
                }
            }
            Command::Quit => self.shutdown(),
        }
    }

    pub fn toggle(&mut self) -> RunState {
        if self.state.stop_requested() {
            return self.state.run_state();
        }
        let (before, after) = self.run.toggle();
        if before == RunState::Idle {
            self.launch();
        }
        info!("{}", match after {
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Idle => "idle",
        });
        after
    }

    fn launch(&mut self) {
        let Some((control, worker)) = self.pending.take() else {
            return;
        };
        self.spawn("hunt", move || control.run());
        self.spawn("keys", move || worker.run());
    }

    fn spawn(&mut self, name: &str, job: impl FnOnce() + Send + 'static) {
        match thread::Builder::new().name(name.into()).spawn(job) {
            Ok(h) => self.handles.push(h),
            Err(e) => error!("failed to start {} thread: {}", name, e),
        }
    }

    /// Stop both tasks and wait for them. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.state.request_stop() {
            info!("stopping");
        }
        for h in self.handles.drain(..) {
            if h.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl Drop for HotkeySwitch {
    fn drop(&mut self) {
        self.shutdown();
    }
}
