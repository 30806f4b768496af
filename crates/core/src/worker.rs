//! Background key presser. Cycles a fixed key sequence while the run is
//! active and goes quiet while paused or incapacitated.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{secs, KeyConfig};
use crate::platform::ActionSink;
use crate::sleep::sleep_unless_stopped;
use crate::state::SharedState;

pub struct RepetitiveInputWorker {
    state: Arc<SharedState>,
    actions: Box<dyn ActionSink>,
    sequence: Vec<String>,
    key_delay: Duration,
    cycle_delay: Duration,
    idle_poll: Duration,
}

impl RepetitiveInputWorker {
    pub fn new(config: &KeyConfig, state: Arc<SharedState>, actions: Box<dyn ActionSink>) -> Self {
        Self {
            state,
            actions,
            sequence: config
                .sequence
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(String::from)
                .collect(),
            key_delay: secs(config.key_delay),
            cycle_delay: secs(config.cycle_delay),
            idle_poll: secs(config.idle_poll),
        }
    }

    pub fn run(mut self) {
        info!("key worker started, sequence {}", self.sequence.concat());
        while !self.state.stop_requested() {
            if !self.state.is_active() {
                sleep_unless_stopped(self.idle_poll, &self.state);
                continue;
            }
            if self.cycle() {
                sleep_unless_stopped(self.cycle_delay, &self.state);
            }
        }
        info!("key worker stopped");
    }

    /// Press each key once. State is re-checked before every key, so a pause
    /// or death is honored within one key delay. Returns false if interrupted.
    fn cycle(&mut self) -> bool {
        for key in &self.sequence {
            if !self.state.is_active() {
                debug!("key cycle interrupted");
                return false;
            }
            if let Err(e) = self.actions.key(key) {
                warn!("{}", e);
            }
            if !sleep_unless_stopped(self.key_delay, &self.state) {
                return false;
            }
        }
        true
    }
}
