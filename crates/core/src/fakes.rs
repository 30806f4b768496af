//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::detect::{DetectParams, Detector};
use crate::error::{ActionError, CollaboratorError};
use crate::platform::{ActionSink, FrameSource};
use crate::probes::SignalProbes;
use crate::types::{Capture, CaptureRect, CombatIndicator, Detection, Point};

/// Pops scripted values; the last one repeats once the script runs out.
fn next_sticky<T: Clone>(queue: &mut VecDeque<T>, empty: T) -> T {
    if queue.len() > 1 {
        queue.pop_front().unwrap_or(empty)
    } else {
        queue.front().cloned().unwrap_or(empty)
    }
}

#[derive(Default)]
pub struct ScriptedProbes {
    pub combat: VecDeque<CombatIndicator>,
    pub dead: VecDeque<bool>,
    pub pet: VecDeque<bool>,
    pub fail_combat: bool,
    pub fail_dead: bool,
    pub combat_calls: usize,
    pub dead_calls: usize,
    pub pet_calls: usize,
}

impl ScriptedProbes {
    pub fn combat(script: impl IntoIterator<Item = CombatIndicator>) -> Self {
        Self { combat: script.into_iter().collect(), ..Self::default() }
    }

    pub fn dead(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.dead = script.into_iter().collect();
        self
    }

    pub fn pet(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.pet = script.into_iter().collect();
        self
    }
}

impl SignalProbes for ScriptedProbes {
    fn combat_indicator(&mut self) -> Result<CombatIndicator, CollaboratorError> {
        self.combat_calls += 1;
        if self.fail_combat {
            return Err(CollaboratorError::Probe("scripted failure".into()));
        }
        Ok(next_sticky(&mut self.combat, CombatIndicator::NoIndicatorVisible))
    }

    fn incapacitated(&mut self) -> Result<bool, CollaboratorError> {
        self.dead_calls += 1;
        if self.fail_dead {
            return Err(CollaboratorError::Probe("scripted failure".into()));
        }
        Ok(next_sticky(&mut self.dead, false))
    }

    fn pet_card(&mut self) -> Result<bool, CollaboratorError> {
        self.pet_calls += 1;
        Ok(next_sticky(&mut self.pet, false))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click(Point),
    Key(String),
    Drag(Point, Point),
}

/// Records every action; clones share the same log.
#[derive(Clone, Default)]
pub struct SpyActionSink {
    pub log: Arc<Mutex<Vec<Action>>>,
    pub fail_clicks: bool,
}

impl SpyActionSink {
    pub fn actions(&self) -> Vec<Action> {
        self.log.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Click(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Key(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

impl ActionSink for SpyActionSink {
    fn click(&mut self, at: Point) -> Result<(), ActionError> {
        if self.fail_clicks {
            return Err(ActionError::Click { at, reason: "scripted failure".into() });
        }
        self.log.lock().unwrap().push(Action::Click(at));
        Ok(())
    }

    fn key(&mut self, key: &str) -> Result<(), ActionError> {
        self.log.lock().unwrap().push(Action::Key(key.to_string()));
        Ok(())
    }

    fn drag(&mut self, from: Point, to: Point, _duration: Duration) -> Result<(), ActionError> {
        self.log.lock().unwrap().push(Action::Drag(from, to));
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedDetector {
    pub script: VecDeque<Result<Vec<Detection>, CollaboratorError>>,
    pub calls: usize,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Result<Vec<Detection>, CollaboratorError>>) -> Self {
        Self { script: script.into_iter().collect(), calls: 0 }
    }

    pub fn always(dets: Vec<Detection>) -> Self {
        Self::new([Ok(dets)])
    }
}

impl Detector for ScriptedDetector {
    fn detect(
        &mut self,
        _frame: &Capture,
        _origin: Point,
        _params: &DetectParams,
    ) -> Result<Vec<Detection>, CollaboratorError> {
        self.calls += 1;
        next_sticky(&mut self.script, Ok(Vec::new()))
    }
}

/// Returns a small gray frame, or fails when `fail` is set.
#[derive(Default)]
pub struct FixedFrameSource {
    pub fail: bool,
}

impl FrameSource for FixedFrameSource {
    fn capture(&mut self, _rect: CaptureRect) -> Result<Capture, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Capture("scripted failure".into()));
        }
        Ok(Capture::filled(4, 4, [128, 128, 128, 255]))
    }
}
